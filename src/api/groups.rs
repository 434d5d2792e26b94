// Group endpoints
// This file provides group and member management plus per-member balances

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::ApiError;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub members: Vec<Member>,
}

#[derive(Debug, Serialize)]
pub struct MemberBalance {
    pub name: String,
    pub balance_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub name: String,
}

pub async fn create_group(
    State(pool): State<PgPool>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }

    let group = sqlx::query_as::<_, Group>(
        "INSERT INTO groups (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups(State(pool): State<PgPool>) -> Result<Json<Vec<Group>>, ApiError> {
    let groups = sqlx::query_as::<_, Group>(
        "SELECT id, name, created_at FROM groups ORDER BY created_at, id",
    )
    .fetch_all(&pool)
    .await?;
    Ok(Json(groups))
}

pub async fn get_group(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<GroupDetail>, ApiError> {
    let group = fetch_group(&pool, id).await?;
    let members = sqlx::query_as::<_, Member>(
        "SELECT id, name FROM group_members WHERE group_id = $1 ORDER BY created_at, id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;
    Ok(Json(GroupDetail { group, members }))
}

pub async fn add_member(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<Member>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    fetch_group(&pool, id).await?;

    let member = sqlx::query_as::<_, Member>(
        "INSERT INTO group_members (id, group_id, name) VALUES ($1, $2, $3) RETURNING id, name",
    )
    .bind(Uuid::new_v4())
    .bind(id)
    .bind(name)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn get_balances(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MemberBalance>>, ApiError> {
    fetch_group(&pool, id).await?;

    let members: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM group_members WHERE group_id = $1 ORDER BY created_at, id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let expenses: Vec<(String, i64)> = sqlx::query_as(
        "SELECT paid_by, amount_cents FROM expenses WHERE group_id = $1 ORDER BY created_at, id",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(compute_balances(&members, &expenses)))
}

pub(crate) async fn fetch_group(pool: &PgPool, id: Uuid) -> Result<Group, ApiError> {
    sqlx::query_as::<_, Group>("SELECT id, name, created_at FROM groups WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("group"))
}

/// Net position per member: everything they paid minus their share of every
/// expense. Shares split equally in integer cents; the leftover cents of an
/// uneven split land on the earliest members, so the balances always sum to
/// zero.
fn compute_balances(members: &[String], expenses: &[(String, i64)]) -> Vec<MemberBalance> {
    let mut balances: Vec<MemberBalance> = members
        .iter()
        .map(|name| MemberBalance {
            name: name.clone(),
            balance_cents: 0,
        })
        .collect();
    if balances.is_empty() {
        return balances;
    }

    let index: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let headcount = balances.len() as i64;

    for (paid_by, amount_cents) in expenses {
        if let Some(&payer) = index.get(paid_by.as_str()) {
            balances[payer].balance_cents += amount_cents;
        }
        let share = amount_cents / headcount;
        let leftover = amount_cents % headcount;
        for (position, balance) in balances.iter_mut().enumerate() {
            let extra_cent = if (position as i64) < leftover { 1 } else { 0 };
            balance.balance_cents -= share + extra_cent;
        }
    }

    balances
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn even_split_credits_the_payer() {
        let members = names(&["ada", "ben", "cleo"]);
        let expenses = vec![("ada".to_string(), 3000)];
        let balances = compute_balances(&members, &expenses);
        assert_eq!(balances[0].balance_cents, 2000);
        assert_eq!(balances[1].balance_cents, -1000);
        assert_eq!(balances[2].balance_cents, -1000);
    }

    #[test]
    fn uneven_split_puts_leftover_cents_on_earliest_members() {
        let members = names(&["ada", "ben", "cleo"]);
        let expenses = vec![("ben".to_string(), 1000)];
        let balances = compute_balances(&members, &expenses);
        // 1000 / 3 = 333 remainder 1; ada carries the extra cent
        assert_eq!(balances[0].balance_cents, -334);
        assert_eq!(balances[1].balance_cents, 1000 - 333);
        assert_eq!(balances[2].balance_cents, -333);
    }

    #[test]
    fn balances_sum_to_zero_across_many_expenses() {
        let members = names(&["ada", "ben", "cleo", "dev"]);
        let expenses = vec![
            ("ada".to_string(), 1234),
            ("ben".to_string(), 999),
            ("cleo".to_string(), 57),
            ("ada".to_string(), 100_001),
        ];
        let balances = compute_balances(&members, &expenses);
        let total: i64 = balances.iter().map(|b| b.balance_cents).sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn no_members_yields_no_balances() {
        let balances = compute_balances(&[], &[("ghost".to_string(), 500)]);
        assert!(balances.is_empty());
    }
}

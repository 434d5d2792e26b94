// Expense endpoints
// This file provides expense creation and per-group listing

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::groups::fetch_group;
use crate::errors::ApiError;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub paid_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub group_id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub paid_by: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseFilter {
    pub group_id: Uuid,
}

pub async fn create_expense(
    State(pool): State<PgPool>,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let description = req.description.trim();
    if description.is_empty() {
        return Err(ApiError::Validation(
            "description must not be empty".to_string(),
        ));
    }
    if req.amount_cents <= 0 {
        return Err(ApiError::Validation(
            "amount_cents must be positive".to_string(),
        ));
    }

    fetch_group(&pool, req.group_id).await?;

    let is_member: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = $1 AND name = $2)",
    )
    .bind(req.group_id)
    .bind(&req.paid_by)
    .fetch_one(&pool)
    .await?;
    if !is_member {
        return Err(ApiError::Validation(
            "paid_by is not a member of the group".to_string(),
        ));
    }

    let expense = sqlx::query_as::<_, Expense>(
        "INSERT INTO expenses (id, group_id, description, amount_cents, paid_by) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, group_id, description, amount_cents, paid_by, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(req.group_id)
    .bind(description)
    .bind(req.amount_cents)
    .bind(&req.paid_by)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn list_expenses(
    State(pool): State<PgPool>,
    Query(filter): Query<ExpenseFilter>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    fetch_group(&pool, filter.group_id).await?;

    let expenses = sqlx::query_as::<_, Expense>(
        "SELECT id, group_id, description, amount_cents, paid_by, created_at \
         FROM expenses WHERE group_id = $1 ORDER BY created_at, id",
    )
    .bind(filter.group_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(expenses))
}

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::notifications;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset};

/// Entities a notification may point back at.
pub const LINKABLE_ENTITIES: [&str; 7] = [
    "task",
    "lead",
    "opportunity",
    "customer",
    "order",
    "invoice",
    "quote",
];

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = notifications)]
#[diesel(treat_none_as_null = true)]
pub struct Notification {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub fn check_entity_type(entity_type: &str) -> Result<(), ApiError> {
    if !LINKABLE_ENTITIES.contains(&entity_type) {
        return Err(ApiError::Validation(format!(
            "unknown entity_type '{entity_type}'"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct FanOutRequest {
    pub recipients: Vec<Uuid>,
    pub title: String,
    pub message: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct FanOutResult {
    pub created: usize,
}

/// One notification row per recipient.
pub async fn fan_out(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<FanOutRequest>,
) -> Result<Json<ApiResponse<FanOutResult>>, ApiError> {
    if req.recipients.is_empty() {
        return Err(ApiError::Validation("recipients must not be empty".into()));
    }
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    if let Some(entity_type) = &req.entity_type {
        check_entity_type(entity_type)?;
        if req.entity_id.is_none() {
            return Err(ApiError::Validation(
                "entity_id is required when entity_type is set".into(),
            ));
        }
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let now = Utc::now();
    let rows: Vec<Notification> = req
        .recipients
        .iter()
        .map(|user_id| Notification {
            id: Uuid::new_v4(),
            company_id: ctx.company_id,
            user_id: *user_id,
            title: req.title.clone(),
            message: req.message.clone(),
            entity_type: req.entity_type.clone(),
            entity_id: req.entity_id,
            is_read: false,
            read_at: None,
            created_at: now,
        })
        .collect();

    diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(&mut conn)?;

    info!(recipients = rows.len(), "notifications fanned out");
    Ok(Json(ApiResponse::ok(FanOutResult { created: rows.len() })))
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Notification>>>, ApiError> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Authorization("notifications are per-user".into()))?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = notifications::table
        .filter(notifications::company_id.eq(ctx.company_id))
        .filter(notifications::user_id.eq(user_id))
        .into_boxed();
    if query.unread_only.unwrap_or(false) {
        q = q.filter(notifications::is_read.eq(false));
    }

    let list: Vec<Notification> = q
        .order(notifications::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<ApiResponse<UnreadCount>>, ApiError> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Authorization("notifications are per-user".into()))?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let unread: i64 = notifications::table
        .filter(notifications::company_id.eq(ctx.company_id))
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(&mut conn)?;
    Ok(Json(ApiResponse::ok(UnreadCount { unread })))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Notification>>, ApiError> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Authorization("notifications are per-user".into()))?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut notification: Notification = notifications::table
        .filter(notifications::id.eq(id))
        .filter(notifications::company_id.eq(ctx.company_id))
        .filter(notifications::user_id.eq(user_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("notification".into()))?;

    if !notification.is_read {
        notification.is_read = true;
        notification.read_at = Some(Utc::now());
        diesel::update(notifications::table.filter(notifications::id.eq(id)))
            .set(&notification)
            .execute(&mut conn)?;
    }
    Ok(Json(ApiResponse::ok(notification)))
}

/// Bulk status action over every unread notification of the caller.
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Authorization("notifications are per-user".into()))?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::company_id.eq(ctx.company_id))
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set((
        notifications::is_read.eq(true),
        notifications::read_at.eq(Some(Utc::now())),
    ))
    .execute(&mut conn)?;

    Ok(Json(ApiResponse::ok(serde_json::json!({ "marked_read": updated }))))
}

pub fn configure_notifications_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/notifications",
            get(list_notifications).post(fan_out),
        )
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", put(mark_all_read))
        .route("/api/notifications/:id/read", put(mark_read))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_whitelist() {
        for entity in LINKABLE_ENTITIES {
            assert!(check_entity_type(entity).is_ok());
        }
        assert!(check_entity_type("webhook").is_err());
        assert!(check_entity_type("").is_err());
    }
}

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::notifications::check_entity_type;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::approvals;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset};

/// Generic sign-off request against any linkable business entity.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = approvals)]
#[diesel(treat_none_as_null = true)]
pub struct Approval {
    pub id: Uuid,
    pub company_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub requested_by: Uuid,
    pub status: String,
    pub approver_id: Option<Uuid>,
    pub decision_note: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateApprovalRequest {
    pub entity_type: String,
    pub entity_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub entity_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_approval(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateApprovalRequest>,
) -> Result<Json<ApiResponse<Approval>>, ApiError> {
    check_entity_type(&req.entity_type)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let pending: i64 = approvals::table
        .filter(approvals::company_id.eq(ctx.company_id))
        .filter(approvals::entity_type.eq(&req.entity_type))
        .filter(approvals::entity_id.eq(req.entity_id))
        .filter(approvals::status.eq("pending"))
        .count()
        .get_result(&mut conn)?;
    if pending > 0 {
        return Err(ApiError::Conflict(
            "an approval is already pending for this entity".into(),
        ));
    }

    let now = Utc::now();
    let approval = Approval {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        entity_type: req.entity_type,
        entity_id: req.entity_id,
        requested_by: ctx.actor_id(),
        status: "pending".to_string(),
        approver_id: None,
        decision_note: None,
        decided_at: None,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(approvals::table)
        .values(&approval)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(approval)))
}

pub async fn list_approvals(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Approval>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = approvals::table
        .filter(approvals::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(status) = query.status {
        q = q.filter(approvals::status.eq(status));
    }
    if let Some(entity_type) = query.entity_type {
        q = q.filter(approvals::entity_type.eq(entity_type));
    }

    let list: Vec<Approval> = q
        .order(approvals::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

fn decide(
    state: &Arc<AppState>,
    ctx: &AuthContext,
    id: Uuid,
    verdict: &str,
    note: Option<String>,
) -> Result<Json<ApiResponse<Approval>>, ApiError> {
    let approver_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Authorization("only managers decide approvals".into()))?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut approval: Approval = approvals::table
        .filter(approvals::id.eq(id))
        .filter(approvals::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("approval".into()))?;

    if approval.status != "pending" {
        return Err(ApiError::Conflict(format!(
            "approval is already {}",
            approval.status
        )));
    }

    approval.status = verdict.to_string();
    approval.approver_id = Some(approver_id);
    approval.decision_note = note;
    approval.decided_at = Some(Utc::now());
    approval.updated_at = Utc::now();

    diesel::update(approvals::table.filter(approvals::id.eq(id)))
        .set(&approval)
        .execute(&mut conn)?;
    info!(approval_id = %id, verdict, "approval decided");
    Ok(Json(ApiResponse::ok(approval)))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ApiResponse<Approval>>, ApiError> {
    decide(&state, &ctx, id, "approved", req.note)
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ApiResponse<Approval>>, ApiError> {
    decide(&state, &ctx, id, "rejected", req.note)
}

pub fn configure_approvals_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/approvals", get(list_approvals).post(create_approval))
        .route("/api/approvals/:id/approve", put(approve))
        .route("/api/approvals/:id/reject", put(reject))
}

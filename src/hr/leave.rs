use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::leave_requests;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = leave_requests)]
#[diesel(treat_none_as_null = true)]
pub struct LeaveRequest {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_id: Uuid,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i32,
    pub reason: Option<String>,
    pub status: String,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Annual allowance per leave type; None means uncapped.
pub fn default_allowance(leave_type: &str) -> Option<i32> {
    match leave_type {
        "vacation" => Some(20),
        "sick" => Some(10),
        "personal" => Some(5),
        _ => None,
    }
}

/// Inclusive day count of the requested window.
pub fn requested_days(start: NaiveDate, end: NaiveDate) -> Result<i32, ApiError> {
    if end < start {
        return Err(ApiError::Validation("end_date precedes start_date".into()));
    }
    Ok((end - start).num_days() as i32 + 1)
}

#[derive(Debug, Deserialize)]
pub struct CreateLeaveRequest {
    pub employee_id: Uuid,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub employee_id: Option<Uuid>,
    pub status: Option<String>,
    pub leave_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub employee_id: Uuid,
    pub leave_type: String,
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct LeaveBalance {
    pub employee_id: Uuid,
    pub leave_type: String,
    pub year: i32,
    pub allowance: Option<i32>,
    pub taken: i32,
    pub remaining: Option<i32>,
}

fn approved_days_in_year(
    conn: &mut PgConnection,
    company_id: Uuid,
    employee_id: Uuid,
    leave_type: &str,
    year: i32,
) -> Result<i32, ApiError> {
    let from = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| ApiError::Validation("year out of range".into()))?;
    let to = NaiveDate::from_ymd_opt(year, 12, 31)
        .ok_or_else(|| ApiError::Validation("year out of range".into()))?;
    let rows: Vec<i32> = leave_requests::table
        .filter(leave_requests::company_id.eq(company_id))
        .filter(leave_requests::employee_id.eq(employee_id))
        .filter(leave_requests::leave_type.eq(leave_type))
        .filter(leave_requests::status.eq("approved"))
        .filter(leave_requests::start_date.ge(from))
        .filter(leave_requests::start_date.le(to))
        .select(leave_requests::days)
        .load(conn)?;
    Ok(rows.into_iter().sum())
}

pub async fn create_request(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateLeaveRequest>,
) -> Result<Json<ApiResponse<LeaveRequest>>, ApiError> {
    ctx.require_employee_access(req.employee_id)?;
    let days = requested_days(req.start_date, req.end_date)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    if let Some(allowance) = default_allowance(&req.leave_type) {
        let taken = approved_days_in_year(
            &mut conn,
            ctx.company_id,
            req.employee_id,
            &req.leave_type,
            req.start_date.year(),
        )?;
        if taken + days > allowance {
            return Err(ApiError::Conflict(format!(
                "requested {days} days exceeds remaining {} {} days",
                allowance - taken,
                req.leave_type
            )));
        }
    }

    let now = Utc::now();
    let request = LeaveRequest {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        employee_id: req.employee_id,
        leave_type: req.leave_type,
        start_date: req.start_date,
        end_date: req.end_date,
        days,
        reason: req.reason,
        status: "pending".to_string(),
        decided_by: None,
        decided_at: None,
        decision_note: None,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(leave_requests::table)
        .values(&request)
        .execute(&mut conn)?;
    info!(employee_id = %request.employee_id, days, "leave requested");
    Ok(Json(ApiResponse::ok(request)))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<LeaveRequest>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = leave_requests::table
        .filter(leave_requests::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(own) = ctx.employee_id() {
        q = q.filter(leave_requests::employee_id.eq(own));
    } else if let Some(employee_id) = query.employee_id {
        q = q.filter(leave_requests::employee_id.eq(employee_id));
    }
    if let Some(status) = query.status {
        q = q.filter(leave_requests::status.eq(status));
    }
    if let Some(leave_type) = query.leave_type {
        q = q.filter(leave_requests::leave_type.eq(leave_type));
    }

    let list: Vec<LeaveRequest> = q
        .order(leave_requests::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

fn load_request(
    conn: &mut PgConnection,
    company_id: Uuid,
    id: Uuid,
) -> Result<LeaveRequest, ApiError> {
    leave_requests::table
        .filter(leave_requests::id.eq(id))
        .filter(leave_requests::company_id.eq(company_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("leave request".into()))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LeaveRequest>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let request = load_request(&mut conn, ctx.company_id, id)?;
    ctx.require_employee_access(request.employee_id)?;
    Ok(Json(ApiResponse::ok(request)))
}

fn decide(
    state: &Arc<AppState>,
    ctx: &AuthContext,
    id: Uuid,
    verdict: &str,
    note: Option<String>,
) -> Result<Json<ApiResponse<LeaveRequest>>, ApiError> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Authorization("only managers decide leave requests".into()))?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut request = load_request(&mut conn, ctx.company_id, id)?;

    if request.status != "pending" {
        return Err(ApiError::Conflict(format!(
            "leave request is already {}",
            request.status
        )));
    }

    request.status = verdict.to_string();
    request.decided_by = Some(user_id);
    request.decided_at = Some(Utc::now());
    request.decision_note = note;
    request.updated_at = Utc::now();

    diesel::update(leave_requests::table.filter(leave_requests::id.eq(id)))
        .set(&request)
        .execute(&mut conn)?;
    info!(request_id = %id, verdict, "leave request decided");
    Ok(Json(ApiResponse::ok(request)))
}

pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ApiResponse<LeaveRequest>>, ApiError> {
    decide(&state, &ctx, id, "approved", req.note)
}

pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<ApiResponse<LeaveRequest>>, ApiError> {
    decide(&state, &ctx, id, "rejected", req.note)
}

pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LeaveRequest>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut request = load_request(&mut conn, ctx.company_id, id)?;
    ctx.require_employee_access(request.employee_id)?;

    if request.status != "pending" {
        return Err(ApiError::Conflict(format!(
            "only pending requests can be cancelled, this one is {}",
            request.status
        )));
    }

    request.status = "cancelled".to_string();
    request.updated_at = Utc::now();
    diesel::update(leave_requests::table.filter(leave_requests::id.eq(id)))
        .set(&request)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(request)))
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<ApiResponse<LeaveBalance>>, ApiError> {
    ctx.require_employee_access(query.employee_id)?;
    let year = query.year.unwrap_or_else(|| Utc::now().year());
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let taken = approved_days_in_year(
        &mut conn,
        ctx.company_id,
        query.employee_id,
        &query.leave_type,
        year,
    )?;
    let allowance = default_allowance(&query.leave_type);

    Ok(Json(ApiResponse::ok(LeaveBalance {
        employee_id: query.employee_id,
        leave_type: query.leave_type,
        year,
        allowance,
        taken,
        remaining: allowance.map(|a| (a - taken).max(0)),
    })))
}

pub fn configure_leave_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/hr/leave", get(list_requests).post(create_request))
        .route("/api/hr/leave/balance", get(get_balance))
        .route("/api/hr/leave/:id", get(get_request))
        .route("/api/hr/leave/:id/approve", put(approve_request))
        .route("/api/hr/leave/:id/reject", put(reject_request))
        .route("/api/hr/leave/:id/cancel", put(cancel_request))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_days_inclusive() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(requested_days(start, end).unwrap(), 5);
        assert_eq!(requested_days(start, start).unwrap(), 1);
    }

    #[test]
    fn test_requested_days_rejects_inverted_window() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(
            requested_days(start, end).unwrap_err().error_type(),
            "validation"
        );
    }

    #[test]
    fn test_default_allowances() {
        assert_eq!(default_allowance("vacation"), Some(20));
        assert_eq!(default_allowance("sick"), Some(10));
        assert_eq!(default_allowance("personal"), Some(5));
        assert_eq!(default_allowance("unpaid"), None);
    }
}

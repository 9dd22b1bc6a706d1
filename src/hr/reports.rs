use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use bigdecimal::BigDecimal;
use diesel::dsl::{count_star, sum};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{attendance_records, employees, leave_requests, payroll_records};
use crate::shared::state::AppState;
use crate::shared::utils::month_bounds;

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    /// Month in `YYYY-MM` form.
    pub month: String,
}

#[derive(Debug, Serialize)]
pub struct DepartmentHeadcount {
    pub department: Option<String>,
    pub headcount: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusHeadcount {
    pub status: String,
    pub headcount: i64,
}

#[derive(Debug, Serialize)]
pub struct LeaveByType {
    pub leave_type: String,
    pub days_taken: i64,
}

#[derive(Debug, Serialize)]
pub struct HrOverview {
    pub month: String,
    pub headcount_by_department: Vec<DepartmentHeadcount>,
    pub headcount_by_status: Vec<StatusHeadcount>,
    pub attendance_total_hours: BigDecimal,
    pub attendance_overtime_hours: BigDecimal,
    pub leave_days_by_type: Vec<LeaveByType>,
    pub payroll_gross_total: BigDecimal,
    pub payroll_net_total: BigDecimal,
}

/// One aggregated report per tenant and month: headcount breakdowns,
/// attendance and overtime totals, leave consumption, payroll cost.
pub async fn hr_overview(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<OverviewQuery>,
) -> Result<Json<ApiResponse<HrOverview>>, ApiError> {
    ctx.user_id()
        .ok_or_else(|| ApiError::Authorization("reports are manager-only".into()))?;
    let (from, to) = month_bounds(&query.month)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let company_id: Uuid = ctx.company_id;

    let by_department: Vec<(Option<String>, i64)> = employees::table
        .filter(employees::company_id.eq(company_id))
        .group_by(employees::department)
        .select((employees::department, count_star()))
        .load(&mut conn)?;

    let by_status: Vec<(String, i64)> = employees::table
        .filter(employees::company_id.eq(company_id))
        .group_by(employees::status)
        .select((employees::status, count_star()))
        .load(&mut conn)?;

    let (total_hours, overtime_hours): (Option<BigDecimal>, Option<BigDecimal>) =
        attendance_records::table
            .filter(attendance_records::company_id.eq(company_id))
            .filter(attendance_records::work_date.ge(from))
            .filter(attendance_records::work_date.le(to))
            .select((
                sum(attendance_records::total_hours),
                sum(attendance_records::overtime_hours),
            ))
            .first(&mut conn)?;

    let leave_by_type: Vec<(String, Option<i64>)> = leave_requests::table
        .filter(leave_requests::company_id.eq(company_id))
        .filter(leave_requests::status.eq("approved"))
        .filter(leave_requests::start_date.ge(from))
        .filter(leave_requests::start_date.le(to))
        .group_by(leave_requests::leave_type)
        .select((leave_requests::leave_type, sum(leave_requests::days)))
        .load(&mut conn)?;

    let (gross, net): (Option<BigDecimal>, Option<BigDecimal>) = payroll_records::table
        .filter(payroll_records::company_id.eq(company_id))
        .filter(payroll_records::period_start.ge(from))
        .filter(payroll_records::period_start.le(to))
        .select((sum(payroll_records::gross_pay), sum(payroll_records::net_pay)))
        .first(&mut conn)?;

    Ok(Json(ApiResponse::ok(HrOverview {
        month: query.month,
        headcount_by_department: by_department
            .into_iter()
            .map(|(department, headcount)| DepartmentHeadcount {
                department,
                headcount,
            })
            .collect(),
        headcount_by_status: by_status
            .into_iter()
            .map(|(status, headcount)| StatusHeadcount { status, headcount })
            .collect(),
        attendance_total_hours: total_hours.unwrap_or_else(|| BigDecimal::from(0)),
        attendance_overtime_hours: overtime_hours.unwrap_or_else(|| BigDecimal::from(0)),
        leave_days_by_type: leave_by_type
            .into_iter()
            .map(|(leave_type, days)| LeaveByType {
                leave_type,
                days_taken: days.unwrap_or(0),
            })
            .collect(),
        payroll_gross_total: gross.unwrap_or_else(|| BigDecimal::from(0)),
        payroll_net_total: net.unwrap_or_else(|| BigDecimal::from(0)),
    })))
}

pub fn configure_hr_reports_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/hr/reports/overview", get(hr_overview))
}

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::hr::employees::Employee;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{attendance_records, employees, payroll_records};
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset, round2};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = payroll_records)]
#[diesel(treat_none_as_null = true)]
pub struct PayrollRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub regular_hours: BigDecimal,
    pub overtime_hours: BigDecimal,
    pub hourly_rate: BigDecimal,
    pub regular_pay: BigDecimal,
    pub overtime_pay: BigDecimal,
    pub allowances: BigDecimal,
    pub deductions: BigDecimal,
    pub gross_pay: BigDecimal,
    pub net_pay: BigDecimal,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayBreakdown {
    pub regular_pay: BigDecimal,
    pub overtime_pay: BigDecimal,
    pub gross_pay: BigDecimal,
    pub net_pay: BigDecimal,
}

/// Pay arithmetic: straight time at the hourly rate, overtime at time and a
/// half, allowances on top, deductions off the gross.
pub fn compute_pay(
    regular_hours: &BigDecimal,
    overtime_hours: &BigDecimal,
    hourly_rate: &BigDecimal,
    allowances: &BigDecimal,
    deductions: &BigDecimal,
) -> PayBreakdown {
    let regular_pay = round2(regular_hours * hourly_rate);
    let overtime_pay = round2(overtime_hours * hourly_rate * BigDecimal::from(3) / BigDecimal::from(2));
    let gross_pay = round2(&regular_pay + &overtime_pay + allowances);
    let net_pay = round2(&gross_pay - deductions);
    PayBreakdown {
        regular_pay,
        overtime_pay,
        gross_pay,
        net_pay,
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub employee_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub allowances: Option<BigDecimal>,
    pub deductions: Option<BigDecimal>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub employee_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<PayrollRecord>>, ApiError> {
    ctx.require_admin()?;
    if req.period_end < req.period_start {
        return Err(ApiError::Validation("period_end precedes period_start".into()));
    }
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let employee: Employee = employees::table
        .filter(employees::id.eq(req.employee_id))
        .filter(employees::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("employee".into()))?;

    let existing: Option<PayrollRecord> = payroll_records::table
        .filter(payroll_records::company_id.eq(ctx.company_id))
        .filter(payroll_records::employee_id.eq(req.employee_id))
        .filter(payroll_records::period_start.eq(req.period_start))
        .filter(payroll_records::period_end.eq(req.period_end))
        .first(&mut conn)
        .optional()?;
    if let Some(ref rec) = existing {
        if rec.status != "draft" {
            return Err(ApiError::Conflict(format!(
                "payroll for this period is already {}",
                rec.status
            )));
        }
    }

    let totals: Vec<(BigDecimal, BigDecimal)> = attendance_records::table
        .filter(attendance_records::company_id.eq(ctx.company_id))
        .filter(attendance_records::employee_id.eq(req.employee_id))
        .filter(attendance_records::work_date.ge(req.period_start))
        .filter(attendance_records::work_date.le(req.period_end))
        .select((
            attendance_records::total_hours,
            attendance_records::overtime_hours,
        ))
        .load(&mut conn)?;

    let regular_hours: BigDecimal = totals.iter().map(|(t, _)| t.clone()).sum();
    let overtime_hours: BigDecimal = totals.iter().map(|(_, o)| o.clone()).sum();
    let allowances = round2(req.allowances.unwrap_or_else(|| BigDecimal::from(0)));
    let deductions = round2(req.deductions.unwrap_or_else(|| BigDecimal::from(0)));
    let pay = compute_pay(
        &regular_hours,
        &overtime_hours,
        &employee.hourly_rate,
        &allowances,
        &deductions,
    );

    let now = Utc::now();
    let record = PayrollRecord {
        id: existing.as_ref().map(|r| r.id).unwrap_or_else(Uuid::new_v4),
        company_id: ctx.company_id,
        employee_id: req.employee_id,
        period_start: req.period_start,
        period_end: req.period_end,
        regular_hours,
        overtime_hours,
        hourly_rate: employee.hourly_rate.clone(),
        regular_pay: pay.regular_pay,
        overtime_pay: pay.overtime_pay,
        allowances,
        deductions,
        gross_pay: pay.gross_pay,
        net_pay: pay.net_pay,
        status: "draft".to_string(),
        paid_at: None,
        created_at: existing.as_ref().map(|r| r.created_at).unwrap_or(now),
        updated_at: now,
    };

    if existing.is_some() {
        diesel::update(payroll_records::table.filter(payroll_records::id.eq(record.id)))
            .set(&record)
            .execute(&mut conn)?;
    } else {
        diesel::insert_into(payroll_records::table)
            .values(&record)
            .execute(&mut conn)?;
    }

    info!(employee_id = %req.employee_id, "payroll generated");
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<PayrollRecord>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = payroll_records::table
        .filter(payroll_records::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(own) = ctx.employee_id() {
        q = q.filter(payroll_records::employee_id.eq(own));
    } else if let Some(employee_id) = query.employee_id {
        q = q.filter(payroll_records::employee_id.eq(employee_id));
    }
    if let Some(status) = query.status {
        q = q.filter(payroll_records::status.eq(status));
    }

    let list: Vec<PayrollRecord> = q
        .order(payroll_records::period_start.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn get_record(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PayrollRecord>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let record: PayrollRecord = payroll_records::table
        .filter(payroll_records::id.eq(id))
        .filter(payroll_records::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("payroll record".into()))?;
    ctx.require_employee_access(record.employee_id)?;
    Ok(Json(ApiResponse::ok(record)))
}

fn transition(
    state: &Arc<AppState>,
    ctx: &AuthContext,
    id: Uuid,
    from: &str,
    to: &str,
) -> Result<Json<ApiResponse<PayrollRecord>>, ApiError> {
    ctx.require_admin()?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut record: PayrollRecord = payroll_records::table
        .filter(payroll_records::id.eq(id))
        .filter(payroll_records::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("payroll record".into()))?;

    if record.status != from {
        return Err(ApiError::Conflict(format!(
            "payroll record is {}, expected {from}",
            record.status
        )));
    }

    record.status = to.to_string();
    if to == "paid" {
        record.paid_at = Some(Utc::now());
    }
    record.updated_at = Utc::now();
    diesel::update(payroll_records::table.filter(payroll_records::id.eq(id)))
        .set(&record)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn approve_record(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PayrollRecord>>, ApiError> {
    transition(&state, &ctx, id, "draft", "approved")
}

pub async fn mark_paid(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PayrollRecord>>, ApiError> {
    transition(&state, &ctx, id, "approved", "paid")
}

pub fn configure_payroll_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/hr/payroll", get(list_records))
        .route("/api/hr/payroll/generate", post(generate))
        .route("/api/hr/payroll/:id", get(get_record))
        .route("/api/hr/payroll/:id/approve", put(approve_record))
        .route("/api/hr/payroll/:id/pay", put(mark_paid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn bd(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_straight_time_only() {
        let pay = compute_pay(&bd("160"), &bd("0"), &bd("25"), &bd("0"), &bd("0"));
        assert_eq!(pay.regular_pay, bd("4000.00"));
        assert_eq!(pay.overtime_pay, bd("0.00"));
        assert_eq!(pay.gross_pay, bd("4000.00"));
        assert_eq!(pay.net_pay, bd("4000.00"));
    }

    #[test]
    fn test_overtime_at_time_and_a_half() {
        let pay = compute_pay(&bd("160"), &bd("10"), &bd("20"), &bd("0"), &bd("0"));
        assert_eq!(pay.regular_pay, bd("3200.00"));
        assert_eq!(pay.overtime_pay, bd("300.00"));
        assert_eq!(pay.gross_pay, bd("3500.00"));
    }

    #[test]
    fn test_allowances_and_deductions() {
        let pay = compute_pay(&bd("160"), &bd("0"), &bd("20"), &bd("150"), &bd("420.50"));
        assert_eq!(pay.gross_pay, bd("3350.00"));
        assert_eq!(pay.net_pay, bd("2929.50"));
    }

    #[test]
    fn test_fractional_hours_round_to_cents() {
        let pay = compute_pay(&bd("7.75"), &bd("0"), &bd("19.99"), &bd("0"), &bd("0"));
        assert_eq!(pay.regular_pay, bd("154.92"));
    }
}

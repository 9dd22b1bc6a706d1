use axum::{
    extract::{Query, State},
    routing::{get, post},
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
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{attendance_records, employees};
use crate::shared::state::AppState;
use crate::shared::utils::{minutes_to_hours, month_bounds, page_limit, page_offset};

const REGULAR_MINUTES_PER_DAY: i64 = 8 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = attendance_records)]
#[diesel(treat_none_as_null = true)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_id: Uuid,
    pub work_date: NaiveDate,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub total_hours: BigDecimal,
    pub overtime_hours: BigDecimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoursBreakdown {
    pub total_minutes: i64,
    pub overtime_minutes: i64,
}

impl HoursBreakdown {
    pub fn total_hours(&self) -> BigDecimal {
        minutes_to_hours(self.total_minutes)
    }

    pub fn overtime_hours(&self) -> BigDecimal {
        minutes_to_hours(self.overtime_minutes)
    }
}

/// Worked/overtime split for one attendance record. Regular time is capped
/// at eight hours per day; anything beyond is reported separately as
/// overtime. With either clock timestamp missing both figures stay zero.
/// A check-out before the check-in clamps to zero, which hides overnight
/// shifts; that behavior is intentional and load-bearing for callers.
pub fn compute_hours(
    check_in: Option<DateTime<Utc>>,
    check_out: Option<DateTime<Utc>>,
    break_start: Option<DateTime<Utc>>,
    break_end: Option<DateTime<Utc>>,
) -> HoursBreakdown {
    let (Some(check_in), Some(check_out)) = (check_in, check_out) else {
        return HoursBreakdown {
            total_minutes: 0,
            overtime_minutes: 0,
        };
    };

    let break_minutes = match (break_start, break_end) {
        (Some(start), Some(end)) => (end - start).num_minutes(),
        _ => 0,
    };

    let worked = (check_out - check_in).num_minutes() - break_minutes;
    let total = worked.max(0);

    if total > REGULAR_MINUTES_PER_DAY {
        HoursBreakdown {
            total_minutes: REGULAR_MINUTES_PER_DAY,
            overtime_minutes: total - REGULAR_MINUTES_PER_DAY,
        }
    } else {
        HoursBreakdown {
            total_minutes: total,
            overtime_minutes: 0,
        }
    }
}

/// What a check-in attempt should do given today's record, if any.
#[derive(Debug, PartialEq, Eq)]
pub enum CheckInAction {
    CreateNew,
    /// A completed session exists for the day; the record is re-opened and
    /// the next check-out overwrites the old one.
    Reopen,
}

pub fn resolve_check_in(existing: Option<&AttendanceRecord>) -> Result<CheckInAction, ApiError> {
    match existing {
        None => Ok(CheckInAction::CreateNew),
        Some(rec) if rec.check_in.is_some() && rec.check_out.is_none() => Err(ApiError::Conflict(
            "already checked in; check out first".into(),
        )),
        Some(_) => Ok(CheckInAction::Reopen),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClockRequest {
    pub employee_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub employee_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub employee_id: Uuid,
    /// Month in `YYYY-MM` form.
    pub month: String,
}

#[derive(Debug, Serialize)]
pub struct MonthlySummary {
    pub employee_id: Uuid,
    pub month: String,
    pub days_worked: i64,
    pub total_hours: BigDecimal,
    pub overtime_hours: BigDecimal,
}

fn ensure_employee(
    conn: &mut PgConnection,
    company_id: Uuid,
    employee_id: Uuid,
) -> Result<(), ApiError> {
    let found: i64 = employees::table
        .filter(employees::id.eq(employee_id))
        .filter(employees::company_id.eq(company_id))
        .count()
        .get_result(conn)?;
    if found == 0 {
        return Err(ApiError::NotFound("employee".into()));
    }
    Ok(())
}

fn todays_record(
    conn: &mut PgConnection,
    company_id: Uuid,
    employee_id: Uuid,
    work_date: NaiveDate,
) -> Result<Option<AttendanceRecord>, ApiError> {
    Ok(attendance_records::table
        .filter(attendance_records::company_id.eq(company_id))
        .filter(attendance_records::employee_id.eq(employee_id))
        .filter(attendance_records::work_date.eq(work_date))
        .first(conn)
        .optional()?)
}

fn store_totals(record: &mut AttendanceRecord) {
    let breakdown = compute_hours(
        record.check_in,
        record.check_out,
        record.break_start,
        record.break_end,
    );
    record.total_hours = breakdown.total_hours();
    record.overtime_hours = breakdown.overtime_hours();
    record.updated_at = Utc::now();
}

pub async fn check_in(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<ClockRequest>,
) -> Result<Json<ApiResponse<AttendanceRecord>>, ApiError> {
    ctx.require_employee_access(req.employee_id)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    ensure_employee(&mut conn, ctx.company_id, req.employee_id)?;

    let now = Utc::now();
    let today = now.date_naive();
    let existing = todays_record(&mut conn, ctx.company_id, req.employee_id, today)?;

    let record = match resolve_check_in(existing.as_ref())? {
        CheckInAction::CreateNew => {
            let record = AttendanceRecord {
                id: Uuid::new_v4(),
                company_id: ctx.company_id,
                employee_id: req.employee_id,
                work_date: today,
                check_in: Some(now),
                check_out: None,
                break_start: None,
                break_end: None,
                total_hours: minutes_to_hours(0),
                overtime_hours: minutes_to_hours(0),
                notes: None,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(attendance_records::table)
                .values(&record)
                .execute(&mut conn)?;
            record
        }
        CheckInAction::Reopen => {
            let mut record = existing.expect("reopen implies an existing record");
            record.check_out = None;
            record.break_start = None;
            record.break_end = None;
            store_totals(&mut record);
            diesel::update(attendance_records::table.filter(attendance_records::id.eq(record.id)))
                .set(&record)
                .execute(&mut conn)?;
            record
        }
    };

    info!(employee_id = %req.employee_id, "checked in");
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn check_out(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<ClockRequest>,
) -> Result<Json<ApiResponse<AttendanceRecord>>, ApiError> {
    ctx.require_employee_access(req.employee_id)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    ensure_employee(&mut conn, ctx.company_id, req.employee_id)?;

    let now = Utc::now();
    let mut record = todays_record(&mut conn, ctx.company_id, req.employee_id, now.date_naive())?
        .ok_or_else(|| ApiError::Conflict("not checked in today".into()))?;
    if record.check_in.is_none() || record.check_out.is_some() {
        return Err(ApiError::Conflict("no open session to check out of".into()));
    }

    record.check_out = Some(now);
    store_totals(&mut record);
    diesel::update(attendance_records::table.filter(attendance_records::id.eq(record.id)))
        .set(&record)
        .execute(&mut conn)?;

    info!(employee_id = %req.employee_id, "checked out");
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn break_start(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<ClockRequest>,
) -> Result<Json<ApiResponse<AttendanceRecord>>, ApiError> {
    ctx.require_employee_access(req.employee_id)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let now = Utc::now();
    let mut record = todays_record(&mut conn, ctx.company_id, req.employee_id, now.date_naive())?
        .ok_or_else(|| ApiError::Conflict("not checked in today".into()))?;
    if record.check_in.is_none() || record.check_out.is_some() {
        return Err(ApiError::Conflict("no open session for a break".into()));
    }
    if record.break_start.is_some() && record.break_end.is_none() {
        return Err(ApiError::Conflict("break already in progress".into()));
    }
    if record.break_start.is_some() {
        return Err(ApiError::Conflict("break already recorded for today".into()));
    }

    record.break_start = Some(now);
    record.updated_at = now;
    diesel::update(attendance_records::table.filter(attendance_records::id.eq(record.id)))
        .set(&record)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn break_end(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<ClockRequest>,
) -> Result<Json<ApiResponse<AttendanceRecord>>, ApiError> {
    ctx.require_employee_access(req.employee_id)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let now = Utc::now();
    let mut record = todays_record(&mut conn, ctx.company_id, req.employee_id, now.date_naive())?
        .ok_or_else(|| ApiError::Conflict("not checked in today".into()))?;
    if record.break_start.is_none() || record.break_end.is_some() {
        return Err(ApiError::Conflict("no break in progress".into()));
    }

    record.break_end = Some(now);
    store_totals(&mut record);
    diesel::update(attendance_records::table.filter(attendance_records::id.eq(record.id)))
        .set(&record)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<AttendanceRecord>>>, ApiError> {
    if let Some(employee_id) = query.employee_id {
        ctx.require_employee_access(employee_id)?;
    } else if let Some(own) = ctx.employee_id() {
        // Employee principals see only themselves even without a filter.
        return list_for_employee(&state, ctx.company_id, own, &query);
    }
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = attendance_records::table
        .filter(attendance_records::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(employee_id) = query.employee_id {
        q = q.filter(attendance_records::employee_id.eq(employee_id));
    }
    if let Some(from) = query.from {
        q = q.filter(attendance_records::work_date.ge(from));
    }
    if let Some(to) = query.to {
        q = q.filter(attendance_records::work_date.le(to));
    }

    let records: Vec<AttendanceRecord> = q
        .order(attendance_records::work_date.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(records)))
}

fn list_for_employee(
    state: &Arc<AppState>,
    company_id: Uuid,
    employee_id: Uuid,
    query: &ListQuery,
) -> Result<Json<ApiResponse<Vec<AttendanceRecord>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut q = attendance_records::table
        .filter(attendance_records::company_id.eq(company_id))
        .filter(attendance_records::employee_id.eq(employee_id))
        .into_boxed();
    if let Some(from) = query.from {
        q = q.filter(attendance_records::work_date.ge(from));
    }
    if let Some(to) = query.to {
        q = q.filter(attendance_records::work_date.le(to));
    }
    let records: Vec<AttendanceRecord> = q
        .order(attendance_records::work_date.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(records)))
}

pub async fn monthly_summary(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<ApiResponse<MonthlySummary>>, ApiError> {
    ctx.require_employee_access(query.employee_id)?;
    let (from, to) = month_bounds(&query.month)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    ensure_employee(&mut conn, ctx.company_id, query.employee_id)?;

    let records: Vec<AttendanceRecord> = attendance_records::table
        .filter(attendance_records::company_id.eq(ctx.company_id))
        .filter(attendance_records::employee_id.eq(query.employee_id))
        .filter(attendance_records::work_date.ge(from))
        .filter(attendance_records::work_date.le(to))
        .load(&mut conn)?;

    let days_worked = records
        .iter()
        .filter(|r| r.check_in.is_some() && r.check_out.is_some())
        .count() as i64;
    let total_hours: BigDecimal = records.iter().map(|r| r.total_hours.clone()).sum();
    let overtime_hours: BigDecimal = records.iter().map(|r| r.overtime_hours.clone()).sum();

    Ok(Json(ApiResponse::ok(MonthlySummary {
        employee_id: query.employee_id,
        month: query.month,
        days_worked,
        total_hours,
        overtime_hours,
    })))
}

pub fn configure_attendance_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/hr/attendance", get(list_records))
        .route("/api/hr/attendance/check-in", post(check_in))
        .route("/api/hr/attendance/check-out", post(check_out))
        .route("/api/hr/attendance/break/start", post(break_start))
        .route("/api/hr/attendance/break/end", post(break_end))
        .route("/api/hr/attendance/summary", get(monthly_summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn hours(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_short_day_no_break() {
        let b = compute_hours(Some(at(9, 0)), Some(at(16, 30)), None, None);
        assert_eq!(b.total_hours(), hours("7.50"));
        assert_eq!(b.overtime_hours(), hours("0.00"));
    }

    #[test]
    fn test_nine_hours_minus_lunch_is_exactly_eight() {
        let b = compute_hours(
            Some(at(9, 0)),
            Some(at(18, 0)),
            Some(at(12, 0)),
            Some(at(13, 0)),
        );
        assert_eq!(b.total_hours(), hours("8.00"));
        assert_eq!(b.overtime_hours(), hours("0.00"));
    }

    #[test]
    fn test_eleven_hours_splits_into_eight_plus_three() {
        let b = compute_hours(Some(at(8, 0)), Some(at(19, 0)), None, None);
        assert_eq!(b.total_hours(), hours("8.00"));
        assert_eq!(b.overtime_hours(), hours("3.00"));
    }

    #[test]
    fn test_break_deducted_before_overtime_split() {
        // 10h30m on the clock, 45m break: 9h45m worked -> 8h + 1.75h OT.
        let b = compute_hours(
            Some(at(8, 0)),
            Some(at(18, 30)),
            Some(at(12, 0)),
            Some(at(12, 45)),
        );
        assert_eq!(b.total_hours(), hours("8.00"));
        assert_eq!(b.overtime_hours(), hours("1.75"));
    }

    #[test]
    fn test_missing_check_out_yields_zeros() {
        let b = compute_hours(Some(at(9, 0)), None, None, None);
        assert_eq!(b.total_minutes, 0);
        assert_eq!(b.overtime_minutes, 0);
    }

    #[test]
    fn test_missing_check_in_yields_zeros() {
        let b = compute_hours(None, Some(at(17, 0)), None, None);
        assert_eq!(b.total_minutes, 0);
        assert_eq!(b.overtime_minutes, 0);
    }

    #[test]
    fn test_lone_break_timestamp_is_ignored() {
        let b = compute_hours(Some(at(9, 0)), Some(at(17, 0)), Some(at(12, 0)), None);
        assert_eq!(b.total_hours(), hours("8.00"));
    }

    #[test]
    fn test_checkout_before_checkin_clamps_to_zero() {
        // Overnight shift: clamped rather than negative.
        let b = compute_hours(Some(at(22, 0)), Some(at(6, 0)), None, None);
        assert_eq!(b.total_minutes, 0);
        assert_eq!(b.overtime_minutes, 0);
    }

    #[test]
    fn test_break_longer_than_shift_clamps_to_zero() {
        let b = compute_hours(
            Some(at(9, 0)),
            Some(at(10, 0)),
            Some(at(9, 0)),
            Some(at(11, 0)),
        );
        assert_eq!(b.total_minutes, 0);
    }

    #[test]
    fn test_recomputation_is_idempotent() {
        let args = (
            Some(at(8, 0)),
            Some(at(19, 0)),
            Some(at(12, 0)),
            Some(at(12, 30)),
        );
        let first = compute_hours(args.0, args.1, args.2, args.3);
        let second = compute_hours(args.0, args.1, args.2, args.3);
        assert_eq!(first, second);
    }

    fn record_with(
        check_in: Option<DateTime<Utc>>,
        check_out: Option<DateTime<Utc>>,
    ) -> AttendanceRecord {
        let now = Utc::now();
        AttendanceRecord {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            work_date: now.date_naive(),
            check_in,
            check_out,
            break_start: None,
            break_end: None,
            total_hours: hours("0.00"),
            overtime_hours: hours("0.00"),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_first_check_in_creates() {
        assert_eq!(resolve_check_in(None).unwrap(), CheckInAction::CreateNew);
    }

    #[test]
    fn test_double_check_in_rejected() {
        let open = record_with(Some(at(9, 0)), None);
        let err = resolve_check_in(Some(&open)).unwrap_err();
        assert_eq!(err.error_type(), "conflict");
    }

    #[test]
    fn test_check_in_after_checkout_reopens() {
        let closed = record_with(Some(at(9, 0)), Some(at(12, 0)));
        assert_eq!(resolve_check_in(Some(&closed)).unwrap(), CheckInAction::Reopen);
    }

}

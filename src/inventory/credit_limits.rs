use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{credit_limits, customers};
use crate::shared::state::AppState;
use crate::shared::utils::round2;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = credit_limits)]
#[diesel(treat_none_as_null = true)]
pub struct CreditLimit {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub credit_limit: BigDecimal,
    pub current_exposure: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Exposure changes are refused once they would pass the limit; reductions
/// are always allowed and floor at zero.
pub fn apply_exposure_delta(
    limit: &BigDecimal,
    current: &BigDecimal,
    delta: &BigDecimal,
) -> Result<BigDecimal, ApiError> {
    let next = round2(current + delta);
    if next < BigDecimal::from(0) {
        return Ok(round2(BigDecimal::from(0)));
    }
    if delta > &BigDecimal::from(0) && &next > limit {
        return Err(ApiError::Conflict(format!(
            "exposure {next} would exceed the credit limit {limit}"
        )));
    }
    Ok(next)
}

#[derive(Debug, Deserialize)]
pub struct SetLimitRequest {
    pub customer_id: Uuid,
    pub credit_limit: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct ExposureRequest {
    pub delta: BigDecimal,
}

pub async fn set_limit(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<SetLimitRequest>,
) -> Result<Json<ApiResponse<CreditLimit>>, ApiError> {
    ctx.require_admin()?;
    if req.credit_limit < BigDecimal::from(0) {
        return Err(ApiError::Validation("credit_limit must not be negative".into()));
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let found: i64 = customers::table
        .filter(customers::id.eq(req.customer_id))
        .filter(customers::company_id.eq(ctx.company_id))
        .count()
        .get_result(&mut conn)?;
    if found == 0 {
        return Err(ApiError::NotFound("customer".into()));
    }

    let now = Utc::now();
    let existing: Option<CreditLimit> = credit_limits::table
        .filter(credit_limits::company_id.eq(ctx.company_id))
        .filter(credit_limits::customer_id.eq(req.customer_id))
        .first(&mut conn)
        .optional()?;

    let record = match existing {
        Some(mut record) => {
            record.credit_limit = round2(req.credit_limit);
            record.updated_at = now;
            diesel::update(credit_limits::table.filter(credit_limits::id.eq(record.id)))
                .set(&record)
                .execute(&mut conn)?;
            record
        }
        None => {
            let record = CreditLimit {
                id: Uuid::new_v4(),
                company_id: ctx.company_id,
                customer_id: req.customer_id,
                credit_limit: round2(req.credit_limit),
                current_exposure: round2(BigDecimal::from(0)),
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(credit_limits::table)
                .values(&record)
                .execute(&mut conn)?;
            record
        }
    };

    info!(customer_id = %req.customer_id, "credit limit set");
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn get_limit(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CreditLimit>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let record: CreditLimit = credit_limits::table
        .filter(credit_limits::company_id.eq(ctx.company_id))
        .filter(credit_limits::customer_id.eq(customer_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("credit limit".into()))?;
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn adjust_exposure(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(customer_id): Path<Uuid>,
    Json(req): Json<ExposureRequest>,
) -> Result<Json<ApiResponse<CreditLimit>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut record: CreditLimit = credit_limits::table
        .filter(credit_limits::company_id.eq(ctx.company_id))
        .filter(credit_limits::customer_id.eq(customer_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("credit limit".into()))?;

    record.current_exposure =
        apply_exposure_delta(&record.credit_limit, &record.current_exposure, &req.delta)?;
    record.updated_at = Utc::now();

    diesel::update(credit_limits::table.filter(credit_limits::id.eq(record.id)))
        .set(&record)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn list_limits(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<ApiResponse<Vec<CreditLimit>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let list: Vec<CreditLimit> = credit_limits::table
        .filter(credit_limits::company_id.eq(ctx.company_id))
        .order(credit_limits::updated_at.desc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub fn configure_credit_limits_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/inventory/credit-limits", get(list_limits).post(set_limit))
        .route("/api/inventory/credit-limits/:customer_id", get(get_limit))
        .route(
            "/api/inventory/credit-limits/:customer_id/exposure",
            post(adjust_exposure),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn bd(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_exposure_within_limit() {
        let next = apply_exposure_delta(&bd("5000"), &bd("1000"), &bd("2500")).unwrap();
        assert_eq!(next, bd("3500.00"));
    }

    #[test]
    fn test_exposure_beyond_limit_conflicts() {
        let err = apply_exposure_delta(&bd("5000"), &bd("4000"), &bd("1000.01")).unwrap_err();
        assert_eq!(err.error_type(), "conflict");
    }

    #[test]
    fn test_exposure_exactly_at_limit_allowed() {
        let next = apply_exposure_delta(&bd("5000"), &bd("4000"), &bd("1000")).unwrap();
        assert_eq!(next, bd("5000.00"));
    }

    #[test]
    fn test_reduction_floors_at_zero() {
        let next = apply_exposure_delta(&bd("5000"), &bd("100"), &bd("-200")).unwrap();
        assert_eq!(next, bd("0.00"));
    }
}

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, sum};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::opportunities;
use crate::shared::state::AppState;
use crate::shared::utils::month_bounds;

#[derive(Debug, Deserialize)]
pub struct SalesQuery {
    /// Month in `YYYY-MM` form for the won-revenue figure.
    pub month: String,
}

#[derive(Debug, Serialize)]
pub struct StageSlice {
    pub stage: String,
    pub count: i64,
    pub pipeline_value: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct OwnerSlice {
    pub owner_id: Option<Uuid>,
    pub won_count: i64,
    pub won_value: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct SalesPerformance {
    pub month: String,
    pub pipeline_by_stage: Vec<StageSlice>,
    pub won_total: i64,
    pub lost_total: i64,
    pub win_rate: f64,
    pub by_owner: Vec<OwnerSlice>,
    pub monthly_won_revenue: BigDecimal,
}

pub fn win_rate(won: i64, lost: i64) -> f64 {
    if won + lost == 0 {
        return 0.0;
    }
    won as f64 / (won + lost) as f64
}

pub async fn sales_performance(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<SalesQuery>,
) -> Result<Json<ApiResponse<SalesPerformance>>, ApiError> {
    ctx.user_id()
        .ok_or_else(|| ApiError::Authorization("reports are manager-only".into()))?;
    let (from, to) = month_bounds(&query.month)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let by_stage: Vec<(String, i64, Option<BigDecimal>)> = opportunities::table
        .filter(opportunities::company_id.eq(ctx.company_id))
        .group_by(opportunities::stage)
        .select((
            opportunities::stage,
            count_star(),
            sum(opportunities::amount),
        ))
        .load(&mut conn)?;

    let won_total = by_stage
        .iter()
        .find(|row| row.0 == "won")
        .map(|row| row.1)
        .unwrap_or(0);
    let lost_total = by_stage
        .iter()
        .find(|row| row.0 == "lost")
        .map(|row| row.1)
        .unwrap_or(0);

    let by_owner: Vec<(Option<Uuid>, i64, Option<BigDecimal>)> = opportunities::table
        .filter(opportunities::company_id.eq(ctx.company_id))
        .filter(opportunities::stage.eq("won"))
        .group_by(opportunities::owner_id)
        .select((
            opportunities::owner_id,
            count_star(),
            sum(opportunities::amount),
        ))
        .load(&mut conn)?;

    let from_ts: DateTime<Utc> = from
        .and_hms_opt(0, 0, 0)
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now);
    let to_ts: DateTime<Utc> = to
        .and_hms_opt(23, 59, 59)
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now);
    let monthly_won: Option<BigDecimal> = opportunities::table
        .filter(opportunities::company_id.eq(ctx.company_id))
        .filter(opportunities::stage.eq("won"))
        .filter(opportunities::closed_at.ge(from_ts))
        .filter(opportunities::closed_at.le(to_ts))
        .select(sum(opportunities::amount))
        .first(&mut conn)?;

    Ok(Json(ApiResponse::ok(SalesPerformance {
        month: query.month,
        pipeline_by_stage: by_stage
            .into_iter()
            .map(|(stage, count, value)| StageSlice {
                stage,
                count,
                pipeline_value: value.unwrap_or_else(|| BigDecimal::from(0)),
            })
            .collect(),
        won_total,
        lost_total,
        win_rate: win_rate(won_total, lost_total),
        by_owner: by_owner
            .into_iter()
            .map(|(owner_id, won_count, value)| OwnerSlice {
                owner_id,
                won_count,
                won_value: value.unwrap_or_else(|| BigDecimal::from(0)),
            })
            .collect(),
        monthly_won_revenue: monthly_won.unwrap_or_else(|| BigDecimal::from(0)),
    })))
}

pub fn configure_crm_reports_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/crm/reports/sales", get(sales_performance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_rate() {
        assert_eq!(win_rate(0, 0), 0.0);
        assert_eq!(win_rate(3, 1), 0.75);
        assert_eq!(win_rate(0, 5), 0.0);
        assert_eq!(win_rate(5, 0), 1.0);
    }
}

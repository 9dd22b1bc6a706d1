use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::promotions;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset, round2};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = promotions)]
#[diesel(treat_none_as_null = true)]
pub struct Promotion {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promotion {
    /// Active means switched on and inside the date window, inclusive.
    pub fn is_running(&self, today: NaiveDate) -> bool {
        self.is_active && self.starts_on <= today && today <= self.ends_on
    }
}

/// Apply a percent or fixed discount to a price; the result never drops
/// below zero.
pub fn discounted_price(
    price: &BigDecimal,
    discount_type: &str,
    discount_value: &BigDecimal,
) -> Result<BigDecimal, ApiError> {
    let discounted = match discount_type {
        "percent" => price - round2(price * discount_value / BigDecimal::from(100)),
        "fixed" => price - discount_value,
        other => {
            return Err(ApiError::Validation(format!(
                "unknown discount_type '{other}'"
            )))
        }
    };
    Ok(round2(discounted.max(BigDecimal::from(0))))
}

fn check_discount(discount_type: &str, value: &BigDecimal) -> Result<(), ApiError> {
    match discount_type {
        "percent" => {
            if value < &BigDecimal::from(0) || value > &BigDecimal::from(100) {
                return Err(ApiError::Validation("percent discount must be 0-100".into()));
            }
        }
        "fixed" => {
            if value < &BigDecimal::from(0) {
                return Err(ApiError::Validation("fixed discount must not be negative".into()));
            }
        }
        other => {
            return Err(ApiError::Validation(format!(
                "unknown discount_type '{other}'"
            )))
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreatePromotionRequest {
    pub name: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: BigDecimal,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePromotionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub discount_value: Option<BigDecimal>,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub active_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_promotion(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreatePromotionRequest>,
) -> Result<Json<ApiResponse<Promotion>>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    if req.ends_on < req.starts_on {
        return Err(ApiError::Validation("ends_on precedes starts_on".into()));
    }
    check_discount(&req.discount_type, &req.discount_value)?;

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let now = Utc::now();
    let promotion = Promotion {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        name: req.name.trim().to_string(),
        description: req.description,
        discount_type: req.discount_type,
        discount_value: round2(req.discount_value),
        starts_on: req.starts_on,
        ends_on: req.ends_on,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(promotions::table)
        .values(&promotion)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(promotion)))
}

pub async fn list_promotions(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Promotion>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = promotions::table
        .filter(promotions::company_id.eq(ctx.company_id))
        .into_boxed();
    if query.active_only.unwrap_or(false) {
        let today = Utc::now().date_naive();
        q = q
            .filter(promotions::is_active.eq(true))
            .filter(promotions::starts_on.le(today))
            .filter(promotions::ends_on.ge(today));
    }

    let list: Vec<Promotion> = q
        .order(promotions::starts_on.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn update_promotion(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePromotionRequest>,
) -> Result<Json<ApiResponse<Promotion>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut promotion: Promotion = promotions::table
        .filter(promotions::id.eq(id))
        .filter(promotions::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("promotion".into()))?;

    if let Some(name) = req.name {
        promotion.name = name;
    }
    if let Some(description) = req.description {
        promotion.description = Some(description);
    }
    if let Some(value) = req.discount_value {
        check_discount(&promotion.discount_type, &value)?;
        promotion.discount_value = round2(value);
    }
    if let Some(starts_on) = req.starts_on {
        promotion.starts_on = starts_on;
    }
    if let Some(ends_on) = req.ends_on {
        promotion.ends_on = ends_on;
    }
    if promotion.ends_on < promotion.starts_on {
        return Err(ApiError::Validation("ends_on precedes starts_on".into()));
    }
    if let Some(is_active) = req.is_active {
        promotion.is_active = is_active;
    }
    promotion.updated_at = Utc::now();

    diesel::update(promotions::table.filter(promotions::id.eq(id)))
        .set(&promotion)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(promotion)))
}

pub async fn delete_promotion(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let deleted = diesel::delete(
        promotions::table
            .filter(promotions::id.eq(id))
            .filter(promotions::company_id.eq(ctx.company_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("promotion".into()));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub fn configure_promotions_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/inventory/promotions",
            get(list_promotions).post(create_promotion),
        )
        .route(
            "/api/inventory/promotions/:id",
            axum::routing::put(update_promotion).delete(delete_promotion),
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
    fn test_percent_discount() {
        assert_eq!(
            discounted_price(&bd("200.00"), "percent", &bd("25")).unwrap(),
            bd("150.00")
        );
    }

    #[test]
    fn test_fixed_discount_floors_at_zero() {
        assert_eq!(
            discounted_price(&bd("30.00"), "fixed", &bd("50")).unwrap(),
            bd("0.00")
        );
    }

    #[test]
    fn test_unknown_discount_type_rejected() {
        assert!(discounted_price(&bd("10"), "bogus", &bd("1")).is_err());
    }

    #[test]
    fn test_running_window_is_inclusive() {
        let now = Utc::now();
        let promo = Promotion {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            name: "spring".into(),
            description: None,
            discount_type: "percent".into(),
            discount_value: bd("10"),
            starts_on: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(promo.is_running(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
        assert!(promo.is_running(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()));
        assert!(!promo.is_running(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()));
        let off = Promotion {
            is_active: false,
            ..promo
        };
        assert!(!off.is_running(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()));
    }
}

use axum::{
    extract::{Path, Query, State},
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
use crate::shared::schema::{products, stock_movements};
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset, round2};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = products)]
#[diesel(treat_none_as_null = true)]
pub struct Product {
    pub id: Uuid,
    pub company_id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_price: BigDecimal,
    pub cost: BigDecimal,
    pub stock_quantity: i32,
    pub reorder_level: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = stock_movements)]
pub struct StockMovement {
    pub id: Uuid,
    pub company_id: Uuid,
    pub product_id: Uuid,
    pub delta: i32,
    pub reason: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Stock arithmetic with a floor at zero: adjustments may never drive the
/// on-hand quantity negative.
pub fn apply_stock_delta(current: i32, delta: i32) -> Result<i32, ApiError> {
    let next = current
        .checked_add(delta)
        .ok_or_else(|| ApiError::Validation("stock adjustment overflows".into()))?;
    if next < 0 {
        return Err(ApiError::Conflict(format!(
            "adjustment of {delta} would drive stock below zero (currently {current})"
        )));
    }
    Ok(next)
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_price: BigDecimal,
    pub cost: Option<BigDecimal>,
    pub stock_quantity: Option<i32>,
    pub reorder_level: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_price: Option<BigDecimal>,
    pub cost: Option<BigDecimal>,
    pub reorder_level: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i32,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateProductRequest>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    if req.sku.trim().is_empty() || req.name.trim().is_empty() {
        return Err(ApiError::Validation("sku and name are required".into()));
    }
    if let Some(qty) = req.stock_quantity {
        if qty < 0 {
            return Err(ApiError::Validation("stock_quantity must not be negative".into()));
        }
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let taken: i64 = products::table
        .filter(products::company_id.eq(ctx.company_id))
        .filter(products::sku.eq(req.sku.trim()))
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(ApiError::Conflict(format!("sku '{}' already exists", req.sku.trim())));
    }

    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        sku: req.sku.trim().to_string(),
        name: req.name.trim().to_string(),
        description: req.description,
        category: req.category,
        unit_price: round2(req.unit_price),
        cost: round2(req.cost.unwrap_or_else(|| BigDecimal::from(0))),
        stock_quantity: req.stock_quantity.unwrap_or(0),
        reorder_level: req.reorder_level.unwrap_or(0),
        status: "active".to_string(),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(products::table)
        .values(&product)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(product)))
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Product>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = products::table
        .filter(products::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(category) = query.category {
        q = q.filter(products::category.eq(category));
    }
    if let Some(status) = query.status {
        q = q.filter(products::status.eq(status));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(products::name.ilike(pattern.clone()).or(products::sku.ilike(pattern)));
    }

    let list: Vec<Product> = q
        .order(products::name.asc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

fn load_product(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> Result<Product, ApiError> {
    products::table
        .filter(products::id.eq(id))
        .filter(products::company_id.eq(company_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("product".into()))
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    Ok(Json(ApiResponse::ok(load_product(&mut conn, ctx.company_id, id)?)))
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut product = load_product(&mut conn, ctx.company_id, id)?;

    if let Some(name) = req.name {
        product.name = name;
    }
    if let Some(description) = req.description {
        product.description = Some(description);
    }
    if let Some(category) = req.category {
        product.category = Some(category);
    }
    if let Some(unit_price) = req.unit_price {
        product.unit_price = round2(unit_price);
    }
    if let Some(cost) = req.cost {
        product.cost = round2(cost);
    }
    if let Some(reorder_level) = req.reorder_level {
        product.reorder_level = reorder_level;
    }
    if let Some(status) = req.status {
        product.status = status;
    }
    product.updated_at = Utc::now();

    diesel::update(products::table.filter(products::id.eq(id)))
        .set(&product)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(product)))
}

/// Signed stock adjustment with an audit trail row.
pub async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    if req.delta == 0 {
        return Err(ApiError::Validation("delta must not be zero".into()));
    }
    if req.reason.trim().is_empty() {
        return Err(ApiError::Validation("a reason is required".into()));
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut product = load_product(&mut conn, ctx.company_id, id)?;
    product.stock_quantity = apply_stock_delta(product.stock_quantity, req.delta)?;
    product.updated_at = Utc::now();

    let movement = StockMovement {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        product_id: id,
        delta: req.delta,
        reason: req.reason,
        created_by: ctx.user_id(),
        created_at: Utc::now(),
    };

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::update(products::table.filter(products::id.eq(id)))
            .set(&product)
            .execute(conn)?;
        diesel::insert_into(stock_movements::table)
            .values(&movement)
            .execute(conn)?;
        Ok(())
    })?;

    info!(product_id = %id, delta = req.delta, "stock adjusted");
    Ok(Json(ApiResponse::ok(product)))
}

pub async fn list_movements(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<StockMovement>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    load_product(&mut conn, ctx.company_id, id)?;

    let list: Vec<StockMovement> = stock_movements::table
        .filter(stock_movements::product_id.eq(id))
        .filter(stock_movements::company_id.eq(ctx.company_id))
        .order(stock_movements::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

/// Procurement view: active products at or below their reorder level.
pub async fn list_low_stock(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<ApiResponse<Vec<Product>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let list: Vec<Product> = products::table
        .filter(products::company_id.eq(ctx.company_id))
        .filter(products::status.eq("active"))
        .filter(products::stock_quantity.le(products::reorder_level))
        .order(products::stock_quantity.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let deleted = diesel::delete(
        products::table
            .filter(products::id.eq(id))
            .filter(products::company_id.eq(ctx.company_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("product".into()));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub fn configure_products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/inventory/products",
            get(list_products).post(create_product),
        )
        .route("/api/inventory/products/low-stock", get(list_low_stock))
        .route(
            "/api/inventory/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/inventory/products/:id/stock", post(adjust_stock))
        .route("/api/inventory/products/:id/movements", get(list_movements))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_delta_applies() {
        assert_eq!(apply_stock_delta(10, 5).unwrap(), 15);
        assert_eq!(apply_stock_delta(10, -10).unwrap(), 0);
    }

    #[test]
    fn test_stock_never_goes_negative() {
        let err = apply_stock_delta(3, -4).unwrap_err();
        assert_eq!(err.error_type(), "conflict");
    }

    #[test]
    fn test_stock_overflow_guard() {
        assert!(apply_stock_delta(i32::MAX, 1).is_err());
    }
}

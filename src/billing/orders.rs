use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
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
use crate::billing::invoices::{insert_invoice_for_order, Invoice};
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{customers, orders};
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset, round2};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = orders)]
#[diesel(treat_none_as_null = true)]
pub struct Order {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub quote_id: Option<Uuid>,
    pub order_number: String,
    pub status: String,
    pub total: BigDecimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn order_transition_allowed(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("pending", "confirmed")
            | ("pending", "cancelled")
            | ("confirmed", "delivered")
            | ("confirmed", "cancelled")
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub total: BigDecimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn generate_order_number(conn: &mut PgConnection, company_id: Uuid) -> Result<String, ApiError> {
    let count: i64 = orders::table
        .filter(orders::company_id.eq(company_id))
        .count()
        .get_result(conn)?;
    Ok(format!("ORD-{:06}", count + 1))
}

pub fn insert_order(
    conn: &mut PgConnection,
    company_id: Uuid,
    customer_id: Uuid,
    quote_id: Option<Uuid>,
    total: BigDecimal,
    notes: Option<String>,
) -> Result<Order, ApiError> {
    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        company_id,
        customer_id,
        quote_id,
        order_number: generate_order_number(conn, company_id)?,
        status: "pending".to_string(),
        total: round2(total),
        notes,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(orders::table).values(&order).execute(conn)?;
    Ok(order)
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    if req.total < BigDecimal::from(0) {
        return Err(ApiError::Validation("total must not be negative".into()));
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

    let order = insert_order(
        &mut conn,
        ctx.company_id,
        req.customer_id,
        None,
        req.total,
        req.notes,
    )?;
    Ok(Json(ApiResponse::ok(order)))
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Order>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = orders::table
        .filter(orders::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(customer_id) = query.customer_id {
        q = q.filter(orders::customer_id.eq(customer_id));
    }
    if let Some(status) = query.status {
        q = q.filter(orders::status.eq(status));
    }

    let list: Vec<Order> = q
        .order(orders::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub fn load_order(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> Result<Order, ApiError> {
    orders::table
        .filter(orders::id.eq(id))
        .filter(orders::company_id.eq(company_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("order".into()))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    Ok(Json(ApiResponse::ok(load_order(&mut conn, ctx.company_id, id)?)))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut order = load_order(&mut conn, ctx.company_id, id)?;

    if !order_transition_allowed(&order.status, &req.status) {
        return Err(ApiError::Conflict(format!(
            "cannot move order from {} to {}",
            order.status, req.status
        )));
    }

    order.status = req.status;
    order.updated_at = Utc::now();
    diesel::update(orders::table.filter(orders::id.eq(id)))
        .set(&order)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(order)))
}

/// Confirmed order produces a draft invoice over the order total.
pub async fn create_invoice(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let order = load_order(&mut conn, ctx.company_id, id)?;

    if order.status == "pending" || order.status == "cancelled" {
        return Err(ApiError::Conflict(format!(
            "cannot invoice a {} order",
            order.status
        )));
    }

    let invoice = insert_invoice_for_order(&mut conn, &order)?;
    info!(order_id = %id, invoice_id = %invoice.id, "invoice created from order");
    Ok(Json(ApiResponse::ok(invoice)))
}

pub fn configure_orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/billing/orders", get(list_orders).post(create_order))
        .route("/api/billing/orders/:id", get(get_order))
        .route("/api/billing/orders/:id/status", put(change_status))
        .route("/api/billing/orders/:id/invoice", post(create_invoice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_lifecycle() {
        assert!(order_transition_allowed("pending", "confirmed"));
        assert!(order_transition_allowed("confirmed", "delivered"));
        assert!(order_transition_allowed("pending", "cancelled"));
        assert!(order_transition_allowed("confirmed", "cancelled"));
    }

    #[test]
    fn test_order_lifecycle_rejects_shortcuts() {
        assert!(!order_transition_allowed("pending", "delivered"));
        assert!(!order_transition_allowed("delivered", "pending"));
        assert!(!order_transition_allowed("cancelled", "confirmed"));
    }
}

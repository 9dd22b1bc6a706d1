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
use crate::billing::orders::Order;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{customers, orders, quote_items, quotes};
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset, round2};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = quotes)]
#[diesel(treat_none_as_null = true)]
pub struct Quote {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub quote_number: String,
    pub status: String,
    pub valid_until: Option<NaiveDate>,
    pub subtotal: BigDecimal,
    pub discount: BigDecimal,
    pub total: BigDecimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = quote_items)]
pub struct QuoteItem {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub line_total: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct QuoteItemInput {
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateQuoteRequest {
    pub customer_id: Uuid,
    pub valid_until: Option<NaiveDate>,
    pub discount: Option<BigDecimal>,
    pub notes: Option<String>,
    pub items: Vec<QuoteItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QuoteWithItems {
    pub quote: Quote,
    pub items: Vec<QuoteItem>,
}

pub fn quote_transition_allowed(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("draft", "sent")
            | ("sent", "accepted")
            | ("sent", "rejected")
            | ("sent", "expired")
    )
}

fn generate_quote_number(conn: &mut PgConnection, company_id: Uuid) -> Result<String, ApiError> {
    let count: i64 = quotes::table
        .filter(quotes::company_id.eq(company_id))
        .count()
        .get_result(conn)?;
    Ok(format!("QUO-{:06}", count + 1))
}

fn ensure_customer(
    conn: &mut PgConnection,
    company_id: Uuid,
    customer_id: Uuid,
) -> Result<(), ApiError> {
    let found: i64 = customers::table
        .filter(customers::id.eq(customer_id))
        .filter(customers::company_id.eq(company_id))
        .count()
        .get_result(conn)?;
    if found == 0 {
        return Err(ApiError::NotFound("customer".into()));
    }
    Ok(())
}

pub async fn create_quote(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateQuoteRequest>,
) -> Result<Json<ApiResponse<QuoteWithItems>>, ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::Validation("a quote needs at least one line item".into()));
    }
    for item in &req.items {
        if item.quantity <= 0 {
            return Err(ApiError::Validation("line quantity must be positive".into()));
        }
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    ensure_customer(&mut conn, ctx.company_id, req.customer_id)?;

    let now = Utc::now();
    let quote_id = Uuid::new_v4();
    let items: Vec<QuoteItem> = req
        .items
        .into_iter()
        .map(|item| {
            let line_total = round2(&item.unit_price * BigDecimal::from(item.quantity));
            QuoteItem {
                id: Uuid::new_v4(),
                quote_id,
                product_id: item.product_id,
                description: item.description,
                quantity: item.quantity,
                unit_price: round2(item.unit_price),
                line_total,
            }
        })
        .collect();

    let subtotal: BigDecimal = items.iter().map(|i| i.line_total.clone()).sum();
    let discount = round2(req.discount.unwrap_or_else(|| BigDecimal::from(0)));
    if discount > subtotal {
        return Err(ApiError::Validation("discount exceeds subtotal".into()));
    }
    let total = round2(&subtotal - &discount);

    let quote = Quote {
        id: quote_id,
        company_id: ctx.company_id,
        customer_id: req.customer_id,
        quote_number: generate_quote_number(&mut conn, ctx.company_id)?,
        status: "draft".to_string(),
        valid_until: req.valid_until,
        subtotal: round2(subtotal),
        discount,
        total,
        notes: req.notes,
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(quotes::table).values(&quote).execute(conn)?;
        diesel::insert_into(quote_items::table)
            .values(&items)
            .execute(conn)?;
        Ok(())
    })?;

    Ok(Json(ApiResponse::ok(QuoteWithItems { quote, items })))
}

pub async fn list_quotes(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Quote>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = quotes::table
        .filter(quotes::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(customer_id) = query.customer_id {
        q = q.filter(quotes::customer_id.eq(customer_id));
    }
    if let Some(status) = query.status {
        q = q.filter(quotes::status.eq(status));
    }

    let list: Vec<Quote> = q
        .order(quotes::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

fn load_quote(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> Result<Quote, ApiError> {
    quotes::table
        .filter(quotes::id.eq(id))
        .filter(quotes::company_id.eq(company_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("quote".into()))
}

pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<QuoteWithItems>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let quote = load_quote(&mut conn, ctx.company_id, id)?;
    let items: Vec<QuoteItem> = quote_items::table
        .filter(quote_items::quote_id.eq(id))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(QuoteWithItems { quote, items })))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<super::orders::StatusRequest>,
) -> Result<Json<ApiResponse<Quote>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut quote = load_quote(&mut conn, ctx.company_id, id)?;

    if !quote_transition_allowed(&quote.status, &req.status) {
        return Err(ApiError::Conflict(format!(
            "cannot move quote from {} to {}",
            quote.status, req.status
        )));
    }

    quote.status = req.status;
    quote.updated_at = Utc::now();
    diesel::update(quotes::table.filter(quotes::id.eq(id)))
        .set(&quote)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(quote)))
}

/// Accepted quote becomes a pending order carrying the quoted total.
pub async fn convert_quote(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let quote = load_quote(&mut conn, ctx.company_id, id)?;

    if quote.status != "accepted" {
        return Err(ApiError::Conflict(format!(
            "only accepted quotes convert to orders, this one is {}",
            quote.status
        )));
    }

    let existing: i64 = orders::table
        .filter(orders::company_id.eq(ctx.company_id))
        .filter(orders::quote_id.eq(id))
        .count()
        .get_result(&mut conn)?;
    if existing > 0 {
        return Err(ApiError::Conflict("quote is already converted to an order".into()));
    }

    let order = super::orders::insert_order(
        &mut conn,
        ctx.company_id,
        quote.customer_id,
        Some(quote.id),
        quote.total.clone(),
        quote.notes.clone(),
    )?;

    info!(quote_id = %id, order_id = %order.id, "quote converted to order");
    Ok(Json(ApiResponse::ok(order)))
}

pub async fn delete_quote(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let quote = load_quote(&mut conn, ctx.company_id, id)?;
    if quote.status != "draft" {
        return Err(ApiError::Conflict("only draft quotes can be deleted".into()));
    }

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(quote_items::table.filter(quote_items::quote_id.eq(id))).execute(conn)?;
        diesel::delete(quotes::table.filter(quotes::id.eq(id))).execute(conn)?;
        Ok(())
    })?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub fn configure_quotes_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/billing/quotes", get(list_quotes).post(create_quote))
        .route(
            "/api/billing/quotes/:id",
            get(get_quote).delete(delete_quote),
        )
        .route("/api/billing/quotes/:id/status", put(change_status))
        .route("/api/billing/quotes/:id/convert", post(convert_quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_lifecycle() {
        assert!(quote_transition_allowed("draft", "sent"));
        assert!(quote_transition_allowed("sent", "accepted"));
        assert!(quote_transition_allowed("sent", "rejected"));
        assert!(quote_transition_allowed("sent", "expired"));
    }

    #[test]
    fn test_quote_lifecycle_rejects_shortcuts() {
        assert!(!quote_transition_allowed("draft", "accepted"));
        assert!(!quote_transition_allowed("accepted", "draft"));
        assert!(!quote_transition_allowed("rejected", "sent"));
    }
}

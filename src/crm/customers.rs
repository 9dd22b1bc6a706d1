use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::customers;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = customers)]
#[diesel(treat_none_as_null = true)]
pub struct Customer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub address: Option<String>,
    pub owner_id: Option<Uuid>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub address: Option<String>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub address: Option<String>,
    pub owner_id: Option<Uuid>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub industry: Option<String>,
    pub status: Option<String>,
    pub owner_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let now = Utc::now();
    let customer = Customer {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        name: req.name.trim().to_string(),
        email: req.email.map(|e| e.trim().to_lowercase()),
        phone: req.phone,
        industry: req.industry,
        address: req.address,
        owner_id: req.owner_id.or(ctx.user_id()),
        status: "active".to_string(),
        notes: req.notes,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(customers::table)
        .values(&customer)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(customer)))
}

pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Customer>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = customers::table
        .filter(customers::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(industry) = query.industry {
        q = q.filter(customers::industry.eq(industry));
    }
    if let Some(status) = query.status {
        q = q.filter(customers::status.eq(status));
    }
    if let Some(owner_id) = query.owner_id {
        q = q.filter(customers::owner_id.eq(owner_id));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            customers::name
                .ilike(pattern.clone())
                .or(customers::email.ilike(pattern)),
        );
    }

    let list: Vec<Customer> = q
        .order(customers::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let customer: Customer = customers::table
        .filter(customers::id.eq(id))
        .filter(customers::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("customer".into()))?;
    Ok(Json(ApiResponse::ok(customer)))
}

pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCustomerRequest>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut customer: Customer = customers::table
        .filter(customers::id.eq(id))
        .filter(customers::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("customer".into()))?;

    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".into()));
        }
        customer.name = name;
    }
    if let Some(email) = req.email {
        customer.email = Some(email.trim().to_lowercase());
    }
    if let Some(phone) = req.phone {
        customer.phone = Some(phone);
    }
    if let Some(industry) = req.industry {
        customer.industry = Some(industry);
    }
    if let Some(address) = req.address {
        customer.address = Some(address);
    }
    if let Some(owner_id) = req.owner_id {
        customer.owner_id = Some(owner_id);
    }
    if let Some(status) = req.status {
        customer.status = status;
    }
    if let Some(notes) = req.notes {
        customer.notes = Some(notes);
    }
    customer.updated_at = Utc::now();

    diesel::update(customers::table.filter(customers::id.eq(id)))
        .set(&customer)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(customer)))
}

pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let deleted = diesel::delete(
        customers::table
            .filter(customers::id.eq(id))
            .filter(customers::company_id.eq(ctx.company_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("customer".into()));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub fn configure_customers_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/crm/customers",
            get(list_customers).post(create_customer),
        )
        .route(
            "/api/crm/customers/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
}

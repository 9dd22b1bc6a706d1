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

use crate::auth::{self, AuthContext};
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::employees;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset, round2};

pub const EMPLOYEE_STATUSES: [&str; 3] = ["active", "on_leave", "terminated"];

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = employees)]
#[diesel(treat_none_as_null = true)]
pub struct Employee {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub hourly_rate: BigDecimal,
    pub hire_date: Option<NaiveDate>,
    #[serde(skip_serializing, default)]
    pub pin_hash: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub employee_code: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub hourly_rate: Option<BigDecimal>,
    pub hire_date: Option<NaiveDate>,
    pub pin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmployeeRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub hourly_rate: Option<BigDecimal>,
    pub hire_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub pin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub department: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateEmployeeRequest>,
) -> Result<Json<ApiResponse<Employee>>, ApiError> {
    ctx.require_admin()?;
    if req.employee_code.trim().is_empty() {
        return Err(ApiError::Validation("employee_code is required".into()));
    }
    if req.first_name.trim().is_empty() {
        return Err(ApiError::Validation("first_name is required".into()));
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let taken: i64 = employees::table
        .filter(employees::company_id.eq(ctx.company_id))
        .filter(employees::employee_code.eq(req.employee_code.trim()))
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(ApiError::Conflict(format!(
            "employee code '{}' already exists",
            req.employee_code.trim()
        )));
    }

    let now = Utc::now();
    let employee = Employee {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        user_id: None,
        employee_code: req.employee_code.trim().to_string(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name,
        email: req.email.map(|e| e.trim().to_lowercase()),
        phone: req.phone,
        department: req.department,
        position: req.position,
        hourly_rate: round2(req.hourly_rate.unwrap_or_else(|| BigDecimal::from(0))),
        hire_date: req.hire_date,
        pin_hash: match req.pin {
            Some(pin) => Some(auth::hash_password(&pin)?),
            None => None,
        },
        status: "active".to_string(),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(employees::table)
        .values(&employee)
        .execute(&mut conn)?;

    Ok(Json(ApiResponse::ok(employee)))
}

pub async fn list_employees(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Employee>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = employees::table
        .filter(employees::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(department) = query.department {
        q = q.filter(employees::department.eq(department));
    }
    if let Some(status) = query.status {
        q = q.filter(employees::status.eq(status));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            employees::first_name
                .ilike(pattern.clone())
                .or(employees::last_name.ilike(pattern.clone()))
                .or(employees::employee_code.ilike(pattern)),
        );
    }

    let list: Vec<Employee> = q
        .order(employees::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Employee>>, ApiError> {
    ctx.require_employee_access(id)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let employee: Employee = employees::table
        .filter(employees::id.eq(id))
        .filter(employees::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("employee".into()))?;
    Ok(Json(ApiResponse::ok(employee)))
}

pub async fn update_employee(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEmployeeRequest>,
) -> Result<Json<ApiResponse<Employee>>, ApiError> {
    ctx.require_admin()?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut employee: Employee = employees::table
        .filter(employees::id.eq(id))
        .filter(employees::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("employee".into()))?;

    if let Some(status) = &req.status {
        if !EMPLOYEE_STATUSES.contains(&status.as_str()) {
            return Err(ApiError::Validation(format!("unknown status '{status}'")));
        }
        employee.status = status.clone();
    }
    if let Some(first_name) = req.first_name {
        employee.first_name = first_name;
    }
    if let Some(last_name) = req.last_name {
        employee.last_name = Some(last_name);
    }
    if let Some(email) = req.email {
        employee.email = Some(email.trim().to_lowercase());
    }
    if let Some(phone) = req.phone {
        employee.phone = Some(phone);
    }
    if let Some(department) = req.department {
        employee.department = Some(department);
    }
    if let Some(position) = req.position {
        employee.position = Some(position);
    }
    if let Some(rate) = req.hourly_rate {
        employee.hourly_rate = round2(rate);
    }
    if let Some(hire_date) = req.hire_date {
        employee.hire_date = Some(hire_date);
    }
    if let Some(pin) = req.pin {
        employee.pin_hash = Some(auth::hash_password(&pin)?);
    }
    employee.updated_at = Utc::now();

    diesel::update(employees::table.filter(employees::id.eq(id)))
        .set(&employee)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(employee)))
}

pub async fn delete_employee(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    ctx.require_admin()?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let deleted = diesel::delete(
        employees::table
            .filter(employees::id.eq(id))
            .filter(employees::company_id.eq(ctx.company_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("employee".into()));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub fn configure_employees_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/hr/employees",
            get(list_employees).post(create_employee),
        )
        .route(
            "/api/hr/employees/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
}

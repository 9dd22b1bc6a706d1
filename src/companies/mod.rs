use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{self, AuthContext};
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{companies, users};
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = companies)]
#[diesel(treat_none_as_null = true)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub settings: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub company_name: String,
    pub slug: Option<String>,
    pub admin_email: String,
    pub admin_password: String,
    pub admin_display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub company: Company,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub settings: Option<serde_json::Value>,
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Tenant registration: creates the company record and its first admin user
/// in one transaction, then hands back a user token.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<RegisterResponse>>, ApiError> {
    if req.company_name.trim().is_empty() {
        return Err(ApiError::Validation("company_name is required".into()));
    }
    if !req.admin_email.contains('@') {
        return Err(ApiError::Validation("admin_email is not a valid address".into()));
    }
    if req.admin_password.len() < 8 {
        return Err(ApiError::Validation(
            "admin_password must be at least 8 characters".into(),
        ));
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let now = Utc::now();
    let slug = req
        .slug
        .map(|s| slugify(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&req.company_name));

    let taken: i64 = companies::table
        .filter(companies::slug.eq(&slug))
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(ApiError::Conflict(format!("slug '{slug}' is already taken")));
    }

    let company = Company {
        id: Uuid::new_v4(),
        name: req.company_name.trim().to_string(),
        slug,
        email: Some(req.admin_email.trim().to_lowercase()),
        phone: None,
        address: None,
        settings: serde_json::json!({}),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    let admin = User {
        id: Uuid::new_v4(),
        company_id: company.id,
        email: req.admin_email.trim().to_lowercase(),
        password_hash: auth::hash_password(&req.admin_password)?,
        display_name: req
            .admin_display_name
            .unwrap_or_else(|| "Administrator".to_string()),
        role: "admin".to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(companies::table)
            .values(&company)
            .execute(conn)?;
        diesel::insert_into(users::table).values(&admin).execute(conn)?;
        Ok(())
    })?;

    let token = auth::issue_user_token(&state.config.auth, admin.id, company.id, "admin")?;
    info!(company_id = %company.id, "company registered");
    Ok(Json(ApiResponse::ok(RegisterResponse { company, token })))
}

pub async fn get_company(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<ApiResponse<Company>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let company: Company = companies::table
        .filter(companies::id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("company".into()))?;
    Ok(Json(ApiResponse::ok(company)))
}

pub async fn update_company(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<UpdateCompanyRequest>,
) -> Result<Json<ApiResponse<Company>>, ApiError> {
    ctx.require_admin()?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut company: Company = companies::table
        .filter(companies::id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("company".into()))?;

    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".into()));
        }
        company.name = name;
    }
    if let Some(email) = req.email {
        company.email = Some(email);
    }
    if let Some(phone) = req.phone {
        company.phone = Some(phone);
    }
    if let Some(address) = req.address {
        company.address = Some(address);
    }
    if let Some(settings) = req.settings {
        company.settings = settings;
    }
    company.updated_at = Utc::now();

    diesel::update(companies::table.filter(companies::id.eq(ctx.company_id)))
        .set(&company)
        .execute(&mut conn)?;

    Ok(Json(ApiResponse::ok(company)))
}

pub fn configure_companies_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/companies/register", post(register))
        .route("/api/companies/me", get(get_company).put(update_company))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
        assert_eq!(slugify("  Röd & Blå AB  "), "r-d-bl-ab");
        assert_eq!(slugify("already-slugged"), "already-slugged");
        assert_eq!(slugify("!!!"), "");
    }
}

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{employees, users};
use crate::shared::state::AppState;

pub const SCHEME_USER: &str = "user";
pub const SCHEME_EMPLOYEE: &str = "employee";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub company_id: Uuid,
    pub scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Who is calling, and for which tenant. Extracted from the bearer token on
/// every authenticated request; `company_id` is the only tenant key handlers
/// may scope queries with.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub company_id: Uuid,
    pub principal: Principal,
}

#[derive(Debug, Clone)]
pub enum Principal {
    User { user_id: Uuid, role: String },
    Employee { employee_id: Uuid },
}

impl AuthContext {
    pub fn actor_id(&self) -> Uuid {
        match &self.principal {
            Principal::User { user_id, .. } => *user_id,
            Principal::Employee { employee_id } => *employee_id,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match &self.principal {
            Principal::User { user_id, .. } => Some(*user_id),
            Principal::Employee { .. } => None,
        }
    }

    pub fn employee_id(&self) -> Option<Uuid> {
        match &self.principal {
            Principal::Employee { employee_id } => Some(*employee_id),
            Principal::User { .. } => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(&self.principal, Principal::User { role, .. } if role == "admin")
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Authorization("admin role required".into()))
        }
    }

    /// Employee-token callers may only act on their own employee record.
    pub fn require_employee_access(&self, employee_id: Uuid) -> Result<(), ApiError> {
        match &self.principal {
            Principal::User { .. } => Ok(()),
            Principal::Employee { employee_id: own } if *own == employee_id => Ok(()),
            Principal::Employee { .. } => Err(ApiError::Authorization(
                "employees may only access their own records".into(),
            )),
        }
    }
}

pub fn issue_user_token(
    auth: &AuthConfig,
    user_id: Uuid,
    company_id: Uuid,
    role: &str,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        company_id,
        scheme: SCHEME_USER.to_string(),
        role: Some(role.to_string()),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::hours(auth.token_ttl_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token encoding: {e}")))
}

pub fn issue_employee_token(
    auth: &AuthConfig,
    employee_id: Uuid,
    company_id: Uuid,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: employee_id,
        company_id,
        scheme: SCHEME_EMPLOYEE.to_string(),
        role: None,
        iat: now.timestamp(),
        exp: (now + chrono::Duration::hours(auth.token_ttl_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.employee_jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token encoding: {e}")))
}

fn decode_with(token: &str, secret: &str) -> Option<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .ok()
}

/// Validate a bearer token against the two parallel schemes: the regular
/// user scheme first, then the employee scheme.
pub fn verify_bearer(token: &str, auth: &AuthConfig) -> Result<AuthContext, ApiError> {
    if let Some(claims) = decode_with(token, &auth.jwt_secret) {
        if claims.scheme == SCHEME_USER {
            return Ok(AuthContext {
                company_id: claims.company_id,
                principal: Principal::User {
                    user_id: claims.sub,
                    role: claims.role.unwrap_or_else(|| "member".to_string()),
                },
            });
        }
    }
    if let Some(claims) = decode_with(token, &auth.employee_jwt_secret) {
        if claims.scheme == SCHEME_EMPLOYEE {
            return Ok(AuthContext {
                company_id: claims.company_id,
                principal: Principal::Employee {
                    employee_id: claims.sub,
                },
            });
        }
    }
    Err(ApiError::Authentication("invalid or expired token".into()))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Authentication("missing Authorization header".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Authentication("expected a bearer token".into()))?;
        verify_bearer(token, &state.config.auth)
    }
}

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing: {e}")))
}

pub fn verify_password(plain: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeLoginRequest {
    pub employee_code: String,
    pub pin: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub company_id: Uuid,
    pub principal_id: Uuid,
    pub scheme: String,
    pub display_name: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let row: (Uuid, Uuid, String, String, String, bool) = users::table
        .filter(users::email.eq(req.email.trim().to_lowercase()))
        .select((
            users::id,
            users::company_id,
            users::password_hash,
            users::role,
            users::display_name,
            users::is_active,
        ))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::Authentication("unknown email or password".into()))?;

    let (user_id, company_id, password_hash, role, display_name, is_active) = row;
    if !is_active || !verify_password(&req.password, &password_hash) {
        return Err(ApiError::Authentication("unknown email or password".into()));
    }

    let token = issue_user_token(&state.config.auth, user_id, company_id, &role)?;
    info!(%user_id, %company_id, "user logged in");
    Ok(Json(ApiResponse::ok(LoginResponse {
        token,
        company_id,
        principal_id: user_id,
        scheme: SCHEME_USER.to_string(),
        display_name,
    })))
}

pub async fn employee_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmployeeLoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let row: (Uuid, Uuid, Option<String>, String, String) = employees::table
        .filter(employees::employee_code.eq(req.employee_code.trim()))
        .select((
            employees::id,
            employees::company_id,
            employees::pin_hash,
            employees::first_name,
            employees::status,
        ))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::Authentication("unknown employee code or PIN".into()))?;

    let (employee_id, company_id, pin_hash, first_name, status) = row;
    let pin_ok = pin_hash
        .as_deref()
        .map(|h| verify_password(&req.pin, h))
        .unwrap_or(false);
    if status == "terminated" || !pin_ok {
        return Err(ApiError::Authentication("unknown employee code or PIN".into()));
    }

    let token = issue_employee_token(&state.config.auth, employee_id, company_id)?;
    info!(%employee_id, %company_id, "employee logged in");
    Ok(Json(ApiResponse::ok(LoginResponse {
        token,
        company_id,
        principal_id: employee_id,
        scheme: SCHEME_EMPLOYEE.to_string(),
        display_name: first_name,
    })))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/employee/login", post(employee_login))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "user-secret".into(),
            employee_jwt_secret: "employee-secret".into(),
            token_ttl_hours: 24,
        }
    }

    #[test]
    fn test_user_token_round_trip() {
        let cfg = test_config();
        let user_id = Uuid::new_v4();
        let company_id = Uuid::new_v4();
        let token = issue_user_token(&cfg, user_id, company_id, "admin").unwrap();

        let ctx = verify_bearer(&token, &cfg).unwrap();
        assert_eq!(ctx.company_id, company_id);
        assert_eq!(ctx.user_id(), Some(user_id));
        assert!(ctx.is_admin());
    }

    #[test]
    fn test_employee_token_uses_second_scheme() {
        let cfg = test_config();
        let employee_id = Uuid::new_v4();
        let company_id = Uuid::new_v4();
        let token = issue_employee_token(&cfg, employee_id, company_id).unwrap();

        let ctx = verify_bearer(&token, &cfg).unwrap();
        assert_eq!(ctx.employee_id(), Some(employee_id));
        assert_eq!(ctx.user_id(), None);
        assert!(!ctx.is_admin());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let cfg = test_config();
        let err = verify_bearer("not-a-token", &cfg).unwrap_err();
        assert_eq!(err.error_type(), "authentication");
    }

    #[test]
    fn test_user_token_not_valid_as_employee_token() {
        let cfg = test_config();
        let token = issue_user_token(&cfg, Uuid::new_v4(), Uuid::new_v4(), "member").unwrap();
        let other = AuthConfig {
            jwt_secret: "rotated".into(),
            ..test_config()
        };
        // Signed with the old user secret: fails the user scheme and must not
        // slip through the employee scheme either.
        assert!(verify_bearer(&token, &other).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let cfg = AuthConfig {
            token_ttl_hours: -1,
            ..test_config()
        };
        let token = issue_user_token(&cfg, Uuid::new_v4(), Uuid::new_v4(), "member").unwrap();
        assert!(verify_bearer(&token, &cfg).is_err());
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not-a-phc-string"));
    }

    #[test]
    fn test_employee_access_scoping() {
        let own = Uuid::new_v4();
        let ctx = AuthContext {
            company_id: Uuid::new_v4(),
            principal: Principal::Employee { employee_id: own },
        };
        assert!(ctx.require_employee_access(own).is_ok());
        assert!(ctx.require_employee_access(Uuid::new_v4()).is_err());
    }
}

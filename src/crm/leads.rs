use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::crm::customers::Customer;
use crate::crm::opportunities::Opportunity;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{customers, leads, opportunities};
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = leads)]
#[diesel(treat_none_as_null = true)]
pub struct Lead {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub source: String,
    pub status: String,
    pub interest: Option<String>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
    pub converted_customer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Forward-only status chain; `lost` is reachable from any open status and
/// `converted` only through the convert operation.
pub fn lead_transition_allowed(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("new", "contacted") | ("contacted", "qualified") | ("new", "lost")
            | ("contacted", "lost")
            | ("qualified", "lost")
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub source: Option<String>,
    pub interest: Option<String>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub interest: Option<String>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub source: Option<String>,
    pub owner_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub lead: Lead,
    pub customer: Customer,
    pub opportunity: Opportunity,
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateLeadRequest>,
) -> Result<Json<ApiResponse<Lead>>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let lead = insert_lead(
        &mut conn,
        ctx.company_id,
        NewLead {
            name: req.name,
            email: req.email,
            phone: req.phone,
            company_name: req.company_name,
            source: req.source.unwrap_or_else(|| "manual".to_string()),
            interest: req.interest,
            owner_id: req.owner_id.or(ctx.user_id()),
            notes: req.notes,
        },
    )?;
    Ok(Json(ApiResponse::ok(lead)))
}

/// Lead fields as gathered from any ingress (manual create or webhook).
pub struct NewLead {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub source: String,
    pub interest: Option<String>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

pub fn insert_lead(
    conn: &mut PgConnection,
    company_id: Uuid,
    new: NewLead,
) -> Result<Lead, ApiError> {
    let now = Utc::now();
    let lead = Lead {
        id: Uuid::new_v4(),
        company_id,
        name: new.name.trim().to_string(),
        email: new.email.map(|e| e.trim().to_lowercase()),
        phone: new.phone,
        company_name: new.company_name,
        source: new.source,
        status: "new".to_string(),
        interest: new.interest,
        owner_id: new.owner_id,
        notes: new.notes,
        converted_customer_id: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(leads::table).values(&lead).execute(conn)?;
    Ok(lead)
}

/// Webhook dedup: an existing open lead with the same sender email is
/// touched instead of duplicated.
pub fn find_open_lead_by_email(
    conn: &mut PgConnection,
    company_id: Uuid,
    email: &str,
) -> Result<Option<Lead>, ApiError> {
    Ok(leads::table
        .filter(leads::company_id.eq(company_id))
        .filter(leads::email.eq(email))
        .filter(leads::status.ne("lost"))
        .filter(leads::status.ne("converted"))
        .order(leads::created_at.desc())
        .first(conn)
        .optional()?)
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Lead>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = leads::table
        .filter(leads::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(status) = query.status {
        q = q.filter(leads::status.eq(status));
    }
    if let Some(source) = query.source {
        q = q.filter(leads::source.eq(source));
    }
    if let Some(owner_id) = query.owner_id {
        q = q.filter(leads::owner_id.eq(owner_id));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            leads::name
                .ilike(pattern.clone())
                .or(leads::email.ilike(pattern.clone()))
                .or(leads::company_name.ilike(pattern)),
        );
    }

    let list: Vec<Lead> = q
        .order(leads::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

fn load_lead(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> Result<Lead, ApiError> {
    leads::table
        .filter(leads::id.eq(id))
        .filter(leads::company_id.eq(company_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("lead".into()))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Lead>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    Ok(Json(ApiResponse::ok(load_lead(&mut conn, ctx.company_id, id)?)))
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLeadRequest>,
) -> Result<Json<ApiResponse<Lead>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut lead = load_lead(&mut conn, ctx.company_id, id)?;

    if let Some(name) = req.name {
        lead.name = name;
    }
    if let Some(email) = req.email {
        lead.email = Some(email.trim().to_lowercase());
    }
    if let Some(phone) = req.phone {
        lead.phone = Some(phone);
    }
    if let Some(company_name) = req.company_name {
        lead.company_name = Some(company_name);
    }
    if let Some(interest) = req.interest {
        lead.interest = Some(interest);
    }
    if let Some(owner_id) = req.owner_id {
        lead.owner_id = Some(owner_id);
    }
    if let Some(notes) = req.notes {
        lead.notes = Some(notes);
    }
    lead.updated_at = Utc::now();

    diesel::update(leads::table.filter(leads::id.eq(id)))
        .set(&lead)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(lead)))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<ApiResponse<Lead>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut lead = load_lead(&mut conn, ctx.company_id, id)?;

    if req.status == "converted" {
        return Err(ApiError::Validation(
            "use the convert operation to convert a lead".into(),
        ));
    }
    if !lead_transition_allowed(&lead.status, &req.status) {
        return Err(ApiError::Conflict(format!(
            "cannot move lead from {} to {}",
            lead.status, req.status
        )));
    }

    lead.status = req.status;
    lead.updated_at = Utc::now();
    diesel::update(leads::table.filter(leads::id.eq(id)))
        .set(&lead)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(lead)))
}

/// Qualified lead becomes a customer plus an opportunity in one step.
pub async fn convert_lead(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ConvertResponse>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut lead = load_lead(&mut conn, ctx.company_id, id)?;

    if lead.status == "converted" {
        return Err(ApiError::Conflict("lead is already converted".into()));
    }
    if lead.status == "lost" {
        return Err(ApiError::Conflict("lost leads cannot be converted".into()));
    }

    let now = Utc::now();
    let customer = Customer {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        name: lead
            .company_name
            .clone()
            .unwrap_or_else(|| lead.name.clone()),
        email: lead.email.clone(),
        phone: lead.phone.clone(),
        industry: None,
        address: None,
        owner_id: lead.owner_id.or(ctx.user_id()),
        status: "active".to_string(),
        notes: lead.notes.clone(),
        created_at: now,
        updated_at: now,
    };

    let opportunity = Opportunity {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        customer_id: Some(customer.id),
        lead_id: Some(lead.id),
        name: format!("{} - initial opportunity", lead.name),
        stage: "prospecting".to_string(),
        amount: bigdecimal::BigDecimal::from(0),
        probability: 10,
        expected_close_date: None,
        owner_id: lead.owner_id.or(ctx.user_id()),
        closed_at: None,
        created_at: now,
        updated_at: now,
    };

    lead.status = "converted".to_string();
    lead.converted_customer_id = Some(customer.id);
    lead.updated_at = now;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(customers::table)
            .values(&customer)
            .execute(conn)?;
        diesel::insert_into(opportunities::table)
            .values(&opportunity)
            .execute(conn)?;
        diesel::update(leads::table.filter(leads::id.eq(lead.id)))
            .set(&lead)
            .execute(conn)?;
        Ok(())
    })?;

    info!(lead_id = %lead.id, customer_id = %customer.id, "lead converted");
    Ok(Json(ApiResponse::ok(ConvertResponse {
        lead,
        customer,
        opportunity,
    })))
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let deleted = diesel::delete(
        leads::table
            .filter(leads::id.eq(id))
            .filter(leads::company_id.eq(ctx.company_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("lead".into()));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub fn configure_leads_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/crm/leads", get(list_leads).post(create_lead))
        .route(
            "/api/crm/leads/:id",
            get(get_lead).put(update_lead).delete(delete_lead),
        )
        .route("/api/crm/leads/:id/status", put(change_status))
        .route("/api/crm/leads/:id/convert", post(convert_lead))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(lead_transition_allowed("new", "contacted"));
        assert!(lead_transition_allowed("contacted", "qualified"));
        assert!(lead_transition_allowed("qualified", "lost"));
    }

    #[test]
    fn test_backward_and_skip_transitions_rejected() {
        assert!(!lead_transition_allowed("qualified", "new"));
        assert!(!lead_transition_allowed("new", "qualified"));
        assert!(!lead_transition_allowed("lost", "contacted"));
        assert!(!lead_transition_allowed("converted", "lost"));
    }
}

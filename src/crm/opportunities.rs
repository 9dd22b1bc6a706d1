use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
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
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::opportunities;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset, round2};

pub const OPEN_STAGES: [&str; 3] = ["prospecting", "proposal", "negotiation"];

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = opportunities)]
#[diesel(treat_none_as_null = true)]
pub struct Opportunity {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub name: String,
    pub stage: String,
    pub amount: BigDecimal,
    pub probability: i32,
    pub expected_close_date: Option<NaiveDate>,
    pub owner_id: Option<Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stage moves walk the open pipeline forward; won/lost close the record.
pub fn stage_transition_allowed(from: &str, to: &str) -> bool {
    let forward = matches!(
        (from, to),
        ("prospecting", "proposal") | ("proposal", "negotiation")
    );
    let close = OPEN_STAGES.contains(&from) && (to == "won" || to == "lost");
    forward || close
}

#[derive(Debug, Deserialize)]
pub struct CreateOpportunityRequest {
    pub name: String,
    pub customer_id: Option<Uuid>,
    pub amount: Option<BigDecimal>,
    pub probability: Option<i32>,
    pub expected_close_date: Option<NaiveDate>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOpportunityRequest {
    pub name: Option<String>,
    pub amount: Option<BigDecimal>,
    pub probability: Option<i32>,
    pub expected_close_date: Option<NaiveDate>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StageRequest {
    pub stage: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub stage: Option<String>,
    pub customer_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_opportunity(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateOpportunityRequest>,
) -> Result<Json<ApiResponse<Opportunity>>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    if let Some(p) = req.probability {
        if !(0..=100).contains(&p) {
            return Err(ApiError::Validation("probability must be 0-100".into()));
        }
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let now = Utc::now();
    let opportunity = Opportunity {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        customer_id: req.customer_id,
        lead_id: None,
        name: req.name.trim().to_string(),
        stage: "prospecting".to_string(),
        amount: round2(req.amount.unwrap_or_else(|| BigDecimal::from(0))),
        probability: req.probability.unwrap_or(10),
        expected_close_date: req.expected_close_date,
        owner_id: req.owner_id.or(ctx.user_id()),
        closed_at: None,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(opportunities::table)
        .values(&opportunity)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(opportunity)))
}

pub async fn list_opportunities(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Opportunity>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = opportunities::table
        .filter(opportunities::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(stage) = query.stage {
        q = q.filter(opportunities::stage.eq(stage));
    }
    if let Some(customer_id) = query.customer_id {
        q = q.filter(opportunities::customer_id.eq(customer_id));
    }
    if let Some(owner_id) = query.owner_id {
        q = q.filter(opportunities::owner_id.eq(owner_id));
    }

    let list: Vec<Opportunity> = q
        .order(opportunities::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

fn load_opportunity(
    conn: &mut PgConnection,
    company_id: Uuid,
    id: Uuid,
) -> Result<Opportunity, ApiError> {
    opportunities::table
        .filter(opportunities::id.eq(id))
        .filter(opportunities::company_id.eq(company_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("opportunity".into()))
}

pub async fn get_opportunity(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Opportunity>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    Ok(Json(ApiResponse::ok(load_opportunity(
        &mut conn,
        ctx.company_id,
        id,
    )?)))
}

pub async fn update_opportunity(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOpportunityRequest>,
) -> Result<Json<ApiResponse<Opportunity>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut opportunity = load_opportunity(&mut conn, ctx.company_id, id)?;

    if opportunity.closed_at.is_some() {
        return Err(ApiError::Conflict("closed opportunities are read-only".into()));
    }
    if let Some(name) = req.name {
        opportunity.name = name;
    }
    if let Some(amount) = req.amount {
        opportunity.amount = round2(amount);
    }
    if let Some(probability) = req.probability {
        if !(0..=100).contains(&probability) {
            return Err(ApiError::Validation("probability must be 0-100".into()));
        }
        opportunity.probability = probability;
    }
    if let Some(date) = req.expected_close_date {
        opportunity.expected_close_date = Some(date);
    }
    if let Some(owner_id) = req.owner_id {
        opportunity.owner_id = Some(owner_id);
    }
    opportunity.updated_at = Utc::now();

    diesel::update(opportunities::table.filter(opportunities::id.eq(id)))
        .set(&opportunity)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(opportunity)))
}

pub async fn change_stage(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<StageRequest>,
) -> Result<Json<ApiResponse<Opportunity>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut opportunity = load_opportunity(&mut conn, ctx.company_id, id)?;

    if !stage_transition_allowed(&opportunity.stage, &req.stage) {
        return Err(ApiError::Conflict(format!(
            "cannot move opportunity from {} to {}",
            opportunity.stage, req.stage
        )));
    }

    let closing = req.stage == "won" || req.stage == "lost";
    opportunity.stage = req.stage;
    if closing {
        opportunity.closed_at = Some(Utc::now());
        opportunity.probability = if opportunity.stage == "won" { 100 } else { 0 };
    }
    opportunity.updated_at = Utc::now();

    diesel::update(opportunities::table.filter(opportunities::id.eq(id)))
        .set(&opportunity)
        .execute(&mut conn)?;
    info!(opportunity_id = %id, stage = %opportunity.stage, "opportunity stage changed");
    Ok(Json(ApiResponse::ok(opportunity)))
}

pub async fn delete_opportunity(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let deleted = diesel::delete(
        opportunities::table
            .filter(opportunities::id.eq(id))
            .filter(opportunities::company_id.eq(ctx.company_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("opportunity".into()));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub fn configure_opportunities_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/crm/opportunities",
            get(list_opportunities).post(create_opportunity),
        )
        .route(
            "/api/crm/opportunities/:id",
            get(get_opportunity)
                .put(update_opportunity)
                .delete(delete_opportunity),
        )
        .route("/api/crm/opportunities/:id/stage", put(change_stage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_walks_forward() {
        assert!(stage_transition_allowed("prospecting", "proposal"));
        assert!(stage_transition_allowed("proposal", "negotiation"));
        assert!(stage_transition_allowed("negotiation", "won"));
        assert!(stage_transition_allowed("prospecting", "lost"));
    }

    #[test]
    fn test_no_reopening_or_skipping() {
        assert!(!stage_transition_allowed("won", "prospecting"));
        assert!(!stage_transition_allowed("lost", "won"));
        assert!(!stage_transition_allowed("prospecting", "negotiation"));
    }
}

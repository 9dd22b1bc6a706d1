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
use crate::notifications::check_entity_type;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::documents;
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset};

/// Metadata row for a file whose bytes live in the tenant bucket.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = documents)]
#[diesel(treat_none_as_null = true)]
pub struct Document {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub name: String,
    pub category: Option<String>,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocumentRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_document(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    if req.size_bytes < 0 {
        return Err(ApiError::Validation("size_bytes must not be negative".into()));
    }
    if let Some(entity_type) = &req.entity_type {
        check_entity_type(entity_type)?;
    }

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let now = Utc::now();
    let document = Document {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        name: req.name.trim().to_string(),
        category: req.category,
        mime_type: req.mime_type,
        size_bytes: req.size_bytes,
        storage_key: req.storage_key,
        entity_type: req.entity_type,
        entity_id: req.entity_id,
        uploaded_by: ctx.user_id(),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(documents::table)
        .values(&document)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Document>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = documents::table
        .filter(documents::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(category) = query.category {
        q = q.filter(documents::category.eq(category));
    }
    if let Some(entity_type) = query.entity_type {
        q = q.filter(documents::entity_type.eq(entity_type));
    }
    if let Some(entity_id) = query.entity_id {
        q = q.filter(documents::entity_id.eq(entity_id));
    }
    if let Some(search) = query.search {
        q = q.filter(documents::name.ilike(format!("%{search}%")));
    }

    let list: Vec<Document> = q
        .order(documents::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let document: Document = documents::table
        .filter(documents::id.eq(id))
        .filter(documents::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("document".into()))?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn update_document(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDocumentRequest>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut document: Document = documents::table
        .filter(documents::id.eq(id))
        .filter(documents::company_id.eq(ctx.company_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("document".into()))?;

    if let Some(name) = req.name {
        document.name = name;
    }
    if let Some(category) = req.category {
        document.category = Some(category);
    }
    if let Some(entity_type) = req.entity_type {
        check_entity_type(&entity_type)?;
        document.entity_type = Some(entity_type);
    }
    if let Some(entity_id) = req.entity_id {
        document.entity_id = Some(entity_id);
    }
    document.updated_at = Utc::now();

    diesel::update(documents::table.filter(documents::id.eq(id)))
        .set(&document)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(document)))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let deleted = diesel::delete(
        documents::table
            .filter(documents::id.eq(id))
            .filter(documents::company_id.eq(ctx.company_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("document".into()));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))))
}

pub fn configure_documents_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/documents", get(list_documents).post(create_document))
        .route(
            "/api/documents/:id",
            get(get_document).put(update_document).delete(delete_document),
        )
}

use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{deliveries, orders};
use crate::shared::state::AppState;
use crate::shared::utils::{page_limit, page_offset};

pub const MAX_RECEIPT_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_RECEIPT_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/webp", "application/pdf"];

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = deliveries)]
#[diesel(treat_none_as_null = true)]
pub struct Delivery {
    pub id: Uuid,
    pub company_id: Uuid,
    pub order_id: Uuid,
    pub scheduled_date: Option<NaiveDate>,
    pub status: String,
    pub receipt_key: Option<String>,
    pub receipt_name: Option<String>,
    pub receipt_size: Option<i64>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Receipt uploads accept images and PDFs up to ten megabytes. The content
/// type reported by the client is checked first, with an extension guess as
/// fallback for clients that send application/octet-stream.
pub fn validate_receipt(
    file_name: &str,
    content_type: Option<&str>,
    size: usize,
) -> Result<String, ApiError> {
    if size == 0 {
        return Err(ApiError::FileUpload("file is empty".into()));
    }
    if size > MAX_RECEIPT_BYTES {
        return Err(ApiError::FileUpload(format!(
            "file is {size} bytes, the limit is {MAX_RECEIPT_BYTES}"
        )));
    }

    let resolved = match content_type {
        Some(ct) if ct != "application/octet-stream" => ct.to_string(),
        _ => mime_guess::from_path(file_name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    };

    if !ALLOWED_RECEIPT_TYPES.contains(&resolved.as_str()) {
        return Err(ApiError::FileUpload(format!(
            "'{resolved}' is not allowed; accepted types are images and PDF"
        )));
    }
    Ok(resolved)
}

#[derive(Debug, Deserialize)]
pub struct CreateDeliveryRequest {
    pub order_id: Uuid,
    pub scheduled_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub order_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_delivery(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateDeliveryRequest>,
) -> Result<Json<ApiResponse<Delivery>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let order = crate::billing::orders::load_order(&mut conn, ctx.company_id, req.order_id)?;
    if order.status == "cancelled" {
        return Err(ApiError::Conflict("cancelled orders are not delivered".into()));
    }

    let now = Utc::now();
    let delivery = Delivery {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        order_id: req.order_id,
        scheduled_date: req.scheduled_date,
        status: "scheduled".to_string(),
        receipt_key: None,
        receipt_name: None,
        receipt_size: None,
        delivered_at: None,
        notes: req.notes,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(deliveries::table)
        .values(&delivery)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(delivery)))
}

pub async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Delivery>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = deliveries::table
        .filter(deliveries::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(order_id) = query.order_id {
        q = q.filter(deliveries::order_id.eq(order_id));
    }
    if let Some(status) = query.status {
        q = q.filter(deliveries::status.eq(status));
    }

    let list: Vec<Delivery> = q
        .order(deliveries::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

fn load_delivery(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> Result<Delivery, ApiError> {
    deliveries::table
        .filter(deliveries::id.eq(id))
        .filter(deliveries::company_id.eq(company_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("delivery".into()))
}

pub async fn get_delivery(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Delivery>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    Ok(Json(ApiResponse::ok(load_delivery(&mut conn, ctx.company_id, id)?)))
}

/// Multipart receipt upload into the tenant bucket under
/// `companies/<company_id>/receipts/`.
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Delivery>>, ApiError> {
    let drive = state
        .drive
        .as_ref()
        .ok_or_else(|| ApiError::ExternalService("file storage is not configured".into()))?;

    {
        let mut conn = state.conn.get().map_err(ApiError::pool)?;
        load_delivery(&mut conn, ctx.company_id, id)?;
    }

    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::FileUpload(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            content_type = field.content_type().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::FileUpload(format!("failed to read upload: {e}")))?;
            data = Some(bytes.to_vec());
        }
    }

    let file_name = file_name.ok_or_else(|| ApiError::FileUpload("missing 'file' field".into()))?;
    let data = data.ok_or_else(|| ApiError::FileUpload("missing 'file' field".into()))?;
    let resolved_type = validate_receipt(&file_name, content_type.as_deref(), data.len())?;

    let key = format!("companies/{}/receipts/{}/{}", ctx.company_id, id, file_name);
    drive
        .put_object()
        .bucket(&state.bucket_name)
        .key(&key)
        .content_type(&resolved_type)
        .body(ByteStream::from(data.clone()))
        .send()
        .await
        .map_err(|e| ApiError::ExternalService(format!("receipt upload failed: {e}")))?;

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut delivery = load_delivery(&mut conn, ctx.company_id, id)?;
    delivery.receipt_key = Some(key);
    delivery.receipt_name = Some(file_name);
    delivery.receipt_size = Some(data.len() as i64);
    delivery.updated_at = Utc::now();
    diesel::update(deliveries::table.filter(deliveries::id.eq(id)))
        .set(&delivery)
        .execute(&mut conn)?;

    info!(delivery_id = %id, size = data.len(), "delivery receipt stored");
    Ok(Json(ApiResponse::ok(delivery)))
}

/// Confirming a delivery closes it and stamps the backing order delivered.
pub async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Delivery>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut delivery = load_delivery(&mut conn, ctx.company_id, id)?;

    if delivery.status == "delivered" {
        return Err(ApiError::Conflict("delivery is already confirmed".into()));
    }

    let now = Utc::now();
    delivery.status = "delivered".to_string();
    delivery.delivered_at = Some(now);
    delivery.updated_at = now;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::update(deliveries::table.filter(deliveries::id.eq(id)))
            .set(&delivery)
            .execute(conn)?;
        diesel::update(
            orders::table
                .filter(orders::id.eq(delivery.order_id))
                .filter(orders::company_id.eq(ctx.company_id))
                .filter(orders::status.eq("confirmed")),
        )
        .set((orders::status.eq("delivered"), orders::updated_at.eq(now)))
        .execute(conn)?;
        Ok(())
    })?;

    info!(delivery_id = %id, "delivery confirmed");
    Ok(Json(ApiResponse::ok(delivery)))
}

pub fn configure_aftersales_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/aftersales/deliveries",
            get(list_deliveries).post(create_delivery),
        )
        .route("/api/aftersales/deliveries/:id", get(get_delivery))
        .route("/api/aftersales/deliveries/:id/receipt", post(upload_receipt))
        .route("/api/aftersales/deliveries/:id/confirm", put(confirm_delivery))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_images_and_pdf() {
        assert_eq!(
            validate_receipt("r.jpg", Some("image/jpeg"), 1024).unwrap(),
            "image/jpeg"
        );
        assert_eq!(
            validate_receipt("r.pdf", Some("application/pdf"), 1024).unwrap(),
            "application/pdf"
        );
        assert_eq!(
            validate_receipt("r.webp", Some("image/webp"), 1024).unwrap(),
            "image/webp"
        );
    }

    #[test]
    fn test_rejects_other_types() {
        let err = validate_receipt("r.exe", Some("application/x-msdownload"), 1024).unwrap_err();
        assert_eq!(err.error_type(), "file_upload");
        assert!(validate_receipt("r.svg", Some("image/svg+xml"), 1024).is_err());
    }

    #[test]
    fn test_octet_stream_falls_back_to_extension() {
        assert_eq!(
            validate_receipt("receipt.png", Some("application/octet-stream"), 1024).unwrap(),
            "image/png"
        );
        assert!(validate_receipt("receipt.zip", Some("application/octet-stream"), 1024).is_err());
    }

    #[test]
    fn test_size_cap() {
        assert!(validate_receipt("r.pdf", Some("application/pdf"), MAX_RECEIPT_BYTES).is_ok());
        let err =
            validate_receipt("r.pdf", Some("application/pdf"), MAX_RECEIPT_BYTES + 1).unwrap_err();
        assert_eq!(err.error_type(), "file_upload");
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(validate_receipt("r.pdf", Some("application/pdf"), 0).is_err());
    }
}

pub mod parser;
pub mod security;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::crm::leads::{self, Lead, NewLead};
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{companies, leads as leads_table, products};
use crate::shared::state::AppState;
use parser::{InboundEmail, Provider};

const SENDGRID_SIGNATURE_HEADER: &str = "x-twilio-email-event-webhook-signature";
const POSTMARK_SIGNATURE_HEADER: &str = "x-postmark-signature";

#[derive(Debug, Deserialize)]
pub struct IngressQuery {
    pub company_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct IngressResult {
    pub lead_id: Uuid,
    pub deduplicated: bool,
}

fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn verify_signature(
    state: &AppState,
    provider: Provider,
    headers: &HeaderMap,
    content_type: Option<&str>,
    raw_body: &str,
) -> Result<(), ApiError> {
    let secrets = &state.config.webhooks;
    match provider {
        Provider::Mailgun => {
            let Some(secret) = secrets.mailgun.as_deref() else {
                return Ok(());
            };
            let (timestamp, token, signature) =
                parser::mailgun_signature_fields(content_type, raw_body).ok_or_else(|| {
                    ApiError::Authentication("mailgun signature fields missing".into())
                })?;
            if !security::verify_mailgun(secret, &timestamp, &token, &signature) {
                return Err(ApiError::Authentication("invalid mailgun signature".into()));
            }
        }
        Provider::SendGrid | Provider::Postmark => {
            let (secret, header) = match provider {
                Provider::SendGrid => (secrets.sendgrid.as_deref(), SENDGRID_SIGNATURE_HEADER),
                _ => (secrets.postmark.as_deref(), POSTMARK_SIGNATURE_HEADER),
            };
            let Some(secret) = secret else {
                return Ok(());
            };
            let signature = headers
                .get(header)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ApiError::Authentication("signature header missing".into()))?;
            if !security::verify_raw_body(secret, raw_body, signature) {
                return Err(ApiError::Authentication("invalid webhook signature".into()));
            }
        }
    }
    Ok(())
}

/// Build the lead fields out of a parsed email: display name from the From
/// header, phone and company scraped from the free text, interests matched
/// against the tenant's product catalog.
pub fn lead_from_email(email: &InboundEmail, product_names: &[String], provider: Provider) -> NewLead {
    let (display_name, address) = parser::parse_from_header(&email.from);
    let text = format!("{}\n{}", email.subject, email.body);
    let interests = parser::extract_interests(&text, product_names);

    NewLead {
        name: display_name.unwrap_or_else(|| address.clone()),
        email: Some(address),
        phone: parser::extract_phone(&text),
        company_name: parser::extract_company(&text),
        source: format!("webhook:{}", provider.slug()),
        interest: if interests.is_empty() {
            None
        } else {
            Some(interests.join(", "))
        },
        owner_id: None,
        notes: Some(format!("{}\n\n{}", email.subject, email.body)),
    }
}

/// Inbound email ingress: one route per provider, rate-limited per client,
/// signature-checked when a secret is configured, deduplicated by sender.
pub async fn inbound_email(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<IngressQuery>,
    headers: HeaderMap,
    raw_body: String,
) -> Result<Json<ApiResponse<IngressResult>>, ApiError> {
    let key = client_key(&headers);
    if !state.webhook_limiter.check(&key).await {
        warn!(client = %key, "webhook ingress rate-limited");
        return Err(ApiError::RateLimit);
    }

    let provider = Provider::from_slug(&provider)?;
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    verify_signature(&state, provider, &headers, content_type, &raw_body)?;

    let email = parser::parse_payload(provider, content_type, &raw_body)?;

    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let known: i64 = companies::table
        .filter(companies::id.eq(query.company_id))
        .filter(companies::is_active.eq(true))
        .count()
        .get_result(&mut conn)?;
    if known == 0 {
        return Err(ApiError::NotFound("company".into()));
    }

    let product_names: Vec<String> = products::table
        .filter(products::company_id.eq(query.company_id))
        .filter(products::status.eq("active"))
        .select(products::name)
        .load(&mut conn)?;

    let new_lead = lead_from_email(&email, &product_names, provider);

    if let Some(address) = new_lead.email.as_deref() {
        if let Some(existing) = leads::find_open_lead_by_email(&mut conn, query.company_id, address)?
        {
            touch_lead(&mut conn, &existing, &new_lead)?;
            info!(lead_id = %existing.id, provider = provider.slug(), "existing lead touched");
            return Ok(Json(ApiResponse::ok(IngressResult {
                lead_id: existing.id,
                deduplicated: true,
            })));
        }
    }

    let lead = leads::insert_lead(&mut conn, query.company_id, new_lead)?;
    info!(lead_id = %lead.id, provider = provider.slug(), "lead created from inbound email");
    Ok(Json(ApiResponse::ok(IngressResult {
        lead_id: lead.id,
        deduplicated: false,
    })))
}

fn touch_lead(conn: &mut PgConnection, existing: &Lead, incoming: &NewLead) -> Result<(), ApiError> {
    let merged_notes = match (&existing.notes, &incoming.notes) {
        (Some(old), Some(new)) => Some(format!("{old}\n---\n{new}")),
        (None, Some(new)) => Some(new.clone()),
        (old, None) => old.clone(),
    };
    diesel::update(leads_table::table.filter(leads_table::id.eq(existing.id)))
        .set((
            leads_table::notes.eq(merged_notes),
            leads_table::interest.eq(incoming.interest.clone().or(existing.interest.clone())),
            leads_table::phone.eq(incoming.phone.clone().or(existing.phone.clone())),
            leads_table::updated_at.eq(chrono::Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

/// Authenticated re-check of the signature configuration, used by settings
/// pages to show whether verification is active per provider.
pub async fn signature_status(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    ctx.require_admin()?;
    let secrets = &state.config.webhooks;
    Ok(Json(ApiResponse::ok(serde_json::json!({
        "sendgrid": secrets.sendgrid.is_some(),
        "mailgun": secrets.mailgun.is_some(),
        "postmark": secrets.postmark.is_some(),
    }))))
}

pub fn configure_webhooks_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/webhooks/email/:provider", post(inbound_email))
        .route(
            "/api/webhooks/status",
            axum::routing::get(signature_status),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_from_email_full_extraction() {
        let email = InboundEmail {
            from: "Jane Doe <jane@acme.com>".into(),
            subject: "Widget Pro pricing".into(),
            body: "Hi, I'm the buyer at Initech Solutions. Call +1 (555) 123-4567.".into(),
        };
        let catalog = vec!["Widget Pro".to_string(), "Gizmo".to_string()];
        let lead = lead_from_email(&email, &catalog, Provider::SendGrid);

        assert_eq!(lead.name, "Jane Doe");
        assert_eq!(lead.email.as_deref(), Some("jane@acme.com"));
        assert_eq!(lead.company_name.as_deref(), Some("Initech Solutions"));
        assert_eq!(lead.phone.as_deref(), Some("+1 (555) 123-4567"));
        assert_eq!(lead.interest.as_deref(), Some("Widget Pro"));
        assert_eq!(lead.source, "webhook:sendgrid");
    }

    #[test]
    fn test_lead_from_bare_address_uses_email_as_name() {
        let email = InboundEmail {
            from: "bob@corp.io".into(),
            subject: "hello".into(),
            body: "no details".into(),
        };
        let lead = lead_from_email(&email, &[], Provider::Postmark);
        assert_eq!(lead.name, "bob@corp.io");
        assert_eq!(lead.interest, None);
        assert_eq!(lead.source, "webhook:postmark");
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(client_key(&headers), "203.0.113.9");

        let empty = HeaderMap::new();
        assert_eq!(client_key(&empty), "unknown");
    }
}

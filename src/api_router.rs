//! Combines every module router into the unified REST API surface.

use axum::{routing::get, Json, Router};
use std::sync::Arc;

use crate::shared::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .merge(crate::auth::configure_auth_routes())
        .merge(crate::companies::configure_companies_routes())
        .merge(crate::hr::employees::configure_employees_routes())
        .merge(crate::hr::attendance::configure_attendance_routes())
        .merge(crate::hr::leave::configure_leave_routes())
        .merge(crate::hr::payroll::configure_payroll_routes())
        .merge(crate::hr::reviews::configure_reviews_routes())
        .merge(crate::hr::reports::configure_hr_reports_routes())
        .merge(crate::crm::customers::configure_customers_routes())
        .merge(crate::crm::leads::configure_leads_routes())
        .merge(crate::crm::opportunities::configure_opportunities_routes())
        .merge(crate::crm::reports::configure_crm_reports_routes())
        .merge(crate::billing::quotes::configure_quotes_routes())
        .merge(crate::billing::orders::configure_orders_routes())
        .merge(crate::billing::invoices::configure_invoices_routes())
        .merge(crate::inventory::products::configure_products_routes())
        .merge(crate::inventory::promotions::configure_promotions_routes())
        .merge(crate::inventory::credit_limits::configure_credit_limits_routes())
        .merge(crate::aftersales::configure_aftersales_routes())
        .merge(crate::notifications::configure_notifications_routes())
        .merge(crate::documents::configure_documents_routes())
        .merge(crate::approvals::configure_approvals_routes())
        .merge(crate::webhooks::configure_webhooks_routes())
}

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::dsl::sum;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::billing::orders::Order;
use crate::shared::error::ApiError;
use crate::shared::response::ApiResponse;
use crate::shared::schema::{customers, invoices, payments};
use crate::shared::state::AppState;
use crate::shared::utils::{month_bounds, page_limit, page_offset, round2};

const DEFAULT_DUE_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = invoices)]
#[diesel(treat_none_as_null = true)]
pub struct Invoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Option<Uuid>,
    pub invoice_number: String,
    pub status: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total: BigDecimal,
    pub amount_paid: BigDecimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = payments)]
pub struct Payment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: BigDecimal,
    pub method: String,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub fn invoice_transition_allowed(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("draft", "sent")
            | ("draft", "cancelled")
            | ("sent", "paid")
            | ("sent", "overdue")
            | ("sent", "cancelled")
            | ("overdue", "paid")
            | ("overdue", "cancelled")
    )
}

impl Invoice {
    pub fn remaining_balance(&self) -> BigDecimal {
        round2(&self.total - &self.amount_paid)
    }

    pub fn accepts_payment(&self) -> bool {
        self.status == "sent" || self.status == "overdue"
    }
}

/// A payment must be positive and must not exceed what is still owed.
pub fn validate_payment(invoice: &Invoice, amount: &BigDecimal) -> Result<(), ApiError> {
    if !invoice.accepts_payment() {
        return Err(ApiError::Conflict(format!(
            "invoice is {}, payments apply to sent or overdue invoices",
            invoice.status
        )));
    }
    if amount <= &BigDecimal::from(0) {
        return Err(ApiError::Validation("payment amount must be positive".into()));
    }
    if amount > &invoice.remaining_balance() {
        return Err(ApiError::Conflict(format!(
            "payment of {amount} exceeds remaining balance {}",
            invoice.remaining_balance()
        )));
    }
    Ok(())
}

fn generate_invoice_number(conn: &mut PgConnection, company_id: Uuid) -> Result<String, ApiError> {
    let count: i64 = invoices::table
        .filter(invoices::company_id.eq(company_id))
        .count()
        .get_result(conn)?;
    Ok(format!("INV-{:06}", count + 1))
}

pub fn insert_invoice_for_order(conn: &mut PgConnection, order: &Order) -> Result<Invoice, ApiError> {
    let existing: i64 = invoices::table
        .filter(invoices::company_id.eq(order.company_id))
        .filter(invoices::order_id.eq(order.id))
        .count()
        .get_result(conn)?;
    if existing > 0 {
        return Err(ApiError::Conflict("order is already invoiced".into()));
    }

    let now = Utc::now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        company_id: order.company_id,
        customer_id: order.customer_id,
        order_id: Some(order.id),
        invoice_number: generate_invoice_number(conn, order.company_id)?,
        status: "draft".to_string(),
        issue_date: None,
        due_date: None,
        total: order.total.clone(),
        amount_paid: round2(BigDecimal::from(0)),
        notes: order.notes.clone(),
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(invoices::table)
        .values(&invoice)
        .execute(conn)?;
    Ok(invoice)
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    pub total: BigDecimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: BigDecimal,
    pub method: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FinancialQuery {
    /// Month in `YYYY-MM` form.
    pub month: String,
}

#[derive(Debug, Serialize)]
pub struct FinancialReport {
    pub month: String,
    pub invoiced_total: BigDecimal,
    pub collected_total: BigDecimal,
    pub outstanding_total: BigDecimal,
    pub overdue_total: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct SweepResult {
    pub marked_overdue: usize,
}

pub async fn create_invoice(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    if req.total <= BigDecimal::from(0) {
        return Err(ApiError::Validation("total must be positive".into()));
    }
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let found: i64 = customers::table
        .filter(customers::id.eq(req.customer_id))
        .filter(customers::company_id.eq(ctx.company_id))
        .count()
        .get_result(&mut conn)?;
    if found == 0 {
        return Err(ApiError::NotFound("customer".into()));
    }

    let now = Utc::now();
    let invoice = Invoice {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        customer_id: req.customer_id,
        order_id: None,
        invoice_number: generate_invoice_number(&mut conn, ctx.company_id)?,
        status: "draft".to_string(),
        issue_date: None,
        due_date: None,
        total: round2(req.total),
        amount_paid: round2(BigDecimal::from(0)),
        notes: req.notes,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(invoices::table)
        .values(&invoice)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(invoice)))
}

pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Invoice>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let mut q = invoices::table
        .filter(invoices::company_id.eq(ctx.company_id))
        .into_boxed();
    if let Some(customer_id) = query.customer_id {
        q = q.filter(invoices::customer_id.eq(customer_id));
    }
    if let Some(status) = query.status {
        q = q.filter(invoices::status.eq(status));
    }

    let list: Vec<Invoice> = q
        .order(invoices::created_at.desc())
        .limit(page_limit(query.limit))
        .offset(page_offset(query.offset))
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

fn load_invoice(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> Result<Invoice, ApiError> {
    invoices::table
        .filter(invoices::id.eq(id))
        .filter(invoices::company_id.eq(company_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("invoice".into()))
}

pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    Ok(Json(ApiResponse::ok(load_invoice(&mut conn, ctx.company_id, id)?)))
}

/// Issuing stamps the issue date and a thirty-day due date.
pub async fn send_invoice(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut invoice = load_invoice(&mut conn, ctx.company_id, id)?;

    if !invoice_transition_allowed(&invoice.status, "sent") {
        return Err(ApiError::Conflict(format!(
            "cannot send a {} invoice",
            invoice.status
        )));
    }

    let today = Utc::now().date_naive();
    invoice.status = "sent".to_string();
    invoice.issue_date = Some(today);
    invoice.due_date = Some(today + Duration::days(DEFAULT_DUE_DAYS));
    invoice.updated_at = Utc::now();

    diesel::update(invoices::table.filter(invoices::id.eq(id)))
        .set(&invoice)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(invoice)))
}

pub async fn cancel_invoice(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut invoice = load_invoice(&mut conn, ctx.company_id, id)?;

    if !invoice_transition_allowed(&invoice.status, "cancelled") {
        return Err(ApiError::Conflict(format!(
            "cannot cancel a {} invoice",
            invoice.status
        )));
    }

    invoice.status = "cancelled".to_string();
    invoice.updated_at = Utc::now();
    diesel::update(invoices::table.filter(invoices::id.eq(id)))
        .set(&invoice)
        .execute(&mut conn)?;
    Ok(Json(ApiResponse::ok(invoice)))
}

pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<ApiResponse<Invoice>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let mut invoice = load_invoice(&mut conn, ctx.company_id, id)?;

    let amount = round2(req.amount);
    validate_payment(&invoice, &amount)?;

    let now = Utc::now();
    let payment = Payment {
        id: Uuid::new_v4(),
        company_id: ctx.company_id,
        invoice_id: id,
        amount: amount.clone(),
        method: req.method.unwrap_or_else(|| "bank_transfer".to_string()),
        reference: req.reference,
        paid_at: now,
        created_at: now,
    };

    invoice.amount_paid = round2(&invoice.amount_paid + &amount);
    if invoice.remaining_balance() <= BigDecimal::from(0) {
        invoice.status = "paid".to_string();
    }
    invoice.updated_at = now;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(payments::table)
            .values(&payment)
            .execute(conn)?;
        diesel::update(invoices::table.filter(invoices::id.eq(id)))
            .set(&invoice)
            .execute(conn)?;
        Ok(())
    })?;

    info!(invoice_id = %id, %amount, "payment recorded");
    Ok(Json(ApiResponse::ok(invoice)))
}

pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Payment>>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    load_invoice(&mut conn, ctx.company_id, id)?;

    let list: Vec<Payment> = payments::table
        .filter(payments::invoice_id.eq(id))
        .filter(payments::company_id.eq(ctx.company_id))
        .order(payments::paid_at.asc())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(list)))
}

/// Bulk status action: every sent invoice past its due date becomes overdue.
pub async fn overdue_sweep(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<ApiResponse<SweepResult>>, ApiError> {
    let mut conn = state.conn.get().map_err(ApiError::pool)?;
    let today = Utc::now().date_naive();

    let marked = diesel::update(
        invoices::table
            .filter(invoices::company_id.eq(ctx.company_id))
            .filter(invoices::status.eq("sent"))
            .filter(invoices::due_date.lt(today)),
    )
    .set((
        invoices::status.eq("overdue"),
        invoices::updated_at.eq(Utc::now()),
    ))
    .execute(&mut conn)?;

    info!(marked, "overdue sweep completed");
    Ok(Json(ApiResponse::ok(SweepResult {
        marked_overdue: marked,
    })))
}

/// Financial tracking per month: what was invoiced, what came in, what is
/// still open, and how much of the open amount is overdue.
pub async fn financial_report(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<FinancialQuery>,
) -> Result<Json<ApiResponse<FinancialReport>>, ApiError> {
    ctx.user_id()
        .ok_or_else(|| ApiError::Authorization("reports are manager-only".into()))?;
    let (from, to) = month_bounds(&query.month)?;
    let mut conn = state.conn.get().map_err(ApiError::pool)?;

    let invoiced: Option<BigDecimal> = invoices::table
        .filter(invoices::company_id.eq(ctx.company_id))
        .filter(invoices::issue_date.ge(from))
        .filter(invoices::issue_date.le(to))
        .filter(invoices::status.ne("cancelled"))
        .select(sum(invoices::total))
        .first(&mut conn)?;

    let from_ts: DateTime<Utc> = DateTime::from_naive_utc_and_offset(
        from.and_hms_opt(0, 0, 0).unwrap_or_default(),
        Utc,
    );
    let to_ts: DateTime<Utc> = DateTime::from_naive_utc_and_offset(
        to.and_hms_opt(23, 59, 59).unwrap_or_default(),
        Utc,
    );
    let collected: Option<BigDecimal> = payments::table
        .filter(payments::company_id.eq(ctx.company_id))
        .filter(payments::paid_at.ge(from_ts))
        .filter(payments::paid_at.le(to_ts))
        .select(sum(payments::amount))
        .first(&mut conn)?;

    let open: Vec<(BigDecimal, BigDecimal, String)> = invoices::table
        .filter(invoices::company_id.eq(ctx.company_id))
        .filter(invoices::status.eq_any(["sent", "overdue"]))
        .select((invoices::total, invoices::amount_paid, invoices::status))
        .load(&mut conn)?;

    let outstanding: BigDecimal = open.iter().map(|row| &row.0 - &row.1).sum();
    let overdue: BigDecimal = open
        .iter()
        .filter(|row| row.2 == "overdue")
        .map(|row| &row.0 - &row.1)
        .sum();

    Ok(Json(ApiResponse::ok(FinancialReport {
        month: query.month,
        invoiced_total: invoiced.unwrap_or_else(|| BigDecimal::from(0)),
        collected_total: collected.unwrap_or_else(|| BigDecimal::from(0)),
        outstanding_total: round2(outstanding),
        overdue_total: round2(overdue),
    })))
}

pub fn configure_invoices_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/billing/invoices",
            get(list_invoices).post(create_invoice),
        )
        .route("/api/billing/invoices/overdue-sweep", put(overdue_sweep))
        .route("/api/billing/invoices/:id", get(get_invoice))
        .route("/api/billing/invoices/:id/send", put(send_invoice))
        .route("/api/billing/invoices/:id/cancel", put(cancel_invoice))
        .route(
            "/api/billing/invoices/:id/payments",
            get(list_payments).post(record_payment),
        )
        .route("/api/billing/reports/financial", get(financial_report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn bd(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn invoice(status: &str, total: &str, paid: &str) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            order_id: None,
            invoice_number: "INV-000001".into(),
            status: status.to_string(),
            issue_date: None,
            due_date: None,
            total: bd(total),
            amount_paid: bd(paid),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(invoice_transition_allowed("draft", "sent"));
        assert!(invoice_transition_allowed("sent", "paid"));
        assert!(invoice_transition_allowed("sent", "overdue"));
        assert!(invoice_transition_allowed("overdue", "paid"));
        assert!(!invoice_transition_allowed("paid", "sent"));
        assert!(!invoice_transition_allowed("draft", "paid"));
        assert!(!invoice_transition_allowed("cancelled", "sent"));
    }

    #[test]
    fn test_payment_within_balance_accepted() {
        let inv = invoice("sent", "1000.00", "250.00");
        assert!(validate_payment(&inv, &bd("750.00")).is_ok());
        assert!(validate_payment(&inv, &bd("100.00")).is_ok());
    }

    #[test]
    fn test_payment_exceeding_balance_conflicts() {
        let inv = invoice("sent", "1000.00", "250.00");
        let err = validate_payment(&inv, &bd("750.01")).unwrap_err();
        assert_eq!(err.error_type(), "conflict");
    }

    #[test]
    fn test_payment_on_draft_rejected() {
        let inv = invoice("draft", "1000.00", "0.00");
        assert_eq!(
            validate_payment(&inv, &bd("10.00")).unwrap_err().error_type(),
            "conflict"
        );
    }

    #[test]
    fn test_non_positive_payment_rejected() {
        let inv = invoice("sent", "1000.00", "0.00");
        assert_eq!(
            validate_payment(&inv, &bd("0")).unwrap_err().error_type(),
            "validation"
        );
        assert_eq!(
            validate_payment(&inv, &bd("-5")).unwrap_err().error_type(),
            "validation"
        );
    }

    #[test]
    fn test_remaining_balance() {
        let inv = invoice("sent", "1000.00", "999.99");
        assert_eq!(inv.remaining_balance(), bd("0.01"));
    }
}

pub mod aftersales;
pub mod api_router;
pub mod approvals;
pub mod auth;
pub mod billing;
pub mod companies;
pub mod config;
pub mod crm;
pub mod documents;
pub mod hr;
pub mod inventory;
pub mod notifications;
pub mod shared;
pub mod webhooks;

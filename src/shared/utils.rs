use anyhow::{Context, Result};
use bigdecimal::{rounding::RoundingMode, BigDecimal};
use chrono::{Datelike, NaiveDate};
use diesel::{
    r2d2::{ConnectionManager, Pool},
    Connection, PgConnection,
};

use crate::shared::error::ApiError;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .build(manager)
        .context("Failed to create database pool")
}

pub fn establish_pg_connection(database_url: &str) -> Result<PgConnection> {
    PgConnection::establish(database_url).context("Failed to connect to database")
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get().context("Failed to get connection for migrations")?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {e}"))?;
    Ok(())
}

/// Clamp a client-supplied page size into a sane window.
pub fn page_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(50).clamp(1, 500)
}

pub fn page_offset(requested: Option<i64>) -> i64 {
    requested.unwrap_or(0).max(0)
}

/// Round a monetary or hours amount to two decimals, half-up.
pub fn round2(value: BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

/// Convert a minute count into decimal hours with two-decimal rounding.
pub fn minutes_to_hours(minutes: i64) -> BigDecimal {
    round2(BigDecimal::from(minutes) / BigDecimal::from(60))
}

/// Inclusive date bounds for a `YYYY-MM` month string.
pub fn month_bounds(month: &str) -> Result<(NaiveDate, NaiveDate), ApiError> {
    let parsed = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
        .map_err(|_| ApiError::Validation("month must be YYYY-MM".into()))?;
    let next = if parsed.month() == 12 {
        NaiveDate::from_ymd_opt(parsed.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(parsed.year(), parsed.month() + 1, 1)
    }
    .ok_or_else(|| ApiError::Internal("month arithmetic".into()))?;
    Ok((parsed, next.pred_opt().unwrap_or(parsed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_page_limit_clamps() {
        assert_eq!(page_limit(None), 50);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(10_000)), 500);
        assert_eq!(page_limit(Some(25)), 25);
    }

    #[test]
    fn test_minutes_to_hours() {
        assert_eq!(minutes_to_hours(480), BigDecimal::from_str("8.00").unwrap());
        assert_eq!(minutes_to_hours(510), BigDecimal::from_str("8.50").unwrap());
        assert_eq!(minutes_to_hours(0), BigDecimal::from_str("0.00").unwrap());
        assert_eq!(minutes_to_hours(50), BigDecimal::from_str("0.83").unwrap());
    }

    #[test]
    fn test_month_bounds() {
        let (from, to) = month_bounds("2025-06").unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        let (from, to) = month_bounds("2025-12").unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(month_bounds("junk").is_err());
    }

    #[test]
    fn test_round2_half_up() {
        assert_eq!(
            round2(BigDecimal::from_str("1.005").unwrap()),
            BigDecimal::from_str("1.01").unwrap()
        );
        assert_eq!(
            round2(BigDecimal::from_str("2").unwrap()),
            BigDecimal::from_str("2.00").unwrap()
        );
    }
}

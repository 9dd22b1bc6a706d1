use std::env;

#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub drive: DriveConfig,
    pub auth: AuthConfig,
    pub webhooks: WebhookSecrets,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u32,
    pub database: String,
}

#[derive(Clone)]
pub struct DriveConfig {
    pub server: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub employee_jwt_secret: String,
    pub token_ttl_hours: i64,
}

/// Per-provider shared secrets for inbound webhook signature checks.
/// A missing secret disables verification for that provider.
#[derive(Clone, Default)]
pub struct WebhookSecrets {
    pub sendgrid: Option<String>,
    pub mailgun: Option<String>,
    pub postmark: Option<String>,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            employee_jwt_secret: env::var("EMPLOYEE_JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("EMPLOYEE_JWT_SECRET must be set"))?,
            token_ttl_hours: var_or("TOKEN_TTL_HOURS", "24").parse().unwrap_or(24),
        };

        Ok(Self {
            server: ServerConfig {
                host: var_or("SERVER_HOST", "0.0.0.0"),
                port: var_or("SERVER_PORT", "8080").parse().unwrap_or(8080),
            },
            database: DatabaseConfig {
                username: var_or("DB_USER", "bizserver"),
                password: var_or("DB_PASSWORD", ""),
                server: var_or("DB_HOST", "localhost"),
                port: var_or("DB_PORT", "5432").parse().unwrap_or(5432),
                database: var_or("DB_NAME", "bizserver"),
            },
            drive: DriveConfig {
                server: env::var("DRIVE_SERVER").ok(),
                access_key: var_or("DRIVE_ACCESS_KEY", ""),
                secret_key: var_or("DRIVE_SECRET_KEY", ""),
                bucket: var_or("DRIVE_BUCKET", "bizserver"),
            },
            auth,
            webhooks: WebhookSecrets {
                sendgrid: env::var("WEBHOOK_SECRET_SENDGRID").ok(),
                mailgun: env::var("WEBHOOK_SECRET_MAILGUN").ok(),
                postmark: env::var("WEBHOOK_SECRET_POSTMARK").ok(),
            },
        })
    }

    pub fn database_url(&self) -> String {
        if let Ok(url) = env::var("DATABASE_URL") {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.server,
            self.database.port,
            self.database.database
        )
    }
}

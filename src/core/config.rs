//! Environment-driven application configuration, loaded once at startup.

#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub jwt_secret: String,
    pub uploads_dir: String,
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
    pub port: u16,
    pub database: String,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_str("SERVER_HOST", "0.0.0.0"),
                port: env_u16("SERVER_PORT", 3000),
            },
            database: DatabaseConfig {
                username: env_str("DB_USERNAME", "helpdesk"),
                password: env_str("DB_PASSWORD", ""),
                server: env_str("DB_SERVER", "localhost"),
                port: env_u16("DB_PORT", 5432),
                database: env_str("DB_DATABASE", "helpdesk"),
            },
            smtp: SmtpConfig {
                host: env_str("SMTP_HOST", "localhost"),
                user: std::env::var("SMTP_USER").ok(),
                pass: std::env::var("SMTP_PASS").ok(),
                from: env_str("SMTP_FROM", "noreply@localhost"),
            },
            jwt_secret: env_str("JWT_SECRET", "change-me"),
            uploads_dir: env_str("UPLOADS_DIR", "./uploads"),
        }
    }

    pub fn database_url(&self) -> String {
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

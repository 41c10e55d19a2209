//! Environment configuration. Every required variable is checked before
//! it is used, and a missing one refuses startup with a clear error.

use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "production" => AppEnv::Production,
            _ => AppEnv::Development,
        }
    }

    /// The session cookie carries the Secure attribute only on HTTPS
    /// deployments, which is what production means here.
    pub fn secure_cookies(self) -> bool {
        self == AppEnv::Production
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub jwt_secret: String,
    pub client_url: String,
    pub resend_api_key: Option<String>,
    pub email_from: Option<String>,
    pub email_from_name: String,
    pub storage_upload_url: Option<String>,
    pub port: u16,
    pub app_env: AppEnv,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(v) if !v.is_empty() => v,
            _ => bail!("JWT_SECRET is not set"),
        };

        let email_from = optional_var("EMAIL_FROM");
        let resend_api_key = optional_var("RESEND_API_KEY");
        if email_from.is_some() && resend_api_key.is_none() {
            bail!("RESEND_API_KEY is required when EMAIL_FROM is configured");
        }

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()?;

        Ok(Self {
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "talkalot.db".into()),
            jwt_secret,
            client_url: std::env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            resend_api_key,
            email_from,
            email_from_name: std::env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Talkalot".into()),
            storage_upload_url: optional_var("STORAGE_UPLOAD_URL"),
            port,
            app_env: AppEnv::parse(
                &std::env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            ),
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

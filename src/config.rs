use anyhow::Context;
use std::env;

use crate::models::settings::StorageSettings;

/// Process configuration. Built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Secret mixed into local anti-link and upload tokens.
    pub app_key: String,
    pub storage: StorageSettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .map(|raw| raw.parse::<u16>())
            .transpose()
            .context("PORT must be a valid port number")?
            .unwrap_or(3000);
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let app_key = env::var("APP_KEY").context("APP_KEY must be set")?;
        let storage_path =
            env::var("STORAGE_CONFIG").unwrap_or_else(|_| "storage.toml".to_string());
        let storage = StorageSettings::load(&storage_path)
            .with_context(|| format!("failed to load storage config from {storage_path}"))?;

        Ok(Self {
            host,
            port,
            database_url,
            jwt_secret,
            app_key,
            storage,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

use std::path::PathBuf;

use anyhow::Context;

/// Server settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Create a demo box on startup.
    pub seed: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("BOXROOM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = std::env::var("BOXROOM_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("BOXROOM_PORT must be a port number")?;
        let db_path = std::env::var("BOXROOM_DB_PATH").unwrap_or_else(|_| "boxroom.db".into());
        let seed = std::env::var("BOXROOM_SEED")
            .map(|v| is_enabled(&v))
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            db_path: PathBuf::from(db_path),
            seed,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn is_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

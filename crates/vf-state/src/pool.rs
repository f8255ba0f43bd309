//! Connection configuration and pool construction.

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::{StateError, StateResult};

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl StateConfig {
    /// Read configuration from the environment. `DATABASE_URL` is required;
    /// `STATE_MAX_CONNECTIONS` defaults to 10.
    pub fn from_env() -> StateResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| StateError::config("DATABASE_URL is not set"))?;
        let max_connections = std::env::var("STATE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            database_url,
            max_connections,
        })
    }

    pub async fn connect(&self) -> StateResult<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await?;
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_requires_database_url() {
        // SAFETY: tests run single-threaded for this crate's env var checks.
        unsafe {
            std::env::remove_var("DATABASE_URL");
        }
        assert!(StateConfig::from_env().is_err());
    }
}

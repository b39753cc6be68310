//! Connection pool management.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use crate::config::PostgresConfig;
use crate::error::Result;

/// Creates a new PostgreSQL connection pool from the given configuration.
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    info!(
        url = %mask_password(&config.url),
        pool_size = config.pool_size,
        connect_timeout_ms = config.connect_timeout_ms,
        "Creating PostgreSQL connection pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms));

    if let Some(idle_timeout) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;

    debug!("PostgreSQL connection pool created");

    Ok(pool)
}

/// Masks the password in a database URL for logging.
fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://worker:hunter2@db/claimflow"),
            "postgres://worker:****@db/claimflow"
        );
        assert_eq!(
            mask_password("postgres://db/claimflow"),
            "postgres://db/claimflow"
        );
        assert_eq!(
            mask_password("postgres://worker@db/claimflow"),
            "postgres://worker@db/claimflow"
        );
    }
}

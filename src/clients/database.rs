use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, warn};

use crate::{clients::PreferenceLookup, models::preference::Frequency};

const SELECT_FREQUENCY: &str = r#"
    SELECT frequency
    FROM notification_preferences
    WHERE config_ref = $1 AND lower(address) = lower($2)
    LIMIT 1
"#;

pub struct DatabaseClient {
    client: Client,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl PreferenceLookup for DatabaseClient {
    async fn get(&self, config_ref: &str, address: &str) -> Result<Option<Frequency>> {
        let row = self
            .client
            .query_opt(SELECT_FREQUENCY, &[&config_ref, &address])
            .await
            .map_err(|e| anyhow!("Preference query failed: {}", e))?;

        let Some(row) = row else {
            debug!(config_ref, address, "No preference configured");
            return Ok(None);
        };

        let raw: String = row.try_get("frequency")?;

        match raw.parse::<Frequency>() {
            Ok(frequency) => Ok(Some(frequency)),
            Err(e) => {
                warn!(config_ref, address, error = %e, "Ignoring unrecognized preference");
                Ok(None)
            }
        }
    }
}

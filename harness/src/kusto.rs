use crate::settings::ConnectionSecrets;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Url};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

const MGMT_ENDPOINT: &str = "v1/rest/mgmt";
const PRODUCTS_TABLE_PLACEHOLDER: &str = "%PRODUCTS_TBL%";
const ITEMS_TABLE_PLACEHOLDER: &str = "%ITEMS_TBL%";

/// Management-command client for the analytics store. Only setup and teardown
/// talk to the store; the load phase goes through the deployed app's HTTP
/// surface.
#[derive(Debug)]
pub struct StoreClient {
    client: Client,
    mgmt_url: Url,
    database: String,
}

impl StoreClient {
    /// Validates the cluster endpoint and builds the authenticated client.
    /// A failure here is fatal: nothing downstream can proceed without a
    /// working store connection.
    pub fn connect(secrets: &ConnectionSecrets) -> Result<Self> {
        let cluster = Url::parse(secrets.cluster.trim_end_matches('/'))
            .with_context(|| format!("Invalid cluster endpoint {}", secrets.cluster))?;
        let mgmt_url = cluster
            .join(MGMT_ENDPOINT)
            .context("Failed to derive management endpoint from cluster URL")?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth_header = format!("Bearer {}", secrets.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_header).context("Invalid access token value")?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to construct analytics store client")?;

        Ok(Self {
            client,
            mgmt_url,
            database: secrets.database.clone(),
        })
    }

    async fn execute_mgmt(&self, command: &str) -> Result<()> {
        self.client
            .post(self.mgmt_url.clone())
            .json(&json!({ "db": self.database, "csl": command }))
            .send()
            .await
            .context("Management request failed")?
            .error_for_status()
            .context("Store returned an error for management command")?;
        Ok(())
    }

    /// Runs a management script line by line: blank lines are skipped, table
    /// placeholders are substituted, and each command executes sequentially.
    /// A single command failure is logged and the sequence continues, since
    /// later commands do not depend on earlier ones.
    pub async fn run_script(
        &self,
        script_path: &Path,
        products_table: &str,
        items_table: &str,
    ) -> Result<()> {
        let script = std::fs::read_to_string(script_path)
            .with_context(|| format!("Failed to read script {}", script_path.display()))?;

        for line in script.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let command = line
                .replace(PRODUCTS_TABLE_PLACEHOLDER, products_table)
                .replace(ITEMS_TABLE_PLACEHOLDER, items_table);
            info!("Executing management command: {}", command);
            if let Err(e) = self.execute_mgmt(&command).await {
                error!("Failed to execute management command: {}: {:#}", command, e);
            }
        }
        Ok(())
    }
}

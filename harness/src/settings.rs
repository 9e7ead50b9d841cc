use crate::registry::LanguageTarget;
use crate::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const CLUSTER_VAR: &str = "CLUSTER";
const DATABASE_VAR: &str = "DATABASE";
const ACCESS_TOKEN_VAR: &str = "ACCESS_TOKEN";
const PRODUCTS_TABLE_VAR: &str = "PRODUCTS_TABLE_NAME";
const ITEMS_TABLE_VAR: &str = "ITEMS_TABLE_NAME";

/// Analytics-store connection bundle supplied through the environment.
#[derive(Debug, Clone)]
pub struct ConnectionSecrets {
    pub cluster: String,
    pub database: String,
    pub access_token: String,
    pub products_table: String,
    pub items_table: String,
}

impl ConnectionSecrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            cluster: require(CLUSTER_VAR)?,
            database: require(DATABASE_VAR)?,
            access_token: require(ACCESS_TOKEN_VAR)?,
            products_table: require(PRODUCTS_TABLE_VAR)?,
            items_table: require(ITEMS_TABLE_VAR)?,
        })
    }

    /// Connection string in the format the binding extension parses inside
    /// the function host.
    pub fn connection_string(&self) -> String {
        format!(
            "Data Source={};Database={};Fed=True;UserToken={}",
            self.cluster, self.database, self.access_token
        )
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingCredential {
            name: name.to_string(),
        })
}

/// The runtime settings document deployed next to the sample project. The
/// container's copy is the only surviving instance during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(rename = "IsEncrypted")]
    pub is_encrypted: bool,
    #[serde(rename = "Values")]
    pub values: BTreeMap<String, String>,
}

impl RuntimeSettings {
    pub fn build(target: &LanguageTarget, secrets: &ConnectionSecrets) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            "AzureWebJobsStorage".to_string(),
            "UseDevelopmentStorage=true".to_string(),
        );
        values.insert(
            "FUNCTIONS_WORKER_RUNTIME".to_string(),
            target.language.as_str().to_string(),
        );
        values.insert(
            "KustoConnectionString".to_string(),
            secrets.connection_string(),
        );
        values.insert("DATABASE".to_string(), secrets.database.clone());
        values.insert(
            "PRODUCTS_TABLE_NAME".to_string(),
            secrets.products_table.clone(),
        );

        Self {
            is_encrypted: false,
            values,
        }
    }

    /// Writes the full document, creating the file if absent and replacing
    /// any prior content.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)
            .context("Failed to serialize runtime settings")?;
        fs::write(path, body)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        info!("Created settings file at {}", path.display());
        Ok(())
    }
}

/// Best-effort removal of the host-side settings file once the container has
/// its copy. A failure only affects host hygiene, never correctness.
pub fn dispose(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!("Deleted settings file from the host"),
        Err(e) => warn!(
            "Failed to delete settings file {} from the host: {}",
            path.display(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use serial_test::serial;

    fn secrets() -> ConnectionSecrets {
        ConnectionSecrets {
            cluster: "https://sdktests.eastus.kusto.windows.net".to_string(),
            database: "e2e".to_string(),
            access_token: "token-123".to_string(),
            products_table: "Products".to_string(),
            items_table: "Items".to_string(),
        }
    }

    #[test]
    #[serial]
    fn from_env_reports_the_missing_variable() {
        for var in [
            CLUSTER_VAR,
            DATABASE_VAR,
            ACCESS_TOKEN_VAR,
            PRODUCTS_TABLE_VAR,
            ITEMS_TABLE_VAR,
        ] {
            std::env::remove_var(var);
        }
        std::env::set_var(CLUSTER_VAR, "https://cluster.example.net");

        let err = ConnectionSecrets::from_env().unwrap_err();
        assert_eq!(err.to_string(), "Environment variable DATABASE must be set");

        std::env::remove_var(CLUSTER_VAR);
    }

    #[test]
    fn connection_string_matches_the_expected_wire_format() {
        assert_eq!(
            secrets().connection_string(),
            "Data Source=https://sdktests.eastus.kusto.windows.net;Database=e2e;Fed=True;UserToken=token-123"
        );
    }

    #[test]
    fn settings_document_serializes_with_expected_shape() {
        let target = registry::resolve("node").unwrap();
        let settings = RuntimeSettings::build(&target, &secrets());
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&settings).unwrap()).unwrap();

        assert_eq!(value["IsEncrypted"], serde_json::json!(false));
        assert_eq!(value["Values"]["FUNCTIONS_WORKER_RUNTIME"], "node");
        assert_eq!(
            value["Values"]["AzureWebJobsStorage"],
            "UseDevelopmentStorage=true"
        );
        assert_eq!(value["Values"]["DATABASE"], "e2e");
        assert_eq!(value["Values"]["PRODUCTS_TABLE_NAME"], "Products");
        assert!(value["Values"]["KustoConnectionString"]
            .as_str()
            .unwrap()
            .contains("Fed=True"));
    }

    #[test]
    fn persist_overwrites_prior_content_and_dispose_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.settings.json");
        fs::write(&path, "{\"stale\": true}").unwrap();

        let target = registry::resolve("python").unwrap();
        let settings = RuntimeSettings::build(&target, &secrets());
        settings.persist(&path).unwrap();

        let written: RuntimeSettings =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(!written.is_encrypted);
        assert_eq!(
            written.values.get("FUNCTIONS_WORKER_RUNTIME").unwrap(),
            "python"
        );

        dispose(&path);
        assert!(!path.exists());
        // Second dispose only warns.
        dispose(&path);
    }
}

use crate::dataset::SyntheticDataset;
use crate::deploy;
use crate::diagnostics;
use crate::kusto::StoreClient;
use crate::loadgen::{self, InjectionProfile, RunReport, Scenario};
use crate::registry::LanguageTarget;
use crate::settings::{self, ConnectionSecrets, RuntimeSettings};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use container_link::{CommandExecutor, ComposeEnvironment};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Service name of the application container in the compose definitions.
pub const BASE_IMAGE_SERVICE: &str = "baseimage";
/// Service name of the optional messaging broker.
pub const BROKER_SERVICE: &str = "rabbitmq";

const HOLD_DURATION: Duration = Duration::from_secs(600);

/// Immutable run-scoped configuration, built once in main and passed into
/// every component.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub language: String,
    pub port_override: Option<u16>,
    pub hold_container: bool,
    pub run_trigger: bool,
    pub profile: InjectionProfile,
    pub success_threshold: f64,
    pub samples_root: PathBuf,
    pub log_dir: PathBuf,
}

impl RunConfig {
    /// The trigger toggle selects the broker-bearing compose variant; runs
    /// without the trigger path use the slimmer definition.
    pub fn compose_file(&self) -> PathBuf {
        if self.run_trigger {
            self.samples_root.join("docker/docker-compose.yml")
        } else {
            self.samples_root.join("docker/docker-compose-no-rmq.yml")
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.samples_root.join("docker/local.settings.json")
    }

    pub fn queue_script(&self) -> PathBuf {
        self.samples_root.join("docker/create-queue.sh")
    }

    pub fn setup_script(&self) -> PathBuf {
        self.samples_root.join("set-up/KQL-Setup.kql")
    }

    pub fn teardown_script(&self) -> PathBuf {
        self.samples_root.join("set-up/KQL-Teardown.kql")
    }
}

/// Executes one full run: store setup, environment bring-up, deployment,
/// load generation, diagnostics, teardown. The environment is stopped
/// exactly once no matter where the run fails after bring-up.
pub async fn execute(
    config: &RunConfig,
    target: &LanguageTarget,
    secrets: &ConnectionSecrets,
    executor: Arc<dyn CommandExecutor>,
) -> Result<RunReport> {
    let store = StoreClient::connect(secrets)?;
    store
        .run_script(
            &config.setup_script(),
            &secrets.products_table,
            &secrets.items_table,
        )
        .await?;

    let mut environment = ComposeEnvironment::start(&config.compose_file(), executor)
        .context("Failed to start the containerized environment")?;

    let outcome = drive(config, target, secrets, &environment).await;

    if let Some(handle) = environment.resolve_service(BASE_IMAGE_SERVICE) {
        diagnostics::collect_logs(&handle, target, &config.log_dir);
    }
    if config.hold_container {
        info!(
            "Debug hold requested, keeping the environment up for {:?}",
            HOLD_DURATION
        );
        sleep(HOLD_DURATION).await;
    }
    environment.stop();

    info!(
        "Cleaning up tables {}, {}",
        secrets.products_table, secrets.items_table
    );
    if let Err(e) = store
        .run_script(
            &config.teardown_script(),
            &secrets.products_table,
            &secrets.items_table,
        )
        .await
    {
        warn!("Store teardown script failed: {:#}", e);
    }
    info!("Simulation run finished!");

    outcome
}

/// Everything between environment bring-up and teardown. Strictly sequential:
/// each step depends on the previous one's side effect.
async fn drive(
    config: &RunConfig,
    target: &LanguageTarget,
    secrets: &ConnectionSecrets,
    environment: &ComposeEnvironment,
) -> Result<RunReport> {
    if let Some(broker) = environment.resolve_service(BROKER_SERVICE) {
        deploy::create_broker_queue(&broker, &config.queue_script())?;
    }

    let port = config.port_override.unwrap_or(target.port);
    let settings_path = config.settings_path();
    RuntimeSettings::build(target, secrets).persist(&settings_path)?;

    let handle = environment
        .resolve_service(BASE_IMAGE_SERVICE)
        .ok_or_else(|| anyhow!("Service {} missing from the environment", BASE_IMAGE_SERVICE))?;
    deploy::deploy_sample(&handle, target, &config.samples_root)?;
    deploy::deploy_settings(&handle, &settings_path, target)?;
    deploy::initialize(&handle, target)?;
    deploy::launch(&handle, target, port)?;
    settings::dispose(&settings_path);

    let dataset = SyntheticDataset::generate(target.language, Utc::now().timestamp_millis());
    let scenario = Scenario {
        name: "BasicInputAndOutputBindings".to_string(),
        base_url: format!("http://localhost:{}/api", port),
        steps: loadgen::binding_chain(&dataset, target.language)?,
        trigger_enabled: config.run_trigger,
    };
    loadgen::run(scenario, &config.profile, config.success_threshold).await
}

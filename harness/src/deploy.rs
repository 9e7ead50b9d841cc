use crate::registry::LanguageTarget;
use anyhow::{Context, Result};
use container_link::ContainerHandle;
use std::path::Path;
use tracing::{debug, info};

const INIT_SCRIPT: &str = "/src/init-functions.sh";
const START_SCRIPT: &str = "/src/start-functions.sh";
const QUEUE_SCRIPT_TARGET: &str = "/tmp/create-queue.sh";

/// Copies the language sample tree into the container. A missing host path is
/// fatal: no function app can start without its source.
pub fn deploy_sample(
    handle: &ContainerHandle,
    target: &LanguageTarget,
    samples_root: &Path,
) -> Result<()> {
    let host_path = samples_root.join(target.sample_dir_name());
    if !host_path.exists() {
        anyhow::bail!(
            "Sample directory {} does not exist on the host",
            host_path.display()
        );
    }
    handle
        .copy_in(&host_path, &target.container_sample_dir())
        .with_context(|| format!("Failed to copy sample for language {}", target.language))?;
    info!("Copied folder {} to container", host_path.display());
    Ok(())
}

/// Copies the generated settings file to the location the function host
/// expects inside the container.
pub fn deploy_settings(
    handle: &ContainerHandle,
    settings_path: &Path,
    target: &LanguageTarget,
) -> Result<()> {
    let container_path = target.container_settings_path();
    handle
        .copy_in(settings_path, &container_path)
        .context("Failed to copy settings file into the container")?;
    info!(
        "Copied settings file to container target directory {}",
        container_path
    );
    Ok(())
}

/// Runs the sample's init script inside the container. A non-zero exit is
/// logged, not fatal: a broken runtime surfaces later as HTTP connection
/// failures, which points more precisely at where the host failed to come up.
pub fn initialize(handle: &ContainerHandle, target: &LanguageTarget) -> Result<()> {
    let result = handle
        .exec(&["bash", INIT_SCRIPT])
        .context("Failed to exec init script in the container")?;
    debug!(
        "Init function for language binding {} returned {}. StdErr {} and StdOut {}",
        target.language, result.status, result.stderr, result.stdout
    );
    Ok(())
}

/// Starts the function host for the selected language on the exposed port.
/// Same non-fatal exit-code semantics as `initialize`.
pub fn launch(handle: &ContainerHandle, target: &LanguageTarget, port: u16) -> Result<()> {
    let port_arg = port.to_string();
    let result = handle
        .exec(&[
            "bash",
            START_SCRIPT,
            "-l",
            target.language.as_str(),
            "-p",
            &port_arg,
        ])
        .context("Failed to exec start script in the container")?;
    info!(
        "Starting function on port {} for language binding {} returned {}. StdErr {} and StdOut {}",
        port, target.language, result.status, result.stderr, result.stdout
    );
    Ok(())
}

/// Declares the trigger queue on the messaging broker. Only invoked when the
/// broker service is part of the environment.
pub fn create_broker_queue(handle: &ContainerHandle, queue_script: &Path) -> Result<()> {
    handle
        .copy_in(queue_script, QUEUE_SCRIPT_TARGET)
        .context("Failed to copy queue script into the broker container")?;
    let result = handle
        .exec(&["bash", QUEUE_SCRIPT_TARGET])
        .context("Failed to exec queue script in the broker container")?;
    info!(
        "Create queue returned {}. StdErr {} and StdOut {}",
        result.status, result.stderr, result.stdout
    );
    Ok(())
}

use crate::registry::LanguageTarget;
use chrono::Utc;
use container_link::ContainerHandle;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Copies the runtime log file out of the container to a timestamped host
/// path. Diagnostic only: a failure is a warning and never masks the run's
/// pass/fail outcome.
pub fn collect_logs(
    handle: &ContainerHandle,
    target: &LanguageTarget,
    dest_dir: &Path,
) -> Option<PathBuf> {
    let dest = log_destination(target, dest_dir, Utc::now().timestamp_millis());
    info!("Copying run logs to {}", dest.display());
    match handle.copy_out(&target.container_log_path(), &dest) {
        Ok(()) => Some(dest),
        Err(e) => {
            warn!("Could not copy run logs, this should not affect the run: {}", e);
            None
        }
    }
}

fn log_destination(target: &LanguageTarget, dest_dir: &Path, timestamp_millis: i64) -> PathBuf {
    dest_dir.join(format!(
        "func-logs-{}-{}.log",
        target.language, timestamp_millis
    ))
}

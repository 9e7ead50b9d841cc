use container_link::ScriptedCommandExecutor;
use functions_harness::loadgen::InjectionProfile;
use functions_harness::registry;
use functions_harness::run::{self, RunConfig};
use functions_harness::settings::ConnectionSecrets;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn secrets() -> ConnectionSecrets {
    ConnectionSecrets {
        cluster: "https://cluster.example.net".to_string(),
        database: "e2e".to_string(),
        access_token: "token-123".to_string(),
        products_table: "Products".to_string(),
        items_table: "Items".to_string(),
    }
}

fn config(samples_root: &Path) -> RunConfig {
    RunConfig {
        language: "node".to_string(),
        port_override: None,
        hold_container: false,
        run_trigger: false,
        profile: InjectionProfile::Open {
            warm_up: Duration::ZERO,
            users: 1,
            ramp: Duration::ZERO,
        },
        success_threshold: 100.0,
        samples_root: samples_root.to_path_buf(),
        log_dir: samples_root.to_path_buf(),
    }
}

/// Lays down the store scripts (blank, so no management commands fire) and
/// the docker directory the settings file is materialized into. The sample
/// tree itself is deliberately absent.
fn scaffold_samples_root(samples_root: &Path) {
    fs::create_dir_all(samples_root.join("docker")).unwrap();
    fs::create_dir_all(samples_root.join("set-up")).unwrap();
    fs::write(samples_root.join("set-up/KQL-Setup.kql"), "\n\n").unwrap();
    fs::write(samples_root.join("set-up/KQL-Teardown.kql"), "\n").unwrap();
}

#[tokio::test]
async fn environment_stops_exactly_once_when_a_stage_fails_after_start() {
    let dir = tempfile::tempdir().unwrap();
    scaffold_samples_root(dir.path());

    let executor = Arc::new(ScriptedCommandExecutor::success("abc123\n"));
    let target = registry::resolve("node").unwrap();

    // The sample directory is missing, so deployment fails after the
    // environment has started.
    let outcome = run::execute(&config(dir.path()), &target, &secrets(), executor.clone()).await;
    assert!(outcome.is_err());
    assert!(outcome.unwrap_err().to_string().contains("does not exist"));

    let invocations = executor.invocations();
    let ups = invocations.iter().filter(|inv| inv.contains("up")).count();
    let downs = invocations.iter().filter(|inv| inv.contains("down")).count();
    assert_eq!(ups, 1);
    assert_eq!(downs, 1);

    // Teardown must come after bring-up, at the very end of the run.
    let up_index = invocations.iter().position(|inv| inv.contains("up")).unwrap();
    let down_index = invocations.iter().position(|inv| inv.contains("down")).unwrap();
    assert!(down_index > up_index);
    assert_eq!(down_index, invocations.len() - 1);
}

#[tokio::test]
async fn settings_file_is_materialized_and_removed_from_the_host() {
    let dir = tempfile::tempdir().unwrap();
    scaffold_samples_root(dir.path());
    fs::create_dir_all(dir.path().join("samples-node")).unwrap();

    let executor = Arc::new(ScriptedCommandExecutor::success("abc123\n"));
    let target = registry::resolve("node").unwrap();
    let config = config(dir.path());

    // The run proceeds past deployment into the load phase, which fails
    // against the unreachable port; that is a reported failure, not an abort.
    let report = run::execute(&config, &target, &secrets(), executor.clone()).await.unwrap();
    assert!(!report.passed());

    // The host-side copy is disposed once the container has its own.
    assert!(!config.settings_path().exists());

    // The settings file and the sample tree were both copied in.
    let copies: Vec<_> = executor
        .invocations()
        .into_iter()
        .filter(|inv| inv.contains("cp"))
        .collect();
    assert!(copies
        .iter()
        .any(|inv| inv.contains("abc123:/src/samples-node/local.settings.json")));
    assert!(copies.iter().any(|inv| inv.contains("abc123:/src/samples-node/")));
}

#[tokio::test]
async fn broker_queue_step_is_skipped_when_the_service_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    scaffold_samples_root(dir.path());

    // `ps -q` resolves the base image but not the broker.
    let executor = Arc::new(ScriptedCommandExecutor::with_responder(|_, args| {
        let stdout = if args.contains(&"ps") {
            if args.contains(&"rabbitmq") {
                String::new()
            } else {
                "abc123\n".to_string()
            }
        } else {
            String::new()
        };
        container_link::CommandOutput {
            status: 0,
            stdout,
            stderr: String::new(),
        }
    }));
    let target = registry::resolve("node").unwrap();

    let outcome = run::execute(&config(dir.path()), &target, &secrets(), executor.clone()).await;
    // Fails at the missing sample tree, well past the broker step.
    assert!(outcome.is_err());

    // No copy targeted the broker's queue script.
    assert!(!executor
        .invocations()
        .iter()
        .any(|inv| inv.contains("abc123:/tmp/create-queue.sh")));
}

#[tokio::test]
async fn launch_failure_inside_the_container_does_not_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    scaffold_samples_root(dir.path());
    fs::create_dir_all(dir.path().join("samples-node")).unwrap();

    // Every exec inside the container fails; the run still reaches the load
    // phase and reports (rather than aborts) the unhealthy endpoint.
    let executor = Arc::new(ScriptedCommandExecutor::with_responder(|_, args| {
        if args.contains(&"exec") {
            container_link::CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: "func host did not start".to_string(),
            }
        } else {
            container_link::CommandOutput {
                status: 0,
                stdout: "abc123\n".to_string(),
                stderr: String::new(),
            }
        }
    }));
    let target = registry::resolve("node").unwrap();

    let report = run::execute(&config(dir.path()), &target, &secrets(), executor.clone()).await.unwrap();
    assert!(!report.passed());

    let downs = executor
        .invocations()
        .iter()
        .filter(|inv| inv.contains("down"))
        .count();
    assert_eq!(downs, 1);
}

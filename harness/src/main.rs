use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use container_link::SystemCommandExecutor;
use functions_harness::loadgen::InjectionProfile;
use functions_harness::run::RunConfig;
use functions_harness::settings::ConnectionSecrets;
use functions_harness::{registry, run, CONFIG_REJECT_EXIT_CODE};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "functions-harness", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a language sample into a containerized environment and drive
    /// its endpoints with synthetic load
    Run {
        /// Target language runtime
        #[arg(long, env = "LANGUAGE", default_value = "node")]
        language: String,
        /// Override the exposed host port from the registry
        #[arg(long, env = "PORT")]
        port: Option<u16>,
        /// Keep the environment up after the run for manual inspection
        #[arg(long, env = "DEBUG_HOLD")]
        debug_hold: bool,
        /// Exercise the message-trigger ingestion path
        #[arg(long, env = "RUN_TRIGGER")]
        run_trigger: bool,
        /// Injection profile for the load phase
        #[arg(long, value_enum, default_value = "open")]
        profile: ProfileKind,
        /// Virtual users injected by the open profile
        #[arg(long, default_value_t = 50)]
        users: u32,
        /// Ramp duration in seconds for the open profile
        #[arg(long, default_value_t = 40)]
        ramp_secs: u64,
        /// Warm-up delay in seconds before the open profile injects users
        #[arg(long, default_value_t = 60)]
        warmup_secs: u64,
        /// Required percentage of successful requests
        #[arg(long, default_value_t = 100.0)]
        success_threshold: f64,
        /// Root of the sample projects, compose files and store scripts
        #[arg(long, default_value = "samples")]
        samples_root: PathBuf,
        /// Host directory receiving the collected container logs
        #[arg(long, default_value = ".")]
        log_dir: PathBuf,
    },
    /// Print version and exit
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProfileKind {
    Open,
    Closed,
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Run {
            language,
            port,
            debug_hold,
            run_trigger,
            profile,
            users,
            ramp_secs,
            warmup_secs,
            success_threshold,
            samples_root,
            log_dir,
        } => {
            let target = match registry::resolve(&language) {
                Ok(target) => target,
                Err(e) => {
                    warn!("{}", e);
                    std::process::exit(CONFIG_REJECT_EXIT_CODE);
                }
            };
            let secrets = match ConnectionSecrets::from_env() {
                Ok(secrets) => secrets,
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(CONFIG_REJECT_EXIT_CODE);
                }
            };

            let profile = match profile {
                ProfileKind::Open => InjectionProfile::Open {
                    warm_up: Duration::from_secs(warmup_secs),
                    users,
                    ramp: Duration::from_secs(ramp_secs),
                },
                ProfileKind::Closed => InjectionProfile::Closed {
                    starting_users: 10,
                    increment: 5,
                    levels: 5,
                    level_duration: Duration::from_secs(10),
                    ramp: Duration::from_secs(10),
                },
            };

            let config = RunConfig {
                language,
                port_override: port,
                hold_container: debug_hold,
                run_trigger,
                profile,
                success_threshold,
                samples_root,
                log_dir,
            };

            let executor = Arc::new(SystemCommandExecutor);
            match run::execute(&config, &target, &secrets, executor).await {
                Ok(report) if report.passed() => {
                    info!(
                        "Run passed: {:.1}% successful requests",
                        report.success_percent()
                    );
                }
                Ok(report) => {
                    error!(
                        "Run failed: {:.1}% successful requests, threshold {:.1}%",
                        report.success_percent(),
                        report.threshold_percent
                    );
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Run aborted: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

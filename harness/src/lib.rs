use thiserror::Error;

pub mod dataset;
pub mod deploy;
pub mod diagnostics;
pub mod kusto;
pub mod loadgen;
pub mod registry;
pub mod run;
pub mod settings;

/// Configuration failures that abort the run before anything is provisioned.
/// No later stage can succeed after one of these, so they are never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Language {language} is not in the list of accepted languages for test. Accepted languages - {accepted}")]
    UnsupportedLanguage { language: String, accepted: String },

    #[error("Environment variable {name} must be set")]
    MissingCredential { name: String },
}

/// Exit status for configuration rejects, distinguished from the generic
/// failure status so CI can tell "never started" from "started and failed".
pub const CONFIG_REJECT_EXIT_CODE: i32 = 137;

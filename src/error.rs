//! Error types for the harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to spawn demo app: {0}")]
    Spawn(String),

    #[error("demo app exited during startup, stderr:\n{stderr}")]
    LaunchFailure { stderr: String },

    #[error("demo app not ready after {attempts} poll attempt(s), stderr:\n{stderr}")]
    ReadinessTimeout { attempts: u32, stderr: String },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("browser step failed: {step} - {reason}")]
    Browser { step: String, reason: String },

    #[error("entity oracle error: {0}")]
    Oracle(String),

    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("invalid readiness pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

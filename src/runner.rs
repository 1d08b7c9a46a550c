//! Scenario runner - brings the app up, drives scenarios, tears it down

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserConfig, BrowserSession};
use crate::error::{HarnessError, HarnessResult};
use crate::scenario::Scenario;
use crate::supervisor::{AppHandle, AppSource, LaunchSpec, ReadinessPolicy, ShutdownPolicy};

/// Result of one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Aggregate over a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Where the app under test comes from.
    pub source: AppSource,

    /// Startup polling policy for a managed app.
    pub readiness: ReadinessPolicy,

    /// Teardown policy for a managed app.
    pub shutdown: ShutdownPolicy,

    /// Browser configuration shared by all scenarios.
    pub browser: BrowserConfig,

    /// Directory of YAML scenarios.
    pub scenarios_dir: PathBuf,

    /// Output directory for results.
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            source: AppSource::Managed(LaunchSpec::streamlit("ner_demo.py")),
            readiness: ReadinessPolicy::default(),
            shutdown: ShutdownPolicy::default(),
            browser: BrowserConfig::default(),
            scenarios_dir: PathBuf::from("scenarios"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Orchestrates the supervisor and the browser for a suite of scenarios.
pub struct Runner {
    config: RunnerConfig,
    app: Option<AppHandle>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config, app: None }
    }

    /// Bring the app up. Already-running apps are left alone.
    pub fn start_app(&mut self) -> HarnessResult<()> {
        if self.app.is_some() {
            return Ok(());
        }

        let app = AppHandle::acquire(self.config.source.clone(), &self.config.readiness)?;
        self.app = Some(app);
        Ok(())
    }

    /// Tear the app down. Safe to call repeatedly; teardown trouble is
    /// logged, never raised.
    pub fn stop_app(&mut self) {
        if let Some(mut app) = self.app.take() {
            match app.shutdown(&self.config.shutdown) {
                Ok(outcome) => debug!("app shutdown: {:?}", outcome),
                Err(e) => warn!("app shutdown error: {}", e),
            }
        }
    }

    /// Base URL of the running app.
    pub fn base_url(&self) -> Option<String> {
        self.app.as_ref().map(AppHandle::base_url)
    }

    /// Run every scenario in the configured directory.
    pub async fn run_all(&mut self) -> HarnessResult<SuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        self.run_scenarios(&scenarios).await
    }

    /// Run a specific scenario by name.
    pub async fn run_named(&mut self, name: &str) -> HarnessResult<ScenarioResult> {
        let scenario = Scenario::load_all(&self.config.scenarios_dir)?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| HarnessError::Scenario(format!("scenario not found: {}", name)))?;
        self.run_scenario(&scenario).await
    }

    /// Run scenarios carrying `tag`.
    pub async fn run_tagged(&mut self, tag: &str) -> HarnessResult<SuiteResult> {
        let scenarios: Vec<Scenario> = Scenario::load_all(&self.config.scenarios_dir)?
            .into_iter()
            .filter(|s| s.has_tag(tag))
            .collect();
        self.run_scenarios(&scenarios).await
    }

    /// Run an explicit scenario list, aggregating into a suite result.
    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> HarnessResult<SuiteResult> {
        let start = Instant::now();

        self.start_app()?;

        info!("running {} scenario(s)...", scenarios.len());

        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        for scenario in scenarios {
            match self.run_scenario(scenario).await {
                Ok(result) => {
                    if result.success {
                        passed += 1;
                        info!("✓ {} ({} ms)", result.name, result.duration_ms);
                    } else {
                        failed += 1;
                        error!(
                            "✗ {} - {}",
                            result.name,
                            result.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    results.push(result);
                }
                Err(e) => {
                    failed += 1;
                    error!("✗ {} - {}", scenario.name, e);
                    results.push(ScenarioResult {
                        name: scenario.name.clone(),
                        success: false,
                        duration_ms: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Run a single scenario against the running app.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> HarnessResult<ScenarioResult> {
        self.start_app()?;
        let base_url = self.base_url().expect("app started above");

        let start = Instant::now();
        debug!("running scenario: {}", scenario.name);

        let mut browser_config = self.config.browser.clone();
        browser_config.viewport_width = scenario.viewport.width;
        browser_config.viewport_height = scenario.viewport.height;

        let session = BrowserSession::new(base_url, browser_config)?;
        let outcome = session.run(&scenario.steps).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(match outcome {
            Ok(()) => ScenarioResult {
                name: scenario.name.clone(),
                success: true,
                duration_ms,
                error: None,
            },
            Err(e) => ScenarioResult {
                name: scenario.name.clone(),
                success: false,
                duration_ms,
                error: Some(e.to_string()),
            },
        })
    }

    /// Write the suite result as pretty JSON.
    pub fn write_results(&self, suite: &SuiteResult) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("results.json");
        std::fs::write(&path, serde_json::to_string_pretty(suite)?)?;

        info!("results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop_app();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_results_round_trip_as_json() {
        let suite = SuiteResult {
            total: 2,
            passed: 1,
            failed: 1,
            duration_ms: 1234,
            results: vec![
                ScenarioResult {
                    name: "smoke".to_string(),
                    success: true,
                    duration_ms: 400,
                    error: None,
                },
                ScenarioResult {
                    name: "out-of-the-box".to_string(),
                    success: false,
                    duration_ms: 834,
                    error: Some("browser step failed: fill:textarea - timeout".to_string()),
                },
            ],
        };

        let json = serde_json::to_string_pretty(&suite).expect("serialize");
        let back: SuiteResult = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back.total, 2);
        assert_eq!(back.results[1].name, "out-of-the-box");
        assert!(back.results[1].error.is_some());
    }

    #[test]
    fn external_runner_reports_the_known_port() {
        let mut runner = Runner::new(RunnerConfig {
            source: AppSource::External(8989),
            ..RunnerConfig::default()
        });

        runner.start_app().expect("external acquire cannot fail");
        assert_eq!(runner.base_url().as_deref(), Some("http://localhost:8989"));

        runner.stop_app();
        assert!(runner.base_url().is_none());
    }
}

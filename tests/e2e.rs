//! E2E entry point for the NER demo
//!
//! Launches the demo app (or connects to a pre-provisioned one), runs
//! the YAML scenarios, then drives the out-of-the-box flow with entity
//! assertions computed from the spaCy oracle.
//!
//! Run with: cargo test --test e2e -- --help

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use regex::Regex;
use tracing_subscriber::EnvFilter;

use ner_demo_e2e::browser::{submit_chord, Browser, BrowserConfig, Step};
use ner_demo_e2e::runner::{Runner, RunnerConfig, SuiteResult};
use ner_demo_e2e::scenario::{Scenario, Viewport};
use ner_demo_e2e::supervisor::{AppSource, LaunchSpec, ReadinessPolicy, ShutdownPolicy};
use ner_demo_e2e::{EntityOracle, HarnessError, HarnessResult};

/// Sentence the flow analyzes; the oracle computes its entities.
const PROBE_TEXT: &str = "David Robert Jones was born on 8 January 1947 in Brixton, London.";

#[derive(Parser, Debug)]
#[command(name = "ner-demo-e2e")]
#[command(about = "E2E harness for the NER visualization demo")]
struct Args {
    /// Streamlit entry script for the demo app
    #[arg(long, default_value = "ner_demo.py")]
    app_script: PathBuf,

    /// Working directory to launch the app from
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// Fixed port for a managed app (0 = pick a free port)
    #[arg(long, default_value = "0")]
    port: u16,

    /// Port of an externally provisioned app (e.g. a CI service
    /// container); disables subprocess management entirely
    #[arg(long, env = "E2E_EXTERNAL_PORT")]
    external_port: Option<u16>,

    /// spaCy model used both by the app and as the oracle
    #[arg(long, default_value = "en_core_web_sm")]
    model: String,

    /// Directory of YAML scenarios
    #[arg(long, default_value = "scenarios")]
    scenarios: PathBuf,

    /// Run only scenarios carrying this tag
    #[arg(long)]
    tag: Option<String>,

    /// Run only a specific YAML scenario by name
    #[arg(long)]
    name: Option<String>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Readiness poll attempts before giving up
    #[arg(long, default_value = "5")]
    ready_retries: u32,

    /// Seconds between readiness polls
    #[arg(long, default_value = "1")]
    ready_interval_secs: u64,

    /// Override the readiness sentinel pattern
    #[arg(long)]
    ready_pattern: Option<String>,

    /// Output directory for results and screenshots
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    match rt.block_on(run(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn run(args: Args) -> HarnessResult<bool> {
    // Resolve the app source once, here at the suite boundary. The
    // supervisor itself never reads the environment.
    let source = match args.external_port {
        Some(port) => AppSource::External(port),
        None => {
            let mut spec = LaunchSpec::streamlit(&args.app_script);
            spec.workdir = args.app_dir.clone();
            if args.port != 0 {
                spec.port = Some(args.port);
            }
            AppSource::Managed(spec)
        }
    };

    let mut readiness = ReadinessPolicy {
        poll_interval: Duration::from_secs(args.ready_interval_secs),
        max_retries: args.ready_retries,
        ..ReadinessPolicy::default()
    };
    if let Some(pattern) = &args.ready_pattern {
        readiness.ready_pattern = Regex::new(pattern)?;
    }

    let browser = BrowserConfig {
        browser: match args.browser.as_str() {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        },
        screenshot_dir: args.output.join("screenshots"),
        ..BrowserConfig::default()
    };

    let config = RunnerConfig {
        source,
        readiness,
        shutdown: ShutdownPolicy::default(),
        browser,
        scenarios_dir: args.scenarios.clone(),
        output_dir: args.output.clone(),
    };

    let mut runner = Runner::new(config);
    runner.start_app()?;

    let suite = if let Some(name) = &args.name {
        let result = runner.run_named(name).await?;
        SuiteResult {
            total: 1,
            passed: if result.success { 1 } else { 0 },
            failed: if result.success { 0 } else { 1 },
            duration_ms: result.duration_ms,
            results: vec![result],
        }
    } else {
        let mut scenarios = Scenario::load_all(&args.scenarios)?;
        if let Some(tag) = &args.tag {
            scenarios.retain(|s| s.has_tag(tag));
        }

        // The out-of-the-box flow needs the oracle, so only assemble it
        // when the tag filter keeps it.
        if args.tag.as_deref().map_or(true, |tag| tag == "ner") {
            scenarios.push(out_of_the_box_scenario(&args.model)?);
        }

        runner.run_scenarios(&scenarios).await?
    };

    runner.write_results(&suite)?;
    runner.stop_app();

    Ok(suite.failed == 0)
}

/// The flow from the demo's front page: pick the model, analyze the
/// probe sentence, check that every predicted entity is rendered, and
/// open the label filter that toggles annotations.
///
/// Assembled here instead of in YAML because the entity assertions
/// depend on oracle output computed at run time.
fn out_of_the_box_scenario(model: &str) -> HarnessResult<Scenario> {
    let oracle = EntityOracle::new(model);
    oracle.check_available()?;

    let entities = oracle.entities(PROBE_TEXT)?;
    if entities.is_empty() {
        return Err(HarnessError::Oracle(format!(
            "model {} produced no entities for the probe sentence",
            model
        )));
    }

    let textarea = ".stTextArea:has-text('Text to analyze') >> textarea";

    let mut steps = vec![
        Step::Navigate {
            path: "/".to_string(),
            wait_for_selector: Some(".stApp".to_string()),
        },
        // The model is already the default; selecting it from the
        // dropdown confirms the widget works end to end. The first
        // selector is as odd as the widget markup demands.
        Step::Click {
            selector: format!("text={}open >> div", model),
            timeout_ms: None,
        },
        Step::Click {
            selector: format!(r#"li[role="option"]:has-text("{}")"#, model),
            timeout_ms: None,
        },
        Step::Fill {
            selector: textarea.to_string(),
            value: PROBE_TEXT.to_string(),
        },
        Step::Press {
            selector: Some(textarea.to_string()),
            key: submit_chord().to_string(),
        },
    ];

    for entity in &entities {
        steps.push(Step::AssertVisible {
            selector: format!("div.entities >> text={}", entity.rendered()),
            timeout_ms: 10_000,
        });
    }

    // Annotations can be toggled: expand the label accordion and check
    // that the first label's toggle is offered.
    steps.push(Step::Click {
        selector: "text=Select entity labels".to_string(),
        timeout_ms: None,
    });
    steps.push(Step::AssertVisible {
        selector: format!(r#"label:has-text("{}")"#, entities[0].label),
        timeout_ms: 5_000,
    });
    steps.push(Step::Screenshot {
        name: "out-of-the-box".to_string(),
        full_page: true,
    });

    Ok(Scenario {
        name: "out-of-the-box".to_string(),
        description: "Default model renders entities for the probe sentence".to_string(),
        tags: vec!["ner".to_string()],
        viewport: Viewport::default(),
        steps,
    })
}

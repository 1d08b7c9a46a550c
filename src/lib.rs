//! E2E harness for the NER visualization demo
//!
//! This crate launches the demo app as a subprocess, waits for its
//! readiness sentinel, drives it through Playwright, and checks the
//! rendered entity annotations against a spaCy oracle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Harness (Rust)                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Runner                                                      │
//! │    ├── AppHandle::acquire(source)   spawn + poll stdout      │
//! │    ├── BrowserSession::run(steps)   node + Playwright        │
//! │    ├── EntityOracle::entities(txt)  python3 + spaCy          │
//! │    └── AppHandle::shutdown()        signal, wait, kill       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                             │
//! │    ├── name, description, tags, viewport                     │
//! │    └── steps: [Step]                                         │
//! │          ├── navigate { path }                               │
//! │          ├── click { selector }                              │
//! │          ├── fill { selector, value }                        │
//! │          ├── press { key }                                   │
//! │          ├── assert_visible { selector }                     │
//! │          └── screenshot { name }                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod capture;
pub mod error;
pub mod oracle;
pub mod runner;
pub mod scenario;
pub mod supervisor;

pub use error::{HarnessError, HarnessResult};
pub use oracle::{Entity, EntityOracle};
pub use runner::{Runner, RunnerConfig};
pub use scenario::Scenario;
pub use supervisor::{
    AppHandle, AppSource, LaunchSpec, ReadinessPolicy, ShutdownOutcome, ShutdownPolicy,
};

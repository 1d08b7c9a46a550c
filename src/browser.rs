//! Playwright browser automation
//!
//! A scenario's steps compile into one JavaScript program that runs
//! under `node` against the Playwright library. One program per
//! scenario keeps the browser session alive across steps, which the
//! demo flow needs: the model picked from the dropdown has to stay
//! selected while the text is filled and submitted.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

const DEFAULT_STEP_TIMEOUT_MS: u64 = 5_000;

fn default_wait_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

#[derive(Debug, Clone, Copy, Default)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Key chord that submits a multiline text area in the demo app.
pub fn submit_chord() -> &'static str {
    if cfg!(target_os = "macos") {
        "Meta+Enter"
    } else {
        "Control+Enter"
    }
}

/// A single browser action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a path relative to the app's base URL.
    Navigate {
        path: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Click an element.
    Click {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fill an input or textarea.
    Fill { selector: String, value: String },

    /// Press a key or chord, optionally scoped to an element.
    Press {
        #[serde(default)]
        selector: Option<String>,
        key: String,
    },

    /// Wait until a selector reaches a state.
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Fixed pause (use sparingly).
    Sleep { ms: u64 },

    /// Assert that an element is visible.
    AssertVisible {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Take a screenshot.
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Log a marker line from inside the browser program.
    Log { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

impl Step {
    /// Short label used in failure reports.
    pub fn label(&self) -> String {
        match self {
            Step::Navigate { path, .. } => format!("navigate:{}", path),
            Step::Click { selector, .. } => format!("click:{}", selector),
            Step::Fill { selector, .. } => format!("fill:{}", selector),
            Step::Press { key, .. } => format!("press:{}", key),
            Step::Wait { selector, .. } => format!("wait:{}", selector),
            Step::Sleep { ms } => format!("sleep:{}ms", ms),
            Step::AssertVisible { selector, .. } => format!("assert_visible:{}", selector),
            Step::Screenshot { name, .. } => format!("screenshot:{}", name),
            Step::Log { message } => format!("log:{}", &message[..message.len().min(30)]),
        }
    }
}

/// Browser session configuration.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub screenshot_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            viewport_width: 1280,
            viewport_height: 720,
            browser: Browser::Chromium,
            headless: true,
        }
    }
}

/// Structured failure line the generated program prints on stderr.
#[derive(Debug, Deserialize)]
struct FailureReport {
    success: bool,
    #[serde(default)]
    step: String,
    #[serde(default)]
    error: String,
}

/// A Playwright session against one base URL.
pub struct BrowserSession {
    base_url: String,
    config: BrowserConfig,
}

impl BrowserSession {
    /// Create a session against `base_url`, verifying Playwright first.
    pub fn new(base_url: impl Into<String>, config: BrowserConfig) -> HarnessResult<Self> {
        Self::check_playwright_installed()?;
        std::fs::create_dir_all(&config.screenshot_dir)?;

        Ok(Self {
            base_url: base_url.into(),
            config,
        })
    }

    /// Check if Playwright is installed.
    fn check_playwright_installed() -> HarnessResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::PlaywrightNotFound),
        }
    }

    /// Build the Playwright program for a list of steps.
    ///
    /// The program tracks a `step` label so a thrown error can name the
    /// step it happened in; the label and message come back as JSON on
    /// stderr.
    pub fn build_script(&self, steps: &[Step]) -> String {
        let mut script = format!(
            r#"const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  const baseUrl = {base_url};
  let step = '';

  try {{
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            width = self.config.viewport_width,
            height = self.config.viewport_height,
            base_url = js_str(&self.base_url),
        );

        for s in steps {
            script.push_str(&format!("    step = {};\n", js_str(&s.label())));
            script.push_str(&self.step_js(s));
            script.push('\n');
        }

        script.push_str(
            r#"
    console.log(JSON.stringify({ success: true }));
  } catch (error) {
    console.error(JSON.stringify({ success: false, step, error: error.message }));
    process.exit(1);
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }

    fn step_js(&self, step: &Step) -> String {
        match step {
            Step::Navigate {
                path,
                wait_for_selector,
            } => {
                let mut js = format!("    await page.goto(baseUrl + {});", js_str(path));
                if let Some(sel) = wait_for_selector {
                    js.push_str(&format!(
                        "\n    await page.waitForSelector({});",
                        js_str(sel)
                    ));
                }
                js
            }
            Step::Click {
                selector,
                timeout_ms,
            } => format!(
                "    await page.click({}, {{ timeout: {} }});",
                js_str(selector),
                timeout_ms.unwrap_or(DEFAULT_STEP_TIMEOUT_MS)
            ),
            Step::Fill { selector, value } => format!(
                "    await page.fill({}, {});",
                js_str(selector),
                js_str(value)
            ),
            Step::Press { selector, key } => match selector {
                Some(sel) => format!(
                    "    await page.locator({}).press({});",
                    js_str(sel),
                    js_str(key)
                ),
                None => format!("    await page.keyboard.press({});", js_str(key)),
            },
            Step::Wait {
                selector,
                timeout_ms,
                state,
            } => format!(
                "    await page.waitForSelector({}, {{ state: '{}', timeout: {} }});",
                js_str(selector),
                state.as_str(),
                timeout_ms
            ),
            Step::Sleep { ms } => format!("    await page.waitForTimeout({});", ms),
            Step::AssertVisible {
                selector,
                timeout_ms,
            } => format!(
                "    await page.waitForSelector({}, {{ state: 'visible', timeout: {} }});",
                js_str(selector),
                timeout_ms
            ),
            Step::Screenshot { name, full_page } => {
                let path = self.config.screenshot_dir.join(format!("{}.png", name));
                format!(
                    "    await page.screenshot({{ path: {}, fullPage: {} }});",
                    js_str(&path.to_string_lossy()),
                    full_page
                )
            }
            Step::Log { message } => format!(
                "    console.log({});",
                js_str(&format!("[scenario] {}", message))
            ),
        }
    }

    /// Run all steps as one browser session.
    pub async fn run(&self, steps: &[Step]) -> HarnessResult<()> {
        let script = self.build_script(steps);

        let scratch = tempfile::tempdir()?;
        let script_path = scratch.path().join("scenario.js");
        std::fs::write(&script_path, &script)?;

        debug!("running Playwright program: {}", script_path.display());

        // The program lives in a scratch dir, so node's upward module
        // walk would miss the project's node_modules; NODE_PATH points
        // it back.
        let node_modules = std::env::current_dir()?.join("node_modules");
        let output = TokioCommand::new("node")
            .arg(&script_path)
            .env("NODE_PATH", node_modules)
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let report = stderr
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<FailureReport>(line).ok())
            .filter(|r| !r.success);

        match report {
            Some(r) => Err(HarnessError::Browser {
                step: r.step,
                reason: r.error,
            }),
            None => Err(HarnessError::Browser {
                step: "unknown".to_string(),
                reason: format!("node exited with {}: {}", output.status, stderr.trim()),
            }),
        }
    }
}

/// JSON-escape a value into a JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).expect("strings always serialize")
}

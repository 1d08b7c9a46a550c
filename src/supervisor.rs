//! Demo app lifecycle - spawning, readiness polling, shutdown
//!
//! The app under test is an external process. Bringing it up means
//! spawning it with a port and the headless flag, then watching its
//! stdout for the readiness sentinel while also watching for an early
//! exit. Tearing it down means a graceful signal, a bounded wait, and a
//! kill escalation, on every path out of a test including panics.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::capture::StreamCapture;
use crate::error::{HarnessError, HarnessResult};

/// Stdout line the demo app prints once it is serving.
pub const READY_SENTINEL: &str = "You can now view your Streamlit app in your browser.";

/// How often the shutdown path re-checks the child's exit status.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for reclamation after a SIGKILL.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// How to launch the demo app.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Program and leading arguments, e.g. `["streamlit", "run", "ner_demo.py"]`.
    pub command: Vec<String>,

    /// Working directory for the child.
    pub workdir: Option<PathBuf>,

    /// Fixed port, or `None` to bind a free one.
    pub port: Option<u16>,
}

impl LaunchSpec {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            workdir: None,
            port: None,
        }
    }

    /// Launch spec for a Streamlit entry script.
    pub fn streamlit(script: impl AsRef<std::path::Path>) -> Self {
        Self::new([
            "streamlit".to_string(),
            "run".to_string(),
            script.as_ref().to_string_lossy().into_owned(),
        ])
    }

    /// Full argument vector for a launch on `port`. The server flags
    /// follow the demo app's contract: it takes a port argument and a
    /// headless flag suppressing the opening-browser behavior.
    fn argv(&self, port: u16) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.extend([
            "--server.port".to_string(),
            port.to_string(),
            "--server.headless".to_string(),
            "true".to_string(),
        ]);
        argv
    }
}

/// Where the app under test comes from.
///
/// Resolved once at the suite boundary; the supervisor itself never
/// consults the environment.
#[derive(Debug, Clone)]
pub enum AppSource {
    /// Spawn and supervise our own instance.
    Managed(LaunchSpec),

    /// An instance already provisioned outside the test (e.g. a CI
    /// service container), reachable on a known port.
    External(u16),
}

/// Startup polling knobs.
#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    /// Pattern that marks successful startup in the child's stdout.
    pub ready_pattern: Regex,

    /// Pause between poll attempts.
    pub poll_interval: Duration,

    /// Poll attempts before giving up.
    pub max_retries: u32,

    /// Initial delay before the first check.
    pub startup_grace: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            ready_pattern: Regex::new(&regex::escape(READY_SENTINEL))
                .expect("escaped sentinel is a valid pattern"),
            poll_interval: Duration::from_secs(1),
            max_retries: 5,
            startup_grace: Duration::from_secs(1),
        }
    }
}

/// Shutdown knobs. Escalation to SIGKILL on timeout is not optional.
#[derive(Debug, Clone)]
pub struct ShutdownPolicy {
    /// Graceful-termination signal; the demo app exits cleanly on SIGINT.
    pub signal: Signal,

    /// How long to wait for a graceful exit before killing.
    pub wait_timeout: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            signal: Signal::SIGINT,
            wait_timeout: Duration::from_secs(15),
        }
    }
}

/// How a shutdown concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Nothing to do: the handle does not own a process.
    NoProcess,

    /// The child exited within the wait window.
    Graceful,

    /// The child ignored the signal and was killed.
    Killed,
}

/// What one poll tick concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartupState {
    Starting,
    Ready,
    Failed,
    Exhausted,
}

/// One transition of the startup state machine.
///
/// Exit wins over everything: a child that has exited is not "still
/// starting", whatever its output says. A sentinel match on the final
/// attempt still counts.
fn startup_step(exited: bool, sentinel_seen: bool, retries_left: u32) -> StartupState {
    if exited {
        StartupState::Failed
    } else if sentinel_seen {
        StartupState::Ready
    } else if retries_left == 0 {
        StartupState::Exhausted
    } else {
        StartupState::Starting
    }
}

/// Handle to the app under test for the scope of one test.
///
/// Only ever handed out Ready (or without a child for external
/// sources). Dropping the handle shuts the child down with the default
/// policy, so teardown runs even when an assertion panics.
pub struct AppHandle {
    child: Option<Child>,
    port: u16,
    stdout: Option<StreamCapture>,
    stderr: Option<StreamCapture>,
}

impl AppHandle {
    /// Bring the app to a usable state.
    pub fn acquire(source: AppSource, policy: &ReadinessPolicy) -> HarnessResult<Self> {
        match source {
            AppSource::External(port) => {
                info!("using externally provisioned app on port {}", port);
                Ok(Self {
                    child: None,
                    port,
                    stdout: None,
                    stderr: None,
                })
            }
            AppSource::Managed(spec) => Self::launch(&spec, policy),
        }
    }

    fn launch(spec: &LaunchSpec, policy: &ReadinessPolicy) -> HarnessResult<Self> {
        let port = spec.port.unwrap_or_else(find_free_port);
        let argv = spec.argv(port);
        let program = argv
            .first()
            .ok_or_else(|| HarnessError::Spawn("empty launch command".to_string()))?;

        info!("launching demo app on port {}: {}", port, argv.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| HarnessError::Spawn(format!("{}: {}", program, e)))?;

        let stdout = StreamCapture::attach(child.stdout.take().expect("stdout was piped"));
        let stderr = StreamCapture::attach(child.stderr.take().expect("stderr was piped"));

        let mut handle = Self {
            child: Some(child),
            port,
            stdout: Some(stdout),
            stderr: Some(stderr),
        };

        if !policy.startup_grace.is_zero() {
            thread::sleep(policy.startup_grace);
        }

        match handle.poll_until_ready(policy) {
            Ok(()) => Ok(handle),
            Err(e) => {
                // The handle never reaches the test body; reap the child
                // before reporting the startup failure.
                let _ = handle.shutdown(&ShutdownPolicy::default());
                Err(e)
            }
        }
    }

    /// The poll loop. Each tick checks exit status first (an exited
    /// child fails immediately, whatever retries remain), then searches
    /// the stdout captured so far for the sentinel. Sleeps are plain
    /// timed waits; nothing here blocks on the child's streams.
    fn poll_until_ready(&mut self, policy: &ReadinessPolicy) -> HarnessResult<()> {
        let mut attempts = 0u32;

        loop {
            let exited = match self.child.as_mut() {
                Some(child) => child.try_wait()?.is_some(),
                None => false,
            };
            let sentinel_seen = match &self.stdout {
                Some(capture) => policy.ready_pattern.is_match(&capture.contents()),
                None => false,
            };
            let retries_left = policy.max_retries.saturating_sub(attempts);

            match startup_step(exited, sentinel_seen, retries_left) {
                StartupState::Ready => {
                    info!(
                        "demo app ready on port {} after {} poll attempt(s)",
                        self.port, attempts
                    );
                    return Ok(());
                }
                StartupState::Failed => {
                    return Err(HarnessError::LaunchFailure {
                        stderr: self.stderr_contents(),
                    });
                }
                StartupState::Exhausted => {
                    return Err(HarnessError::ReadinessTimeout {
                        attempts,
                        stderr: self.stderr_contents(),
                    });
                }
                StartupState::Starting => {
                    debug!("demo app not ready yet, waiting {:?}", policy.poll_interval);
                    thread::sleep(policy.poll_interval);
                    attempts += 1;
                }
            }
        }
    }

    /// Port the app is serving on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for browser navigation.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Pid of the owned child, if this handle manages one.
    pub fn process_id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Stdout captured so far.
    pub fn stdout_contents(&self) -> String {
        self.stdout.as_ref().map(StreamCapture::contents).unwrap_or_default()
    }

    /// Stderr captured so far, for diagnostics.
    pub fn stderr_contents(&self) -> String {
        self.stderr.as_ref().map(StreamCapture::contents).unwrap_or_default()
    }

    /// Stop the app: graceful signal, bounded wait, kill escalation.
    ///
    /// Idempotent. Teardown trouble never turns into a test failure; an
    /// unreaped child is surfaced as a warning.
    pub fn shutdown(&mut self, policy: &ShutdownPolicy) -> HarnessResult<ShutdownOutcome> {
        let Some(mut child) = self.child.take() else {
            return Ok(ShutdownOutcome::NoProcess);
        };

        let pid = child.id();
        info!("stopping demo app (pid {}) with {}", pid, policy.signal);

        if let Err(e) = kill(Pid::from_raw(pid as i32), policy.signal) {
            // Most likely the child is already gone; the wait below settles it.
            debug!("signal delivery to pid {} failed: {}", pid, e);
        }

        if wait_with_deadline(&mut child, policy.wait_timeout)? {
            return Ok(ShutdownOutcome::Graceful);
        }

        warn!(
            "demo app (pid {}) ignored {} for {:?}, killing",
            pid, policy.signal, policy.wait_timeout
        );
        if let Err(e) = child.kill() {
            warn!("kill of pid {} failed: {}", pid, e);
        }
        if !wait_with_deadline(&mut child, KILL_REAP_TIMEOUT)? {
            warn!("demo app (pid {}) still unreaped after SIGKILL", pid);
        }
        Ok(ShutdownOutcome::Killed)
    }
}

impl Drop for AppHandle {
    fn drop(&mut self) {
        if self.child.is_some() {
            debug!("app handle dropped while running, shutting down");
            let _ = self.shutdown(&ShutdownPolicy::default());
        }
    }
}

/// Poll `try_wait` until the child exits or `deadline` elapses.
fn wait_with_deadline(child: &mut Child, deadline: Duration) -> std::io::Result<bool> {
    let start = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        if start.elapsed() >= deadline {
            return Ok(false);
        }
        thread::sleep(REAP_POLL_INTERVAL);
    }
}

/// Ask the OS for a free port.
pub fn find_free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to find free port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

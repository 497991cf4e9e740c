//! Availability supervisor for the Ollama daemon.
//!
//! One run walks a small state machine:
//!
//! ```text
//! Unknown -> Checking -> Running
//!                     -> Unreachable -> (spawn) -> Starting -> Checking -> Running
//!                                                                      -> Unreachable (final)
//! ```
//!
//! The daemon is spawned at most once per run. With more than one recheck
//! configured, a failed follow-up goes back to `Starting` and waits twice as
//! long (capped) before probing again. Probing, spawning and sleeping are
//! behind traits so the machine runs without sockets or real timers in tests.

use std::fmt;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{endpoint, normalize_base_url, SupervisorConfig, TinypadConfig, HEALTH_PATH};
use crate::dispatch::Dispatcher;
use crate::error::OllamaError;

/// Daemon availability as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    Unknown,
    Checking,
    Running,
    Starting,
    Unreachable,
}

impl ServiceStatus {
    /// Status line shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "⚪ Ollama status unknown",
            ServiceStatus::Checking => "⚪ Checking Ollama status...",
            ServiceStatus::Running => "🟢 Ollama is running",
            ServiceStatus::Starting => "🟡 Starting Ollama...",
            ServiceStatus::Unreachable => "🔴 Ollama is unreachable",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One reported transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: ServiceStatus,
    pub detail: Option<String>,
}

impl StatusReport {
    pub fn message(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{} ({})", self.status.label(), detail),
            None => self.status.label().to_string(),
        }
    }
}

/// Result of one supervisor run.
#[derive(Debug)]
pub struct SupervisorOutcome {
    pub status: ServiceStatus,
    /// Set when the daemon could not be launched.
    pub spawn_error: Option<OllamaError>,
}

/// Liveness check against the daemon.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, timeout: Duration) -> Result<(), OllamaError>;
}

/// Starts the daemon process.
pub trait DaemonLauncher: Send + Sync {
    fn launch(&self) -> Result<(), OllamaError>;
}

/// Waits between spawning and re-probing.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// `GET {base}/` health probe.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProbe {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(base_url.as_ref()),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, timeout: Duration) -> Result<(), OllamaError> {
        let url = endpoint(&self.base_url, HEALTH_PATH);

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    OllamaError::ServerNotRunning(self.base_url.clone())
                } else {
                    OllamaError::Http(e)
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(OllamaError::Unhealthy {
                url,
                status: response.status().as_u16(),
            })
        }
    }
}

/// Spawns the daemon as a detached background process.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl DaemonLauncher for CommandLauncher {
    fn launch(&self) -> Result<(), OllamaError> {
        info!("Starting daemon: {}", self.command_line());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Keep terminal signals aimed at us away from the daemon.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| OllamaError::SpawnFailed(format!("{}: {}", self.program, e)))?;

        debug!("Daemon process started with PID: {}", child.id());

        // The daemon outlives the run; reap it if it exits early.
        std::thread::spawn(move || match child.wait() {
            Ok(status) => debug!("Daemon process exited with status: {}", status),
            Err(e) => warn!("Error waiting on daemon process: {}", e),
        });

        Ok(())
    }
}

/// Real-time sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Machine states. `recheck` is `None` for the initial probe.
#[derive(Debug)]
enum Phase {
    Probe { recheck: Option<u32> },
    Down,
    Boot { attempt: u32 },
    Done(ServiceStatus),
}

/// Forwards each status change exactly once.
struct Reporter<F> {
    last: ServiceStatus,
    sink: F,
}

impl<F: FnMut(StatusReport)> Reporter<F> {
    fn new(sink: F) -> Self {
        Self {
            last: ServiceStatus::Unknown,
            sink,
        }
    }

    fn report(&mut self, status: ServiceStatus, detail: Option<String>) {
        if status == self.last {
            return;
        }
        debug!("Daemon status: {:?} -> {:?}", self.last, status);
        self.last = status;
        (self.sink)(StatusReport { status, detail });
    }
}

/// Health-checks the daemon and starts it when absent.
#[derive(Clone)]
pub struct AvailabilitySupervisor {
    probe: Arc<dyn HealthProbe>,
    launcher: Arc<dyn DaemonLauncher>,
    sleeper: Arc<dyn Sleeper>,
    config: SupervisorConfig,
}

impl AvailabilitySupervisor {
    /// Supervisor for the daemon described by `config`.
    pub fn from_config(config: &TinypadConfig) -> Self {
        Self::with_parts(
            Arc::new(HttpProbe::new(config.base_url.clone())),
            Arc::new(CommandLauncher::new(
                config.daemon_program.clone(),
                config.daemon_args.clone(),
            )),
            Arc::new(TokioSleeper),
            config.supervisor.clone(),
        )
    }

    pub fn with_parts(
        probe: Arc<dyn HealthProbe>,
        launcher: Arc<dyn DaemonLauncher>,
        sleeper: Arc<dyn Sleeper>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            probe,
            launcher,
            sleeper,
            config,
        }
    }

    /// Full run: probe, and on failure spawn the daemon and re-probe.
    pub async fn run<F>(&self, report: F) -> SupervisorOutcome
    where
        F: FnMut(StatusReport) + Send,
    {
        self.drive(report, true).await
    }

    /// Run on a background task, forwarding status lines to the foreground.
    pub fn spawn(&self, dispatcher: Dispatcher) -> JoinHandle<ServiceStatus> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let outcome = supervisor
                .run(|report| {
                    dispatcher.status(report.message());
                })
                .await;
            if let Some(e) = &outcome.spawn_error {
                dispatcher.status(format!("🔴 Error: {}", e));
            }
            outcome.status
        })
    }

    /// Probe once without trying to start anything.
    pub async fn check<F>(&self, report: F) -> SupervisorOutcome
    where
        F: FnMut(StatusReport) + Send,
    {
        self.drive(report, false).await
    }

    async fn drive<F>(&self, report: F, may_launch: bool) -> SupervisorOutcome
    where
        F: FnMut(StatusReport) + Send,
    {
        let mut reporter = Reporter::new(report);
        let mut spawn_error = None;
        let mut phase = Phase::Probe { recheck: None };

        let status = loop {
            phase = match phase {
                Phase::Probe { recheck } => {
                    reporter.report(ServiceStatus::Checking, None);
                    let timeout = match recheck {
                        None => self.config.probe_timeout,
                        Some(_) => self.config.recheck_timeout,
                    };

                    match (self.probe.probe(timeout).await, recheck) {
                        (Ok(()), None) => {
                            reporter.report(ServiceStatus::Running, None);
                            Phase::Done(ServiceStatus::Running)
                        }
                        (Ok(()), Some(_)) => {
                            reporter.report(
                                ServiceStatus::Running,
                                Some("started successfully".to_string()),
                            );
                            Phase::Done(ServiceStatus::Running)
                        }
                        (Err(e), None) => {
                            info!("Daemon not reachable: {}", e);
                            reporter.report(ServiceStatus::Unreachable, Some(e.to_string()));
                            Phase::Down
                        }
                        (Err(e), Some(attempt)) if attempt + 1 < self.config.rechecks => {
                            debug!("Recheck {} failed: {}", attempt + 1, e);
                            Phase::Boot {
                                attempt: attempt + 1,
                            }
                        }
                        (Err(e), Some(_)) => {
                            warn!("Daemon still unreachable after start: {}", e);
                            reporter.report(
                                ServiceStatus::Unreachable,
                                Some(format!("still can't connect: {}", e)),
                            );
                            Phase::Done(ServiceStatus::Unreachable)
                        }
                    }
                }
                Phase::Down if !may_launch || self.config.rechecks == 0 => {
                    Phase::Done(ServiceStatus::Unreachable)
                }
                Phase::Down => match self.launcher.launch() {
                    Ok(()) => Phase::Boot { attempt: 0 },
                    Err(e) => {
                        warn!("{}", e);
                        spawn_error = Some(e);
                        Phase::Done(ServiceStatus::Unreachable)
                    }
                },
                Phase::Boot { attempt } => {
                    reporter.report(ServiceStatus::Starting, None);
                    let delay = self.config.delay_before(attempt);
                    debug!("Waiting {:?} for the daemon to boot", delay);
                    self.sleeper.sleep(delay).await;
                    Phase::Probe {
                        recheck: Some(attempt),
                    }
                }
                Phase::Done(status) => break status,
            };
        };

        SupervisorOutcome {
            status,
            spawn_error,
        }
    }
}

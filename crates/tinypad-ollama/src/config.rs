//! Daemon and client configuration.

use std::time::Duration;

use crate::{DEFAULT_DAEMON_PROGRAM, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};

/// Timing knobs for the availability supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Timeout for the initial liveness probe.
    pub probe_timeout: Duration,
    /// Timeout for each follow-up probe after a spawn.
    pub recheck_timeout: Duration,
    /// Wait between spawning the daemon and the first follow-up probe.
    pub boot_delay: Duration,
    /// Number of follow-up probes after a spawn.
    pub rechecks: u32,
    /// Upper bound for the doubled wait between follow-up probes.
    pub max_boot_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            recheck_timeout: Duration::from_secs(2),
            boot_delay: Duration::from_secs(2),
            rechecks: 1,
            max_boot_delay: Duration::from_secs(8),
        }
    }
}

impl SupervisorConfig {
    /// Wait before follow-up probe number `attempt` (zero based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.boot_delay
            .checked_mul(factor)
            .unwrap_or(self.max_boot_delay)
            .min(self.max_boot_delay.max(self.boot_delay))
    }
}

/// Configuration for the Tinypad daemon client.
#[derive(Debug, Clone)]
pub struct TinypadConfig {
    /// Daemon base URL, without a trailing slash.
    pub base_url: String,
    /// Model used when the catalog comes back empty.
    pub default_model: String,
    /// Program launched to start the daemon.
    pub daemon_program: String,
    /// Arguments passed to the daemon program.
    pub daemon_args: Vec<String>,
    /// TCP connect timeout for every request.
    pub connect_timeout: Duration,
    /// Supervisor timing.
    pub supervisor: SupervisorConfig,
}

impl Default for TinypadConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            daemon_program: DEFAULT_DAEMON_PROGRAM.to_string(),
            daemon_args: vec!["serve".to_string()],
            connect_timeout: Duration::from_secs(5),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl TinypadConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("TINYPAD_OLLAMA_URL").or_else(|| lookup("OLLAMA_HOST")) {
            config.base_url = normalize_base_url(&url);
        }

        if let Some(model) = lookup("TINYPAD_MODEL").filter(|m| !m.trim().is_empty()) {
            config.default_model = model.trim().to_string();
        }

        if let Some(program) = lookup("TINYPAD_OLLAMA_BIN").filter(|p| !p.trim().is_empty()) {
            config.daemon_program = program;
        }

        if let Some(ms) = lookup("TINYPAD_BOOT_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.supervisor.boot_delay = Duration::from_millis(ms);
        }

        if let Some(n) = lookup("TINYPAD_RECHECKS").and_then(|v| v.parse::<u32>().ok()) {
            config.supervisor.rechecks = n;
        }

        config
    }

    /// Create a builder for configuration.
    pub fn builder() -> TinypadConfigBuilder {
        TinypadConfigBuilder::default()
    }
}

/// Liveness endpoint.
pub(crate) const HEALTH_PATH: &str = "/";
/// Model listing endpoint.
pub(crate) const TAGS_PATH: &str = "/api/tags";
/// Streaming generation endpoint.
pub(crate) const GENERATE_PATH: &str = "/api/generate";

/// Join a normalized base URL and an endpoint path.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url, path)
}

/// Accepts `host:port`, bare hosts, and full URLs; strips trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.contains(':') {
        format!("http://{}", trimmed)
    } else {
        format!("http://{}:11434", trimmed)
    }
}

/// Builder for Tinypad configuration.
#[derive(Debug, Default)]
pub struct TinypadConfigBuilder {
    config: TinypadConfig,
}

impl TinypadConfigBuilder {
    pub fn base_url(mut self, url: impl AsRef<str>) -> Self {
        self.config.base_url = normalize_base_url(url.as_ref());
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn daemon_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.config.daemon_program = program.into();
        self.config.daemon_args = args;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn supervisor(mut self, supervisor: SupervisorConfig) -> Self {
        self.config.supervisor = supervisor;
        self
    }

    pub fn build(self) -> TinypadConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TinypadConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.default_model, "llama3.2");
        assert_eq!(config.daemon_program, "ollama");
        assert_eq!(config.daemon_args, vec!["serve".to_string()]);
        assert_eq!(config.supervisor.rechecks, 1);
    }

    #[test]
    fn test_endpoint_urls() {
        let config = TinypadConfig::builder()
            .base_url("http://127.0.0.1:9000/")
            .build();
        assert_eq!(endpoint(&config.base_url, HEALTH_PATH), "http://127.0.0.1:9000/");
        assert_eq!(
            endpoint(&config.base_url, TAGS_PATH),
            "http://127.0.0.1:9000/api/tags"
        );
        assert_eq!(
            endpoint(&config.base_url, GENERATE_PATH),
            "http://127.0.0.1:9000/api/generate"
        );
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("0.0.0.0:11434"), "http://0.0.0.0:11434");
        assert_eq!(normalize_base_url("myhost"), "http://myhost:11434");
        assert_eq!(
            normalize_base_url("https://ollama.lan/"),
            "https://ollama.lan"
        );
    }

    #[test]
    fn test_from_env_overrides() {
        let config = TinypadConfig::from_lookup(lookup_from(&[
            ("OLLAMA_HOST", "10.0.0.5:11434"),
            ("TINYPAD_MODEL", "qwen2.5:7b"),
            ("TINYPAD_BOOT_DELAY_MS", "500"),
            ("TINYPAD_RECHECKS", "3"),
        ]));
        assert_eq!(config.base_url, "http://10.0.0.5:11434");
        assert_eq!(config.default_model, "qwen2.5:7b");
        assert_eq!(config.supervisor.boot_delay, Duration::from_millis(500));
        assert_eq!(config.supervisor.rechecks, 3);
    }

    #[test]
    fn test_from_env_prefers_tinypad_url() {
        let config = TinypadConfig::from_lookup(lookup_from(&[
            ("OLLAMA_HOST", "10.0.0.5:11434"),
            ("TINYPAD_OLLAMA_URL", "http://localhost:9999"),
        ]));
        assert_eq!(config.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_from_env_ignores_garbage() {
        let config = TinypadConfig::from_lookup(lookup_from(&[
            ("TINYPAD_BOOT_DELAY_MS", "soon"),
            ("TINYPAD_RECHECKS", "-1"),
            ("TINYPAD_MODEL", "   "),
        ]));
        assert_eq!(config.supervisor, SupervisorConfig::default());
        assert_eq!(config.default_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let supervisor = SupervisorConfig::default();
        assert_eq!(supervisor.delay_before(0), Duration::from_secs(2));
        assert_eq!(supervisor.delay_before(1), Duration::from_secs(4));
        assert_eq!(supervisor.delay_before(2), Duration::from_secs(8));
        assert_eq!(supervisor.delay_before(3), Duration::from_secs(8));
        assert_eq!(supervisor.delay_before(40), Duration::from_secs(8));
    }
}

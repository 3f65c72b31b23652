use crate::store::{StoreSettings, DEFAULT_GATEWAY_TIMEOUT};
use anyhow::{anyhow, Context};
use std::time::Duration;

pub const LOG_ENV: &str = "SCHOOLDOCSD_LOG";
pub const GATEWAY_TIMEOUT_ENV: &str = "SCHOOLDOCSD_GATEWAY_TIMEOUT_MS";
/// Workspace `settings` key that overrides the process-wide timeout.
pub const GATEWAY_TIMEOUT_SETTING: &str = "store.gatewayTimeoutMs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub gateway_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(GATEWAY_TIMEOUT_ENV) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{GATEWAY_TIMEOUT_ENV} must be milliseconds, got {raw:?}"))?;
            cfg.gateway_timeout = timeout_from_ms(ms)?;
        }
        Ok(cfg)
    }

    /// Store settings for a workspace, applying its stored override if any.
    pub fn store_settings(&self, workspace_override: Option<&serde_json::Value>) -> StoreSettings {
        let gateway_timeout = workspace_override
            .and_then(|v| v.as_u64())
            .and_then(|ms| timeout_from_ms(ms).ok())
            .unwrap_or(self.gateway_timeout);
        StoreSettings { gateway_timeout }
    }
}

fn timeout_from_ms(ms: u64) -> anyhow::Result<Duration> {
    if ms == 0 {
        return Err(anyhow!("gateway timeout must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

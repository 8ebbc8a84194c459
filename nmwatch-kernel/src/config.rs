use crate::snapshot::VersionOrder;
use serde::{Deserialize, Serialize};
use anyhow::Context;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub udp: UdpConf,
    pub registry: RegistryConf,
    pub http: HttpConf,
    pub snapshot: SnapshotConf,
    pub firmware: Option<FirmwareConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UdpConf {
    pub bind: String,
    pub port: u16,
    pub recv_buffer_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RegistryConf {
    pub stale_after_secs: u64,
    /// Par défaut : moitié du seuil de staleness
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SnapshotConf {
    pub version_order: VersionOrder,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FirmwareConf {
    pub latest_version: Option<String>,
}

impl Default for UdpConf {
    fn default() -> Self {
        // port de broadcast des NMMiner
        Self { bind: "0.0.0.0".into(), port: 12345, recv_buffer_bytes: 2048 }
    }
}

impl Default for RegistryConf {
    fn default() -> Self {
        Self { stale_after_secs: 60, sweep_interval_secs: None }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 7877 }
    }
}

impl UdpConf {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        socket_addr(&self.bind, self.port)
    }
}

impl HttpConf {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        socket_addr(&self.bind, self.port)
    }
}

/// `bind` est une IP nue, v4 ou v6 ("0.0.0.0", "::")
fn socket_addr(bind: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = bind
        .trim()
        .parse()
        .with_context(|| format!("invalid bind address {bind:?}"))?;
    Ok(SocketAddr::new(ip, port))
}

impl RegistryConf {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs.max(1))
    }

    /// Toujours strictement sous le seuil : par défaut la moitié de `stale_after()`
    pub fn sweep_interval(&self) -> Duration {
        let stale_after = self.stale_after();
        let default = stale_after / 2;

        match self.sweep_interval_secs.map(Duration::from_secs) {
            None => default,
            Some(every) if every.is_zero() || every >= stale_after => {
                warn!(
                    "sweep interval {:?} must be below stale threshold {:?}, using {:?}",
                    every, stale_after, default
                );
                default
            }
            Some(every) => every,
        }
    }
}

impl MonitorConfig {
    pub fn latest_release(&self) -> Option<String> {
        self.firmware.as_ref().and_then(|f| f.latest_version.clone())
    }

    /// Surcharges par variables d'environnement (après .env)
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_parse::<u16>("NMWATCH_UDP_PORT") {
            self.udp.port = port;
        }
        if let Some(port) = env_parse::<u16>("NMWATCH_HTTP_PORT") {
            self.http.port = port;
        }
        if let Some(secs) = env_parse::<u64>("NMWATCH_STALE_AFTER_SECS") {
            self.registry.stale_after_secs = secs;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

pub async fn load_config() -> MonitorConfig {
    let path = std::env::var("NMWATCH_CONFIG").unwrap_or_else(|_| "nmwatch.yaml".into());
    let mut cfg = load_config_from(&path).await;
    cfg.apply_env_overrides();
    cfg
}

pub async fn load_config_from<P: AsRef<Path>>(path: P) -> MonitorConfig {
    let path = path.as_ref();
    if !path.exists() {
        warn!("no config at {}, using defaults", path.display());
        return MonitorConfig::default();
    }

    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return MonitorConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("invalid config {}: {e}, using defaults", path.display());
        MonitorConfig::default()
    })
}

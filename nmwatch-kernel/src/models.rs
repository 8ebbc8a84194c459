use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use time::OffsetDateTime;

/// Identité d'un mineur dans le registry (adresse LAN auto-déclarée)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn as_ip(&self) -> Option<IpAddr> {
        self.0.parse().ok()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// IPs d'abord, triées numériquement ; le reste en ordre lexicographique
impl Ord for DeviceId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_ip(), other.as_ip()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for DeviceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shares {
    pub rejected: u64,
    pub accepted: u64,
    /// Ratio tel qu'affiché par le firmware ("99.4%"), jamais recalculé
    pub ratio: Option<String>,
}

/// Paquet décodé et validé, tel que le mineur l'a annoncé
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub id: DeviceId,
    pub board_type: String,
    pub hashrate_raw: String,
    /// kH/s
    pub hashrate_normalized: f64,
    pub shares: Shares,
    pub net_diff: String,
    pub pool_diff: String,
    pub last_diff: String,
    pub best_diff: String,
    pub valid_blocks: u64,
    pub progress: f64,
    pub temp: f64,
    pub rssi: i32,
    pub free_heap_kb: f64,
    pub uptime: String,
    pub version: String,
}

/// Entrée du registry : dernier rapport + horodatage serveur
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    #[serde(flatten)]
    pub report: DeviceReport,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

impl Device {
    pub fn id(&self) -> &DeviceId {
        &self.report.id
    }
}

/// Vue cohérente de la flotte à un instant donné, jamais stockée
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub devices: Vec<Device>,
    /// kH/s
    pub total_hashrate_normalized: f64,
    pub latest_version_seen: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,
}

/**
 * SNAPSHOT SERVICE - Agrégats flotte pour la couche présentation
 *
 * RÔLE : Lire le registry, trier par identité, sommer le hashrate normalisé,
 * retenir la version firmware la plus haute vue. Sans effet de bord,
 * appelable en parallèle autant que nécessaire.
 */

use crate::models::{Device, FleetSnapshot};
use crate::registry::SharedRegistry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use time::OffsetDateTime;

/// Politique de comparaison pour "latest version seen"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrder {
    #[default]
    Lexicographic,
    /// v1.1.03i : préfixe numérique par composant, puis suffixe
    Semantic,
}

impl VersionOrder {
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            VersionOrder::Lexicographic => a.cmp(b),
            VersionOrder::Semantic => compare_semantic(a, b),
        }
    }
}

#[derive(Clone)]
pub struct SnapshotService {
    registry: SharedRegistry,
    version_order: VersionOrder,
}

impl SnapshotService {
    pub fn new(registry: SharedRegistry, version_order: VersionOrder) -> Self {
        Self { registry, version_order }
    }

    pub fn fleet_snapshot(&self) -> FleetSnapshot {
        let mut devices = self.registry.snapshot();
        devices.sort_by(|a, b| a.id().cmp(b.id()));

        FleetSnapshot {
            total_hashrate_normalized: total_hashrate(&devices),
            latest_version_seen: latest_version(&devices, self.version_order),
            devices,
            taken_at: OffsetDateTime::now_utc(),
        }
    }
}

pub fn total_hashrate(devices: &[Device]) -> f64 {
    devices.iter().map(|d| d.report.hashrate_normalized).sum()
}

/// Plus haute version non vide, None si aucune
pub fn latest_version(devices: &[Device], order: VersionOrder) -> Option<String> {
    devices
        .iter()
        .map(|d| d.report.version.trim())
        .filter(|v| !v.is_empty())
        .max_by(|a, b| order.compare(a, b))
        .map(str::to_string)
}

fn compare_semantic(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<&str> = strip_prefix(a).split('.').collect();
    let b_parts: Vec<&str> = strip_prefix(b).split('.').collect();

    for i in 0..a_parts.len().max(b_parts.len()) {
        let ord = match (a_parts.get(i), b_parts.get(i)) {
            (Some(x), Some(y)) => compare_component(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    // départage stable pour des écritures équivalentes ("v1.2" vs "1.2")
    a.cmp(b)
}

fn strip_prefix(v: &str) -> &str {
    v.trim().trim_start_matches(['v', 'V'])
}

fn compare_component(a: &str, b: &str) -> Ordering {
    let (a_num, a_rest) = split_numeric(a);
    let (b_num, b_rest) = split_numeric(b);
    a_num.cmp(&b_num).then_with(|| a_rest.cmp(b_rest))
}

fn split_numeric(s: &str) -> (u64, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    (s[..end].parse().unwrap_or(0), &s[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceId, DeviceReport, Shares};
    use crate::registry::DeviceRegistry;

    fn report(ip: &str, hashrate_kh: f64, version: &str) -> DeviceReport {
        DeviceReport {
            id: DeviceId::new(ip),
            board_type: "NMLotto".into(),
            hashrate_raw: String::new(),
            hashrate_normalized: hashrate_kh,
            shares: Shares::default(),
            net_diff: String::new(),
            pool_diff: String::new(),
            last_diff: String::new(),
            best_diff: String::new(),
            valid_blocks: 0,
            progress: 0.0,
            temp: 40.0,
            rssi: -55,
            free_heap_kb: 120.0,
            uptime: String::new(),
            version: version.into(),
        }
    }

    #[test]
    fn test_total_hashrate_sums_normalized_values() {
        let registry = DeviceRegistry::shared();
        registry.upsert(report("192.168.1.3", 100.0, "v0.3.01"));
        registry.upsert(report("192.168.1.2", 4000.0, "v0.3.01"));

        let snapshot = SnapshotService::new(registry, VersionOrder::Lexicographic).fleet_snapshot();
        assert_eq!(snapshot.total_hashrate_normalized, 4100.0);
    }

    #[test]
    fn test_devices_sorted_by_identity() {
        let registry = DeviceRegistry::shared();
        for ip in ["192.168.1.10", "192.168.1.9", "192.168.1.100"] {
            registry.upsert(report(ip, 1.0, "v1"));
        }

        let snapshot = SnapshotService::new(registry, VersionOrder::default()).fleet_snapshot();
        let ids: Vec<&str> = snapshot.devices.iter().map(|d| d.id().as_str()).collect();
        assert_eq!(ids, vec!["192.168.1.9", "192.168.1.10", "192.168.1.100"]);
    }

    #[test]
    fn test_empty_fleet() {
        let snapshot = SnapshotService::new(DeviceRegistry::shared(), VersionOrder::default())
            .fleet_snapshot();
        assert!(snapshot.devices.is_empty());
        assert_eq!(snapshot.total_hashrate_normalized, 0.0);
        assert_eq!(snapshot.latest_version_seen, None);
    }

    #[test]
    fn test_latest_version_lexicographic() {
        let registry = DeviceRegistry::shared();
        registry.upsert(report("10.0.0.1", 1.0, "v0.3.01"));
        registry.upsert(report("10.0.0.2", 1.0, "v0.3.10"));
        registry.upsert(report("10.0.0.3", 1.0, ""));

        let snapshot = SnapshotService::new(registry, VersionOrder::Lexicographic).fleet_snapshot();
        assert_eq!(snapshot.latest_version_seen.as_deref(), Some("v0.3.10"));
    }

    #[test]
    fn test_semantic_differs_from_lexicographic() {
        // "v0.10.0" < "v0.9.0" en lexicographique, l'inverse en sémantique
        assert_eq!(VersionOrder::Lexicographic.compare("v0.10.0", "v0.9.0"), Ordering::Less);
        assert_eq!(VersionOrder::Semantic.compare("v0.10.0", "v0.9.0"), Ordering::Greater);
    }

    #[test]
    fn test_semantic_handles_letter_suffix() {
        let order = VersionOrder::Semantic;
        assert_eq!(order.compare("v1.1.03i", "v1.1.03"), Ordering::Greater);
        assert_eq!(order.compare("v1.1.03i", "v1.1.04"), Ordering::Less);
        assert_eq!(order.compare("1.2", "v1.2.1"), Ordering::Less);
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = DeviceRegistry::shared();
        registry.upsert(report("10.0.0.1", 5.0, "v1"));
        let service = SnapshotService::new(registry.clone(), VersionOrder::default());

        let snapshot = service.fleet_snapshot();
        registry.upsert(report("10.0.0.2", 7.0, "v1"));

        assert_eq!(snapshot.devices.len(), 1);
        assert_eq!(service.fleet_snapshot().devices.len(), 2);
    }
}

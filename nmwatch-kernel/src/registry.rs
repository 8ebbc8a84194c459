/**
 * DEVICE REGISTRY - Table vivante des mineurs vus sur le LAN
 *
 * RÔLE : Unique état mutable partagé du kernel. Identity → dernier Device connu.
 *
 * FONCTIONNEMENT :
 * - RwLock : upsert/evict exclusifs, snapshots concurrents entre eux
 * - upsert = remplacement complet de l'entrée (pas de merge champ par champ)
 * - last_seen posé par le serveur à la réception, jamais par le payload
 * - snapshot = copie indépendante, aucun lecteur ne garde de référence vivante
 *
 * Instancié une fois dans main, partagé en Arc avec listener, sweeper et snapshot.
 */

use crate::models::{Device, DeviceId, DeviceReport};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

pub type DevicesMap = HashMap<DeviceId, Device>;

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<DevicesMap>,
}

pub type SharedRegistry = Arc<DeviceRegistry>;

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    /// Insère ou remplace le device, horodaté maintenant
    pub fn upsert(&self, report: DeviceReport) -> UpsertOutcome {
        self.upsert_at(report, OffsetDateTime::now_utc())
    }

    /// Variante à horloge injectée. last_seen ne recule jamais pour une identité,
    /// même si l'horloge murale est corrigée en arrière.
    pub fn upsert_at(&self, report: DeviceReport, now: OffsetDateTime) -> UpsertOutcome {
        let mut devices = self.devices.write();

        let last_seen = match devices.get(&report.id) {
            Some(previous) if previous.last_seen > now => previous.last_seen,
            _ => now,
        };

        let id = report.id.clone();
        match devices.insert(id, Device { report, last_seen }) {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        }
    }

    /// Copie cohérente de toutes les entrées à un instant donné
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.read().values().cloned().collect()
    }

    pub fn get(&self, id: &DeviceId) -> Option<Device> {
        self.devices.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Retire les devices dont `now - last_seen > threshold`, retourne leurs ids
    pub fn evict_older_than(&self, threshold: Duration) -> Vec<DeviceId> {
        self.evict_older_than_at(threshold, OffsetDateTime::now_utc())
    }

    pub fn evict_older_than_at(&self, threshold: Duration, now: OffsetDateTime) -> Vec<DeviceId> {
        let threshold = time::Duration::try_from(threshold).unwrap_or(time::Duration::MAX);
        let mut evicted = Vec::new();

        self.devices.write().retain(|id, device| {
            if now - device.last_seen > threshold {
                evicted.push(id.clone());
                false
            } else {
                true
            }
        });

        evicted
    }
}

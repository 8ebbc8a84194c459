/**
 * FIRMWARE RELEASE - Interface vers la source "dernière version publiée"
 *
 * La récupération réelle (API releases) vit hors du kernel ; ici on ne garde
 * que le contrat et une implémentation statique alimentée par la config.
 */

use crate::state::Shared;

pub trait ReleaseSource: Send + Sync {
    fn latest_version(&self) -> Option<String>;
}

/// Version connue fournie par la config (ou mise à jour par un collaborateur)
#[derive(Clone)]
pub struct StaticRelease {
    version: Shared<Option<String>>,
}

impl StaticRelease {
    pub fn new(version: Option<String>) -> Self {
        Self {
            version: crate::state::new_state(version.filter(|v| !v.trim().is_empty())),
        }
    }

    pub fn set(&self, version: Option<String>) {
        *self.version.lock() = version;
    }
}

impl ReleaseSource for StaticRelease {
    fn latest_version(&self) -> Option<String> {
        self.version.lock().clone()
    }
}

/// Comparaison stricte comme le contrôle firmware d'origine.
/// Sans version de référence, rien n'est marqué obsolète.
pub fn is_outdated(device_version: &str, latest: Option<&str>) -> bool {
    match latest {
        Some(latest) => device_version != latest,
        None => false,
    }
}

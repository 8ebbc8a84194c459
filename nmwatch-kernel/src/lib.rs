//! NMWatch kernel - ingestion télémétrie des mineurs NMMiner sur le LAN.
//!
//! Pipeline : datagramme UDP → `decoder` → `registry` (upsert), `sweeper`
//! pour les devices silencieux, `snapshot` pour la vue flotte consommée par
//! la présentation via `http`.

pub mod config;
pub mod decoder;
pub mod error;
pub mod firmware;
pub mod hashrate;
pub mod health;
pub mod http;
pub mod listener;
pub mod models;
pub mod registry;
pub mod snapshot;
pub mod state;
pub mod sweeper;

pub use error::{TelemetryError, TelemetryResult};
pub use models::{Device, DeviceId, DeviceReport, FleetSnapshot, Shares};
pub use registry::{DeviceRegistry, SharedRegistry, UpsertOutcome};
pub use snapshot::{SnapshotService, VersionOrder};

/*!
# NMWatch DevKit - Stubs et utilitaires pour tester l'ingestion

Bibliothèque facilitant le développement autour du kernel NMWatch avec:
- Émetteur UDP imitant un mineur NMMiner
- Builder de paquets télémétrie (valides ou volontairement cassés)
- Chargement de paquets capturés depuis des fichiers JSON
- Harness de test avec listener réel sur port éphémère
*/

pub mod udp_stub;
pub mod packet_helpers;
pub mod test_utils;

pub use udp_stub::TelemetrySender;
pub use packet_helpers::{PacketFixtures, TelemetryPacketBuilder};
pub use test_utils::TestHarness;

// utilisé par la macro telemetry_test!
#[doc(hidden)]
pub use anyhow;

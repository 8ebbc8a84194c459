/*!
Helpers pour construire et charger des paquets télémétrie NMMiner

Facilite le développement en fournissant:
- Un builder de paquets conformes au schéma (tous les champs renseignés)
- Des mutations pour fabriquer des paquets invalides (champ retiré, mauvais type)
- Le chargement de paquets capturés sur un vrai LAN (fichiers *.json)
*/

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Tous les champs connus du paquet, dans l'ordre d'émission du firmware
pub const PACKET_FIELDS: &[&str] = &[
    "IP", "BoardType", "HashRate", "Share", "NetDiff", "PoolDiff", "LastDiff",
    "BestDiff", "Valid", "Progress", "Temp", "RSSI", "FreeHeap", "Uptime", "Version",
];

/// Paquet en construction
#[derive(Debug, Clone)]
pub struct TelemetryPacketBuilder {
    payload: Map<String, Value>,
}

impl TelemetryPacketBuilder {
    /// Paquet complet et valide pour l'IP donnée
    pub fn valid<S: Into<String>>(ip: S) -> Self {
        let payload = serde_json::json!({
            "IP": ip.into(),
            "BoardType": "NMLotto",
            "HashRate": "113.13K",
            "Share": "0/128/100.0%",
            "NetDiff": "110.45T",
            "PoolDiff": "0.0014",
            "LastDiff": "0.0009",
            "BestDiff": "2.31M",
            "Valid": 0,
            "Progress": 0.42,
            "Temp": 46.8,
            "RSSI": -62,
            "FreeHeap": 143.5,
            "Uptime": "000d 02:14:09",
            "Version": "v0.3.01"
        });

        match payload {
            Value::Object(payload) => Self { payload },
            _ => unreachable!("json! object literal"),
        }
    }

    /// Définit un champ arbitraire (y compris avec un mauvais type)
    pub fn set_field<S: Into<String>>(mut self, field: S, value: Value) -> Self {
        self.payload.insert(field.into(), value);
        self
    }

    pub fn set_string<S: Into<String>, V: Into<String>>(self, field: S, value: V) -> Self {
        self.set_field(field, Value::String(value.into()))
    }

    pub fn hashrate<V: Into<String>>(self, raw: V) -> Self {
        self.set_string("HashRate", raw)
    }

    pub fn version<V: Into<String>>(self, version: V) -> Self {
        self.set_string("Version", version)
    }

    pub fn temp(self, celsius: f64) -> Self {
        self.set_field("Temp", serde_json::json!(celsius))
    }

    pub fn rssi(self, dbm: i32) -> Self {
        self.set_field("RSSI", serde_json::json!(dbm))
    }

    pub fn shares(self, rejected: u64, accepted: u64) -> Self {
        let ratio = if rejected + accepted == 0 {
            100.0
        } else {
            accepted as f64 * 100.0 / (rejected + accepted) as f64
        };
        self.set_string("Share", format!("{rejected}/{accepted}/{ratio:.1}%"))
    }

    /// Retire un champ pour simuler un paquet incomplet
    pub fn without(mut self, field: &str) -> Self {
        self.payload.remove(field);
        self
    }

    pub fn build(&self) -> Value {
        Value::Object(self.payload.clone())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.payload)?)
    }
}

/// Paquets capturés, chargés depuis un répertoire de fichiers JSON
pub struct PacketFixtures {
    packets: BTreeMap<String, Value>,
    fixtures_dir: PathBuf,
}

impl PacketFixtures {
    pub fn new<P: AsRef<Path>>(fixtures_dir: P) -> Self {
        Self {
            packets: BTreeMap::new(),
            fixtures_dir: fixtures_dir.as_ref().to_path_buf(),
        }
    }

    /// Charge tous les *.json ; un fichier illisible est signalé puis ignoré
    pub fn load_all(&mut self) -> Result<usize> {
        if !self.fixtures_dir.exists() {
            log::warn!("Fixtures directory not found: {}", self.fixtures_dir.display());
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(&self.fixtures_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            match Self::load_packet(&path) {
                Ok(packet) => {
                    let name = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string();
                    log::info!("📜 Loaded packet fixture: {}", name);
                    self.packets.insert(name, packet);
                    count += 1;
                }
                Err(e) => {
                    log::warn!("⚠️ Failed to load fixture {}: {}", path.display(), e);
                }
            }
        }

        Ok(count)
    }

    fn load_packet(path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.packets.get(name)
    }

    /// Noms triés des fixtures chargées
    pub fn names(&self) -> Vec<&str> {
        self.packets.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmwatch_kernel::decoder::decode;
    use nmwatch_kernel::TelemetryError;
    use tempfile::TempDir;

    #[test]
    fn test_valid_packet_decodes() {
        let bytes = TelemetryPacketBuilder::valid("192.168.1.77")
            .hashrate("4.021M")
            .shares(1, 99)
            .to_bytes()
            .unwrap();

        let report = decode(&bytes).unwrap();
        assert_eq!(report.id.as_str(), "192.168.1.77");
        assert!((report.hashrate_normalized - 4021.0).abs() < 1e-9);
        assert_eq!(report.shares.accepted, 99);
        assert_eq!(report.shares.ratio.as_deref(), Some("99.0%"));
    }

    #[test]
    fn test_builder_covers_every_field() {
        let packet = TelemetryPacketBuilder::valid("10.0.0.1").build();
        for field in PACKET_FIELDS {
            assert!(packet.get(*field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn test_broken_packets_are_rejected() {
        let no_ip = TelemetryPacketBuilder::valid("10.0.0.1").without("IP").to_bytes().unwrap();
        assert!(matches!(decode(&no_ip), Err(TelemetryError::MissingField("IP"))));

        let wrong_type = TelemetryPacketBuilder::valid("10.0.0.1")
            .set_field("RSSI", Value::String("-60".into()))
            .to_bytes()
            .unwrap();
        assert!(matches!(decode(&wrong_type), Err(TelemetryError::MalformedPayload(_))));
    }

    #[test]
    fn test_fixture_loading() {
        let dir = TempDir::new().unwrap();
        let packet = TelemetryPacketBuilder::valid("192.168.1.30").build();
        std::fs::write(dir.path().join("nmlotto-idle.json"), packet.to_string()).unwrap();
        std::fs::write(dir.path().join("corrupt.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut fixtures = PacketFixtures::new(dir.path());
        assert_eq!(fixtures.load_all().unwrap(), 1);
        assert_eq!(fixtures.names(), vec!["nmlotto-idle"]);
        assert_eq!(fixtures.get("nmlotto-idle").unwrap()["IP"], "192.168.1.30");
    }

    #[test]
    fn test_missing_fixture_dir_is_empty() {
        let mut fixtures = PacketFixtures::new("/definitely/not/here");
        assert_eq!(fixtures.load_all().unwrap(), 0);
        assert!(fixtures.is_empty());
    }
}

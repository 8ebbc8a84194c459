/**
 * DÉCODEUR TÉLÉMÉTRIE - Datagramme UDP brut → DeviceReport validé
 *
 * RÔLE :
 * Schéma explicite du paquet NMMiner, règles de rejet claires.
 * Un paquet est accepté en entier ou rejeté en entier, jamais appliqué à moitié.
 *
 * RÈGLES :
 * - objet JSON obligatoire (tableau / scalaire → MalformedPayload)
 * - `IP` (ou `ip`, firmware historique) et `HashRate` obligatoires → MissingField
 * - `Share` : "rejetées/acceptées[/ratio%]", le ratio est gardé tel quel pour l'affichage
 * - champ présent avec un mauvais type → MalformedPayload
 * - `HashRate` passe par le normalizer → InvalidHashRate
 * - `Progress` ramené dans [0,1], clés inconnues ignorées
 */

use crate::error::{TelemetryError, TelemetryResult};
use crate::hashrate;
use crate::models::{DeviceId, DeviceReport, Shares};
use serde::Deserialize;

/// Schéma du paquet tel qu'il arrive sur le fil
#[derive(Debug, Deserialize)]
struct TelemetryPacket {
    #[serde(rename = "IP")]
    ip: Option<String>,
    /// Clé historique, `IP` l'emporte si les deux sont présentes
    #[serde(rename = "ip")]
    ip_legacy: Option<String>,
    #[serde(rename = "BoardType")]
    board_type: Option<String>,
    #[serde(rename = "HashRate")]
    hash_rate: Option<String>,
    #[serde(rename = "Share")]
    share: Option<String>,
    #[serde(rename = "NetDiff")]
    net_diff: Option<String>,
    #[serde(rename = "PoolDiff")]
    pool_diff: Option<String>,
    #[serde(rename = "LastDiff")]
    last_diff: Option<String>,
    #[serde(rename = "BestDiff")]
    best_diff: Option<String>,
    #[serde(rename = "Valid")]
    valid: Option<u64>,
    #[serde(rename = "Progress")]
    progress: Option<f64>,
    #[serde(rename = "Temp")]
    temp: Option<f64>,
    #[serde(rename = "RSSI")]
    rssi: Option<i32>,
    #[serde(rename = "FreeHeap")]
    free_heap: Option<f64>,
    #[serde(rename = "Uptime")]
    uptime: Option<String>,
    #[serde(rename = "Version")]
    version: Option<String>,
}

/// Décode un payload UDP. Fonction pure : même entrée, même sortie.
pub fn decode(payload: &[u8]) -> TelemetryResult<DeviceReport> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| TelemetryError::MalformedPayload(format!("invalid JSON: {e}")))?;

    if !value.is_object() {
        return Err(TelemetryError::MalformedPayload(
            "top-level value is not an object".into(),
        ));
    }

    // Un champ obligatoire explicitement à null reste un problème de type
    for key in ["IP", "ip", "HashRate"] {
        if value.get(key).is_some_and(|v| v.is_null()) {
            return Err(TelemetryError::MalformedPayload(format!("{key} is null")));
        }
    }

    let packet: TelemetryPacket = serde_json::from_value(value)
        .map_err(|e| TelemetryError::MalformedPayload(e.to_string()))?;

    let ip = packet
        .ip
        .or(packet.ip_legacy)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(TelemetryError::MissingField("IP"))?;

    let hashrate_raw = packet
        .hash_rate
        .ok_or(TelemetryError::MissingField("HashRate"))?;
    let hashrate_normalized = hashrate::normalize(&hashrate_raw)
        .ok_or_else(|| TelemetryError::InvalidHashRate(hashrate_raw.clone()))?;

    let shares = match packet.share.as_deref() {
        Some(raw) => parse_shares(raw)?,
        None => Shares::default(),
    };

    Ok(DeviceReport {
        id: DeviceId::new(ip),
        board_type: packet.board_type.unwrap_or_default(),
        hashrate_raw,
        hashrate_normalized,
        shares,
        net_diff: packet.net_diff.unwrap_or_default(),
        pool_diff: packet.pool_diff.unwrap_or_default(),
        last_diff: packet.last_diff.unwrap_or_default(),
        best_diff: packet.best_diff.unwrap_or_default(),
        valid_blocks: packet.valid.unwrap_or_default(),
        progress: packet.progress.unwrap_or_default().clamp(0.0, 1.0),
        temp: packet.temp.unwrap_or_default(),
        rssi: packet.rssi.unwrap_or_default(),
        free_heap_kb: packet.free_heap.unwrap_or_default(),
        uptime: packet.uptime.unwrap_or_default(),
        version: packet.version.unwrap_or_default(),
    })
}

/// "rejected/accepted" ou "rejected/accepted/ratio%"
fn parse_shares(raw: &str) -> TelemetryResult<Shares> {
    let mut parts = raw.split('/').map(str::trim);
    let (Some(rejected), Some(accepted)) = (parts.next(), parts.next()) else {
        return Err(TelemetryError::MalformedPayload(format!(
            "Share {raw:?} is not rejected/accepted"
        )));
    };

    let parse = |s: &str| {
        s.parse::<u64>().map_err(|_| {
            TelemetryError::MalformedPayload(format!("Share {raw:?} has a non-integer count"))
        })
    };

    let ratio = parts
        .next()
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok(Shares {
        rejected: parse(rejected)?,
        accepted: parse(accepted)?,
        ratio,
    })
}

/**
 * ERREURS TÉLÉMÉTRIE - Taxonomie unique des échecs d'ingestion
 *
 * RÔLE : Classer chaque paquet rejeté (payload, champ manquant, hashrate)
 * et chaque défaut socket, pour que le listener décide : on jette et on continue,
 * ou on arrête le process (bind impossible au démarrage).
 */

use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Pas du JSON, pas un objet, ou un champ présent avec le mauvais type
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid hash rate: {0:?}")]
    InvalidHashRate(String),
    /// Erreur de réception transitoire, le listener continue
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
    /// Seule erreur fatale : le port télémétrie n'a pas pu être ouvert
    #[error("failed to bind telemetry socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl TelemetryError {
    /// Nom court de la catégorie, utilisé pour les compteurs de health
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryError::MalformedPayload(_) => "malformed_payload",
            TelemetryError::MissingField(_) => "missing_field",
            TelemetryError::InvalidHashRate(_) => "invalid_hash_rate",
            TelemetryError::Socket(_) => "socket",
            TelemetryError::Bind { .. } => "bind",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TelemetryError::Bind { .. })
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

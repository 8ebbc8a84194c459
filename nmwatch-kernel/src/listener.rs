/**
 * UDP LISTENER - Réception des broadcasts télémétrie NMMiner
 *
 * RÔLE : Boucle de réception sur le port LAN, un datagramme = un decode + un upsert.
 *
 * FONCTIONNEMENT :
 * - bind au démarrage : échec = erreur fatale (TelemetryError::Bind)
 * - paquet invalide : compté, loggé en debug, jeté (le mineur re-broadcast)
 * - erreur de réception : comptée, warn, courte pause, la boucle continue
 * - pas de throttling : le volume est borné par la cadence des mineurs
 * - clé du registry = IP déclarée dans le payload, pas l'adresse source
 */

use crate::config::UdpConf;
use crate::decoder;
use crate::error::{TelemetryError, TelemetryResult};
use crate::health::HealthTracker;
use crate::registry::{SharedRegistry, UpsertOutcome};
use crate::state::ShutdownSignal;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SOCKET_ERROR_BACKOFF: Duration = Duration::from_millis(200);

pub struct TelemetryListener {
    socket: UdpSocket,
    registry: SharedRegistry,
    health: HealthTracker,
    recv_buffer_bytes: usize,
}

impl TelemetryListener {
    pub async fn bind(
        conf: &UdpConf,
        registry: SharedRegistry,
        health: HealthTracker,
    ) -> anyhow::Result<Self> {
        let addr = conf.socket_addr()?;
        let listener = Self::bind_addr(addr, registry, health).await?;
        Ok(listener.with_buffer(conf.recv_buffer_bytes))
    }

    pub async fn bind_addr(
        addr: SocketAddr,
        registry: SharedRegistry,
        health: HealthTracker,
    ) -> TelemetryResult<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(setup_failed(addr))?;
        // les mineurs peuvent émettre en broadcast, on accepte aussi d'en recevoir
        socket.set_broadcast(true).map_err(setup_failed(addr))?;

        info!("telemetry listener bound on udp://{}", socket.local_addr()?);
        Ok(Self {
            socket,
            registry,
            health,
            recv_buffer_bytes: UdpConf::default().recv_buffer_bytes,
        })
    }

    pub fn with_buffer(mut self, bytes: usize) -> Self {
        self.recv_buffer_bytes = bytes.max(512);
        self
    }

    pub fn local_addr(&self) -> TelemetryResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Boucle principale, rend la main quand l'arrêt est demandé
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let mut buf = vec![0u8; self.recv_buffer_bytes];

        loop {
            tokio::select! {
                _ = shutdown.triggered() => {
                    info!("telemetry listener stopping");
                    return;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => {
                        let _ = process_datagram(&self.registry, &self.health, &buf[..len], Some(source));
                    }
                    Err(e) => {
                        let err = TelemetryError::from(e);
                        self.health.record_error(&err);
                        warn!("telemetry receive failed: {err}");
                        tokio::time::sleep(SOCKET_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Toute erreur pendant la mise en place du socket empêche l'écoute : fatale
fn setup_failed(addr: SocketAddr) -> impl FnOnce(std::io::Error) -> TelemetryError {
    move |source| TelemetryError::Bind { addr, source }
}

/// Decode + upsert d'un datagramme. Sur erreur le registry n'est pas touché.
pub fn process_datagram(
    registry: &SharedRegistry,
    health: &HealthTracker,
    payload: &[u8],
    source: Option<SocketAddr>,
) -> TelemetryResult<UpsertOutcome> {
    health.record_received();

    let report = match decoder::decode(payload) {
        Ok(report) => report,
        Err(err) => {
            health.record_error(&err);
            debug!("dropping datagram from {}: {err}", describe(source));
            return Err(err);
        }
    };

    if let Some(src) = source {
        if report.id.as_str() != src.ip().to_string() {
            debug!("device {} reported from source address {}", report.id, src.ip());
        }
    }

    let id = report.id.clone();
    let outcome = registry.upsert(report);
    health.record_accepted();

    match outcome {
        UpsertOutcome::Inserted => info!("new device {id} online"),
        UpsertOutcome::Replaced => debug!("updated device {id}"),
    }
    Ok(outcome)
}

fn describe(source: Option<SocketAddr>) -> String {
    source.map(|s| s.to_string()).unwrap_or_else(|| "<unknown>".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceId;
    use crate::registry::DeviceRegistry;
    use crate::state::shutdown_channel;
    use serde_json::json;

    fn packet(ip: &str, hashrate: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "IP": ip,
            "BoardType": "NMLotto",
            "HashRate": hashrate,
            "Share": "0/12/100.0%",
            "Temp": 44.0,
            "RSSI": -58,
            "Version": "v0.3.01"
        }))
        .unwrap()
    }

    async fn wait_for_len(registry: &DeviceRegistry, expected: usize) {
        for _ in 0..100 {
            if registry.len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("registry never reached {expected} devices (has {})", registry.len());
    }

    #[test]
    fn test_invalid_datagram_leaves_registry_untouched() {
        let registry = DeviceRegistry::shared();
        let health = HealthTracker::new();

        let missing_ip = serde_json::to_vec(&json!({"HashRate": "10K"})).unwrap();
        assert!(matches!(
            process_datagram(&registry, &health, &missing_ip, None),
            Err(TelemetryError::MissingField("IP"))
        ));
        assert!(matches!(
            process_datagram(&registry, &health, &packet("10.0.0.1", "bad"), None),
            Err(TelemetryError::InvalidHashRate(_))
        ));
        assert!(registry.is_empty());

        let report = health.get_health(&registry);
        assert_eq!(report.datagrams_received, 2);
        assert_eq!(report.datagrams_accepted, 0);
    }

    #[test]
    fn test_failed_update_keeps_previous_record() {
        let registry = DeviceRegistry::shared();
        let health = HealthTracker::new();

        process_datagram(&registry, &health, &packet("10.0.0.1", "50K"), None).unwrap();
        let _ = process_datagram(&registry, &health, &packet("10.0.0.1", "bad"), None);

        let device = registry.get(&DeviceId::new("10.0.0.1")).unwrap();
        assert_eq!(device.report.hashrate_raw, "50K");
    }

    #[tokio::test]
    async fn test_listener_ingests_real_datagrams() {
        let registry = DeviceRegistry::shared();
        let health = HealthTracker::new();
        let listener = TelemetryListener::bind_addr(
            "127.0.0.1:0".parse().unwrap(),
            registry.clone(),
            health.clone(),
        )
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();

        let (trigger, signal) = shutdown_channel();
        let handle = listener.spawn(signal);

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"garbage", addr).await.unwrap();
        sender.send_to(&packet("192.168.1.10", "100K"), addr).await.unwrap();
        sender.send_to(&packet("192.168.1.11", "4M"), addr).await.unwrap();

        wait_for_len(&registry, 2).await;

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        let report = health.get_health(&registry);
        assert_eq!(report.datagrams_accepted, 2);
        assert_eq!(report.rejected_malformed, 1);
    }

    #[test]
    fn test_socket_setup_failure_is_fatal() {
        let addr: SocketAddr = "0.0.0.0:12345".parse().unwrap();
        let err = setup_failed(addr)(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(err.is_fatal());
        assert_eq!(err.kind(), "bind");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal_error() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let result =
            TelemetryListener::bind_addr(addr, DeviceRegistry::shared(), HealthTracker::new()).await;
        match result {
            Err(err) => assert!(err.is_fatal()),
            Ok(_) => panic!("second bind on {addr} should fail"),
        }
    }
}

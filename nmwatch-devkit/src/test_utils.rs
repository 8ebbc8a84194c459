/*!
Test Harness pour l'ingestion NMWatch

Facilite l'écriture de tests bout-en-bout avec:
- Un vrai listener UDP du kernel sur un port éphémère local
- Un émetteur de paquets branché dessus
- Des attentes bornées dans le temps sur le contenu du registry
*/

use crate::packet_helpers::TelemetryPacketBuilder;
use crate::udp_stub::TelemetrySender;
use anyhow::Result;
use nmwatch_kernel::health::{HealthTracker, KernelHealth};
use nmwatch_kernel::listener::TelemetryListener;
use nmwatch_kernel::state::{shutdown_channel, ShutdownTrigger};
use nmwatch_kernel::{Device, DeviceId, DeviceRegistry, FleetSnapshot, SharedRegistry};
use nmwatch_kernel::{SnapshotService, VersionOrder};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Harness de test complet : listener réel + émetteur
pub struct TestHarness {
    pub registry: SharedRegistry,
    pub health: HealthTracker,
    pub sender: TelemetrySender,
    snapshots: SnapshotService,
    listen_addr: SocketAddr,
    shutdown: ShutdownTrigger,
    listener_task: Option<JoinHandle<()>>,
}

impl TestHarness {
    /// Démarre un listener sur 127.0.0.1:0
    pub async fn start() -> Result<Self> {
        Self::start_with_order(VersionOrder::default()).await
    }

    pub async fn start_with_order(version_order: VersionOrder) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let registry = DeviceRegistry::shared();
        let health = HealthTracker::new();
        let listener =
            TelemetryListener::bind_addr("127.0.0.1:0".parse()?, registry.clone(), health.clone())
                .await?;
        let listen_addr = listener.local_addr()?;

        let (shutdown, signal) = shutdown_channel();
        let listener_task = listener.spawn(signal);
        let sender = TelemetrySender::new(listen_addr).await?;

        log::info!("🧪 Test harness listening on {}", listen_addr);
        Ok(Self {
            snapshots: SnapshotService::new(registry.clone(), version_order),
            registry,
            health,
            sender,
            listen_addr,
            shutdown,
            listener_task: Some(listener_task),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub async fn send_packet(&self, packet: &TelemetryPacketBuilder) -> Result<()> {
        self.sender.send_json(&packet.build()).await
    }

    pub async fn send_json(&self, packet: &Value) -> Result<()> {
        self.sender.send_json(packet).await
    }

    pub async fn send_raw<V: Into<Vec<u8>>>(&self, payload: V) -> Result<()> {
        self.sender.send_raw(payload).await
    }

    /// Attend qu'un device apparaisse, `None` au timeout
    pub async fn wait_for_device(&self, ip: &str, timeout_ms: u64) -> Option<Device> {
        let id = DeviceId::new(ip);
        let found = self
            .poll_until(timeout_ms, || self.registry.get(&id))
            .await;

        match &found {
            Some(_) => log::info!("✅ Device {} present in registry", ip),
            None => log::warn!("⏰ Timeout waiting for device {}", ip),
        }
        found
    }

    /// Attend qu'un device soit présent avec un champ vérifiant le prédicat
    pub async fn wait_for_update<F>(&self, ip: &str, timeout_ms: u64, predicate: F) -> Option<Device>
    where
        F: Fn(&Device) -> bool,
    {
        let id = DeviceId::new(ip);
        self.poll_until(timeout_ms, || self.registry.get(&id).filter(|d| predicate(d)))
            .await
    }

    /// Attend que N datagrammes aient été traités (acceptés ou rejetés)
    pub async fn wait_for_processed(&self, count: u64, timeout_ms: u64) -> Result<()> {
        let reached = self
            .poll_until(timeout_ms, || {
                let received = self.health.get_health(&self.registry).datagrams_received;
                (received >= count).then_some(())
            })
            .await;

        match reached {
            Some(()) => Ok(()),
            None => anyhow::bail!(
                "listener processed {} datagrams, expected {}",
                self.health.get_health(&self.registry).datagrams_received,
                count
            ),
        }
    }

    async fn poll_until<T, F>(&self, timeout_ms: u64, mut probe: F) -> Option<T>
    where
        F: FnMut() -> Option<T>,
    {
        let start = Instant::now();
        let limit = Duration::from_millis(timeout_ms);

        loop {
            if let Some(value) = probe() {
                return Some(value);
            }
            if start.elapsed() >= limit {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        self.snapshots.fleet_snapshot()
    }

    /// Assert sur un champ du device, sérialisé comme dans l'API
    pub fn assert_field_equals(&self, ip: &str, field: &str, expected: &Value) -> Result<()> {
        let Some(device) = self.registry.get(&DeviceId::new(ip)) else {
            anyhow::bail!("Device {} not in registry", ip);
        };

        let view = serde_json::to_value(&device)?;
        match view.get(field) {
            Some(actual) if actual == expected => {
                log::info!("✅ Field '{}' = {:?} on {}", field, expected, ip);
                Ok(())
            }
            Some(actual) => anyhow::bail!(
                "Field '{}' mismatch on {}: expected {:?}, got {:?}",
                field, ip, expected, actual
            ),
            None => anyhow::bail!("Field '{}' not found on device {}", field, ip),
        }
    }

    pub fn assert_device_count(&self, expected: usize) -> Result<()> {
        let actual = self.registry.len();
        if actual != expected {
            anyhow::bail!("expected {} devices, registry holds {}", expected, actual);
        }
        Ok(())
    }

    pub fn get_stats(&self) -> TestStats {
        TestStats {
            packets_sent: self.sender.get_sent_packets().len(),
            health: self.health.get_health(&self.registry),
        }
    }

    /// Arrête proprement le listener
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.trigger();
        if let Some(task) = self.listener_task.take() {
            tokio::time::timeout(Duration::from_secs(2), task).await??;
        }
        log::info!("🧹 Test harness stopped");
        Ok(())
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub packets_sent: usize,
    pub health: KernelHealth,
}

impl TestStats {
    pub fn print(&self) {
        println!("📊 Test Statistics:");
        println!("  Packets sent: {}", self.packets_sent);
        println!("  Datagrams received: {}", self.health.datagrams_received);
        println!("  Datagrams accepted: {}", self.health.datagrams_accepted);
        println!(
            "  Rejected: malformed={} missing_field={} invalid_hash_rate={}",
            self.health.rejected_malformed,
            self.health.rejected_missing_field,
            self.health.rejected_invalid_hash_rate
        );
        println!("  Devices tracked: {}", self.health.devices_tracked);
    }
}

/// Macro pour écrire un test d'ingestion avec harness démarré
#[macro_export]
macro_rules! telemetry_test {
    ($name:ident, |$harness:ident| $body:block) => {
        #[tokio::test]
        async fn $name() {
            let $harness = $crate::test_utils::TestHarness::start()
                .await
                .expect("test harness failed to start");

            let outcome: $crate::anyhow::Result<()> = async { $body }.await;
            match outcome {
                Ok(()) => {
                    $harness.get_stats().print();
                    println!("✅ Test '{}' passed", stringify!($name));
                }
                Err(e) => {
                    eprintln!("❌ Test '{}' failed: {}", stringify!($name), e);
                    panic!("Test failed: {}", e);
                }
            }
        }
    };
}

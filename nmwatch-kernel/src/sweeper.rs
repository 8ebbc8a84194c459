use crate::health::HealthTracker;
use crate::models::DeviceId;
use crate::registry::SharedRegistry;
use crate::state::ShutdownSignal;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Passe d'éviction unique : retire les devices silencieux depuis plus de `stale_after`
pub fn sweep_once(
    registry: &SharedRegistry,
    health: &HealthTracker,
    stale_after: Duration,
) -> Vec<DeviceId> {
    let evicted = registry.evict_older_than(stale_after);
    for id in &evicted {
        info!("device {id} offline for more than {:?}, evicted", stale_after);
    }
    if !evicted.is_empty() {
        health.record_evicted(evicted.len());
    }
    evicted
}

/// Lance le sweeper périodique (intervalle < seuil, typiquement seuil/2)
pub fn spawn_eviction_sweeper(
    registry: SharedRegistry,
    health: HealthTracker,
    stale_after: Duration,
    every: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    info!(
        "starting eviction sweeper (stale after {:?}, sweep every {:?})",
        stale_after, every
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.triggered() => {
                    info!("eviction sweeper stopping");
                    return;
                }
                _ = interval.tick() => {
                    sweep_once(&registry, &health, stale_after);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceReport, Shares};
    use crate::registry::DeviceRegistry;
    use crate::state::shutdown_channel;
    use time::OffsetDateTime;

    fn report(ip: &str) -> DeviceReport {
        DeviceReport {
            id: DeviceId::new(ip),
            board_type: "NMLotto".into(),
            hashrate_raw: "1K".into(),
            hashrate_normalized: 1.0,
            shares: Shares::default(),
            net_diff: String::new(),
            pool_diff: String::new(),
            last_diff: String::new(),
            best_diff: String::new(),
            valid_blocks: 0,
            progress: 0.0,
            temp: 0.0,
            rssi: 0,
            free_heap_kb: 0.0,
            uptime: String::new(),
            version: String::new(),
        }
    }

    #[test]
    fn test_sweep_once_counts_evictions() {
        let registry = DeviceRegistry::shared();
        let health = HealthTracker::new();
        let now = OffsetDateTime::now_utc();

        registry.upsert_at(report("10.0.0.1"), now - time::Duration::minutes(10));
        registry.upsert_at(report("10.0.0.2"), now);

        let evicted = sweep_once(&registry, &health, Duration::from_secs(60));
        assert_eq!(evicted, vec![DeviceId::new("10.0.0.1")]);
        assert_eq!(registry.len(), 1);
        assert_eq!(health.get_health(&registry).devices_evicted, 1);
    }

    #[tokio::test]
    async fn test_sweeper_task_evicts_and_stops() {
        let registry = DeviceRegistry::shared();
        let health = HealthTracker::new();
        registry.upsert_at(
            report("10.0.0.9"),
            OffsetDateTime::now_utc() - time::Duration::hours(1),
        );

        let (trigger, signal) = shutdown_channel();
        let handle = spawn_eviction_sweeper(
            registry.clone(),
            health,
            Duration::from_secs(30),
            Duration::from_millis(20),
            signal,
        );

        for _ in 0..100 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.is_empty());

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

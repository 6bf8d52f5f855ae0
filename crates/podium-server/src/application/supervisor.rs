//! Periodic maintenance tasks: probe, eviction, and expiry sweeps.
//!
//! Each sweep runs on its own independent timer so a slow eviction pass
//! never delays probing. All three tasks watch the shared `running` flag
//! and exit within one tick of it flipping to `false`, giving shutdown a
//! bounded tail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::application::engine::RelayEngine;

/// Spawns the three sweep loops and returns their handles (probe, eviction,
/// expiry order). The handles are only awaited during orderly shutdown.
pub fn spawn_supervisor(
    engine: Arc<RelayEngine>,
    probe_interval: Duration,
    eviction_interval: Duration,
    expiry_interval: Duration,
    running: Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_sweep("probe", probe_interval, running.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.probe_sweep().await }
            }
        }),
        spawn_sweep("eviction", eviction_interval, running.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.eviction_sweep().await }
            }
        }),
        spawn_sweep("expiry", expiry_interval, running, {
            move || {
                let engine = engine.clone();
                async move { engine.expiry_sweep().await }
            }
        }),
    ]
}

/// One sweep loop: sleep a full period, run the pass, repeat. The first
/// pass fires one full period after startup, never immediately.
fn spawn_sweep<F, Fut>(
    name: &'static str,
    period: Duration,
    running: Arc<AtomicBool>,
    mut pass: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick completes immediately

        debug!(sweep = name, period_secs = period.as_secs(), "sweep loop started");
        loop {
            ticker.tick().await;
            if !running.load(Ordering::Relaxed) {
                debug!(sweep = name, "sweep loop stopping");
                break;
            }
            pass().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::PeerTransport;
    use crate::domain::ServerConfig;
    use crate::infrastructure::transport::mock::RecordingTransport;
    use podium_core::{ClientMessage, ServerMessage};
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn test_probe_sweep_fires_on_its_interval() {
        let transport = Arc::new(RecordingTransport::new());
        let engine = Arc::new(RelayEngine::new(
            ServerConfig::default(),
            transport.clone() as Arc<dyn PeerTransport>,
        ));

        let display = Uuid::new_v4();
        engine.on_connect(display).await;
        engine
            .handle_message(
                display,
                ClientMessage::RegisterDisplay {
                    room_code: None,
                    device_name: None,
                },
            )
            .await;
        transport.clear();

        let running = Arc::new(AtomicBool::new(true));
        let handles = spawn_supervisor(
            engine,
            Duration::from_secs(30),
            Duration::from_secs(3600), // keep the other sweeps out of the way
            Duration::from_secs(3600),
            running.clone(),
        );

        tokio::time::sleep(Duration::from_secs(31)).await;
        let probes: Vec<_> = transport
            .sent_to(display)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Probe))
            .collect();
        assert_eq!(probes.len(), 1);

        running.store(false, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(31)).await;
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_stop_after_running_flag_clears() {
        let transport = Arc::new(RecordingTransport::new());
        let engine = Arc::new(RelayEngine::new(
            ServerConfig::default(),
            transport as Arc<dyn PeerTransport>,
        ));

        let running = Arc::new(AtomicBool::new(false)); // cleared before the first pass
        let handles = spawn_supervisor(
            engine,
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
            running,
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        for handle in handles {
            handle.await.unwrap();
        }
    }
}

//! # Example: self_healing
//!
//! A supervised worker whose first two steps fail. The service stays
//! `Running` while the worker is re-armed after a fixed delay each time.
//!
//! ## Flow
//! ```text
//! on_start() → started() → Running
//! step #1 → Fail("upstream unavailable") → on_stop() → sleep(200ms)
//! on_start()  (restarted after failure)
//! step #2 → Fail → on_stop() → sleep(200ms)
//! on_start()
//! step #3.. → Ok (ticks until shutdown)
//! restart()   → on_stop() → on_start() without leaving Running
//! shutdown_all → on_stop() → Terminated
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example self_healing
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use servicevisor::{Config, RegistryBuilder, Service, ServiceBuilder, StepError, Worker};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Poller {
    steps: AtomicU64,
    arms: AtomicU64,
}

#[async_trait]
impl Worker for Poller {
    async fn on_start(&self) -> anyhow::Result<()> {
        let n = self.arms.fetch_add(1, Ordering::Relaxed) + 1;
        info!(arm = n, "connecting to upstream");
        Ok(())
    }

    async fn step(&self, ctx: CancellationToken) -> Result<(), StepError> {
        let n = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
        if n <= 2 {
            return Err(StepError::fail(format!("upstream unavailable (step {n})")));
        }
        tokio::select! {
            _ = ctx.cancelled() => Err(StepError::Canceled),
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                info!(step = n, "polled upstream");
                Ok(())
            }
        }
    }

    async fn on_stop(&self) -> anyhow::Result<()> {
        info!("closing upstream connection");
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Fixed restart delay, short grace period.
    let cfg = Config {
        restart_delay: Duration::from_millis(200),
        grace: Duration::from_secs(2),
        ..Config::default()
    };
    let registry = RegistryBuilder::new(cfg.clone()).build();

    // 2. Supervised worker sharing the registry's telemetry.
    let poller = Arc::new(
        ServiceBuilder::new("poller")
            .config(cfg)
            .telemetry(registry.telemetry().clone())
            .supervised(Poller::default()),
    );
    poller.start().await?;
    registry.add_shutdown_hook(poller.clone()).await?;

    // 3. Let it heal, then ask for a manual restart.
    tokio::time::sleep(Duration::from_secs(1)).await;
    info!(state = %poller.state(), "requesting restart");
    poller.restart();
    tokio::time::sleep(Duration::from_millis(600)).await;

    // 4. Shut down (Ctrl-C also works while waiting).
    tokio::select! {
        res = registry.run_until_signal() => res?,
        _ = tokio::time::sleep(Duration::from_millis(500)) => registry.shutdown().await?,
    }
    info!(
        arms = poller.worker().arms.load(Ordering::Relaxed),
        state = %poller.state(),
        "done"
    );
    Ok(())
}

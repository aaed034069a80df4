//! # Example: queued_pipeline
//!
//! A producer feeds a bounded [`QueuedMessageService`] faster than it drains.
//! Two services run side by side:
//! - `orders` uses the blocking policy: producers wait for space.
//! - `metrics` uses the skip policy: overflow is dropped and counted.
//!
//! Every event is rendered by the `LogWriter` subscriber.
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example queued_pipeline --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use servicevisor::{
    Config, LogWriter, ProcessFn, RegistryBuilder, Service, ServiceBuilder, Subscribe,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config {
        queue_capacity: 4,
        grace: Duration::from_secs(3),
        ..Config::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let registry = RegistryBuilder::new(cfg.clone()).with_subscribers(subs).build();

    let slow = |label: &'static str| {
        ProcessFn::new(move |n: u32| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n % 7 == 0 {
                anyhow::bail!("{label} #{n} rejected by downstream");
            }
            Ok(())
        })
    };

    let orders = Arc::new(
        ServiceBuilder::new("orders")
            .config(cfg.clone())
            .telemetry(registry.telemetry().clone())
            .queued_messages(slow("order")),
    );
    let metrics = Arc::new(
        ServiceBuilder::new("metrics")
            .config(Config {
                skip_on_full: true,
                ..cfg
            })
            .telemetry(registry.telemetry().clone())
            .queued_messages(slow("sample")),
    );

    let services: [Arc<dyn Service>; 2] = [orders.clone(), metrics.clone()];
    for svc in services {
        svc.start().await?;
        registry.add_shutdown_hook(svc).await?;
    }

    for n in 1..=40 {
        orders.submit(n).await?;
        metrics.submit(n).await?;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!(orders = ?orders.stats(), metrics = ?metrics.stats(), "before shutdown");
    registry.shutdown().await?;
    Ok(())
}

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use futures::StreamExt;
use periodic::{PeriodicTask, TaskFn};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

static PROBES: AtomicU32 = AtomicU32::new(0);

// Pretend every third probe of the upstream service fails.
fn probe_upstream() -> Result<(), String> {
    let n = PROBES.fetch_add(1, Ordering::Relaxed) + 1;
    if n % 3 == 0 {
        return Err(format!("probe {n}: upstream did not answer"));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let (task, mut errors) = PeriodicTask::builder(Duration::from_millis(500))
        .name("health-check")
        .spawn(TaskFn(probe_upstream))
        .expect("period is positive");

    // Watch the results for a few seconds.
    let watch = async {
        while let Some(result) = errors.next().await {
            match result {
                Ok(()) => info!("upstream healthy"),
                Err(e) => warn!(error = %e, "upstream unhealthy"),
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(4), watch).await;

    // `stop` blocks until the loop has exited.
    tokio::task::spawn_blocking(move || task.stop())
        .await
        .expect("stop should not panic");
    info!(probes = PROBES.load(Ordering::Relaxed), "health check stopped");
}

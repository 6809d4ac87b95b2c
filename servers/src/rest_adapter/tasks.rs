use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lib_adapter::broker::LocalBroker;
use lib_adapter::configs::{load_model, AdapterModel};
use lib_adapter::endpoints::EndpointTypeResolver;
use lib_adapter::metrics::CountingMetricsCollector;
use lib_adapter::services::ServiceManager;
use tokio::sync::broadcast;
use tokio::time::interval;

/// Re-reads the model file and reconfigures the services when it changed.
pub async fn run_model_reload(
    path: PathBuf,
    period: Duration,
    mut current: AdapterModel,
    resolver: Arc<EndpointTypeResolver>,
    manager: Arc<ServiceManager>,
    mut shutdown: broadcast::Receiver<()>,
) {
    if period.is_zero() {
        log::info!("Model reloading is disabled.");
        return;
    }
    let mut check_interval = interval(period);
    // The first tick completes immediately.
    check_interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Model reload received shutdown signal.");
                break;
            }
            _ = check_interval.tick() => {
                let model = match load_model(&path, &resolver) {
                    Ok(model) => model,
                    Err(e) => {
                        log::warn!("Keeping the current services: {}", e);
                        continue;
                    }
                };
                if model == current {
                    continue;
                }
                if model.topic_retention != current.topic_retention {
                    log::warn!("Topic retention changes take effect after a restart.");
                }
                let report = manager.reconfigure(model.services.clone());
                log::info!(
                    "Reconfigured: started {:?}, kept {:?}, closed {:?}, failed {:?}",
                    report.started, report.kept, report.closed, report.failed
                );
                current = model;
            }
        }
    }
}

/// Removes topics nobody has updated for their retention time.
pub async fn run_topic_sweeper(broker: Arc<LocalBroker>, period: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut sweep_interval = interval(period.max(Duration::from_secs(1)));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Topic sweeper received shutdown signal.");
                break;
            }
            _ = sweep_interval.tick() => {
                let removed = broker.sweep_unused(tokio::time::Instant::now());
                if !removed.is_empty() {
                    log::info!("Removed {} unused topic(s): {:?}", removed.len(), removed);
                }
            }
        }
    }
}

/// Logs a metrics summary on every tick and once more at shutdown.
pub async fn run_metrics_reporter(
    collector: Arc<CountingMetricsCollector>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut report_interval = interval(period.max(Duration::from_secs(1)));
    report_interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log_summary(&collector);
                break;
            }
            _ = report_interval.tick() => log_summary(&collector),
        }
    }
}

fn log_summary(collector: &CountingMetricsCollector) {
    match serde_json::to_string(&collector.summary()) {
        Ok(summary) => log::info!("Metrics: {}", summary),
        Err(e) => log::warn!("Failed to serialise metrics: {}", e),
    }
}

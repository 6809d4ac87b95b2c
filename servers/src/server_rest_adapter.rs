use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;

use lib_adapter::broker::{LocalBroker, LocalBrokerOptions};
use lib_adapter::configs::load_model;
use lib_adapter::endpoints::EndpointTypeResolver;
use lib_adapter::loggers::setup_logging;
use lib_adapter::metrics::{CountingMetricsCollector, MetricsDispatcher};
use lib_adapter::retrieve::{ReqwestEndpointClient, ReqwestEndpointClientOptions};
use lib_adapter::services::{ServiceManager, ServiceSessionFactory, SessionContext};
use lib_adapter::topics::TopicLifecycleManager;

mod rest_adapter;
use rest_adapter::{config, tasks};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let (server_config, notes) = config::load_config();
    let settings = server_config.settings();
    setup_logging(&settings.log_dir, "server_rest_adapter", &settings.log_level)?;
    for note in &notes {
        note.log();
    }

    let resolver = Arc::new(EndpointTypeResolver::new()?);
    let model = load_model(&settings.model_path, &resolver)
        .with_context(|| format!("Cannot start without a valid model at {}", settings.model_path.display()))?;

    let broker = Arc::new(LocalBroker::with_options(LocalBrokerOptions {
        max_topics: settings.max_topics,
        ..LocalBrokerOptions::default()
    }));
    let collector = Arc::new(CountingMetricsCollector::new());
    let metrics = Arc::new(MetricsDispatcher::new().with(collector.clone()));
    let client = Arc::new(ReqwestEndpointClient::new(ReqwestEndpointClientOptions {
        timeout: settings.request_timeout,
        max_retries: settings.max_retries,
        ..ReqwestEndpointClientOptions::default()
    })?);

    let context = SessionContext {
        resolver: resolver.clone(),
        client,
        topics: TopicLifecycleManager::new(broker.clone(), metrics.clone()),
        gateway: broker.clone(),
        metrics,
        retention: model.topic_retention,
    };
    let manager = Arc::new(ServiceManager::new(ServiceSessionFactory::new(context)));

    let report = manager.reconfigure(model.services.clone());
    log::info!(
        "Started {} service(s); {} rejected",
        report.started.len(),
        report.failed.len()
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let reload_handle = tokio::spawn(tasks::run_model_reload(
        settings.model_path.clone(),
        settings.reload_interval,
        model,
        resolver,
        manager.clone(),
        shutdown_tx.subscribe(),
    ));
    let sweeper_handle = tokio::spawn(tasks::run_topic_sweeper(
        broker.clone(),
        settings.sweep_interval,
        shutdown_tx.subscribe(),
    ));
    let reporter_handle = tokio::spawn(tasks::run_metrics_reporter(
        collector,
        settings.metrics_interval,
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(reload_handle, sweeper_handle, reporter_handle);

    manager.close();
    broker.close();

    log::info!("Shutdown complete.");
    Ok(())
}

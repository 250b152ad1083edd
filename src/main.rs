use anyhow::{Context, Result};
use mqtt_orchestrator::config::Config;
use mqtt_orchestrator::handler::{MessageHandler, TransformStage};
use mqtt_orchestrator::mqtt::SubscriptionManager;
use mqtt_orchestrator::storage::MongoSink;
use std::sync::Arc;

fn init_tracing(config: &Config) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,mqtt_orchestrator=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    if let Some(endpoint) = &config.otlp_endpoint {
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(traces_endpoint(endpoint));
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "mqtt-orchestrator"),
            ])))
            .install_batch(Tokio)?;

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Config is loaded before the real subscriber exists, since the OTLP endpoint
/// comes from it. A plain fmt subscriber covers that window so setup-file and
/// credential warnings still reach stderr.
fn with_startup_logging<T>(f: impl FnOnce() -> T) -> T {
    let subscriber = tracing_subscriber::fmt().with_target(true).finish();
    tracing::subscriber::with_default(subscriber, f)
}

fn traces_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.contains("/v1/traces") {
        return trimmed.to_string();
    }
    format!("{}/v1/traces", trimmed.trim_end_matches('/'))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = with_startup_logging(Config::from_env)?;
    init_tracing(&config)?;

    let sink = MongoSink::connect(
        &config.mongo_uri()?,
        &config.mongo_database,
        &config.mongo_collection,
        config.mongo_connect_timeout(),
        config.mongo_insert_timeout(),
    )
    .await?;
    let transform =
        TransformStage::from_config(&config).context("failed to build transform client")?;
    let handler = MessageHandler::new(Arc::new(sink), transform);

    let subscriptions = SubscriptionManager::connect(&config).await?;

    tokio::select! {
        res = subscriptions.run(handler) => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

//! Streaming TTS proxy entry point

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use tts_proxy_config::{load_settings, Settings};
use tts_proxy_pipeline::SynthesisEngine;
use tts_proxy_server::{create_router, init_metrics, AppState};
use tts_proxy_transport::TcpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("TTS_PROXY_ENV").ok();
    let settings = load_settings(env.as_deref()).context("Failed to load configuration")?;

    init_tracing(&settings);

    tracing::info!("Starting TTS proxy v{}", env!("CARGO_PKG_VERSION"));

    if settings.observability.metrics_enabled {
        init_metrics().context("Failed to install Prometheus recorder")?;
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let engine = SynthesisEngine::new(Arc::new(TcpTransport::new()), &settings)?;
    for backend in engine.registry().snapshot() {
        tracing::info!(
            role = %backend.role,
            address = %backend.address,
            voice_override = ?backend.voice_override,
            "Configured TTS backend"
        );
    }
    engine.refresh_backends().await;

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(AppState::new(settings, engine));

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    opentelemetry::global::shutdown_tracer_provider();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Console logging, plus OTLP export when `observability.tracing_enabled`
/// and an endpoint are both set
fn init_tracing(config: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!(
            "tts_proxy_server={level},tts_proxy_pipeline={level},tts_proxy_transport={level},tts_proxy_config={level},tower_http=info"
        )
        .into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &config.observability.otlp_endpoint {
        if config.observability.tracing_enabled {
            match opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(otlp_endpoint),
                )
                .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(
                    opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "tts-proxy"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
            {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

                    subscriber.with(fmt_layer).with(otel_layer).init();

                    tracing::info!(
                        endpoint = %otlp_endpoint,
                        "OpenTelemetry tracing enabled, exporting to OTLP endpoint"
                    );
                    return;
                }
                Err(e) => {
                    eprintln!(
                        "Failed to initialize OpenTelemetry: {}. Falling back to console logging.",
                        e
                    );
                }
            }
        }
    }

    subscriber.with(fmt_layer).init();
}

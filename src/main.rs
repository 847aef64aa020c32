/// Audio sentry service binary
///
/// Wires the capture pipeline to the status server: audio source ->
/// ring buffer -> gated classifier -> rule engine -> alerts, with the
/// HTTP control plane served alongside.

use audio_sentry::{
    AlertDispatcher, CaptureLoop, CsvLogSink, EnergyClassifier, LogSink, NoopNotifier, Notifier,
    RuleEngine, SentryConfig, SentryEngine, WebhookNotifier, server, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("audio_sentry=info".parse().unwrap()),
        )
        .init();

    info!("Starting Audio Sentry v{}", VERSION);

    // Load configuration (fatal on any validation failure)
    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Analysis window: {} chunks of {:.0}ms, volume gate {}, confidence gate {}",
        config.audio.ring_chunks,
        config.chunk_duration_secs() * 1000.0,
        config.detection.volume_gate,
        config.detection.confidence_gate
    );

    // Alert routing
    let notifier: Arc<dyn Notifier> = match &config.alerts.webhook_url {
        Some(url) => {
            info!("Alert notifications via webhook");
            Arc::new(WebhookNotifier::new(url))
        }
        None => {
            info!("No webhook configured, alerts are log-only");
            Arc::new(NoopNotifier)
        }
    };
    let log_sink: Arc<dyn LogSink> = Arc::new(CsvLogSink::new(&config.alerts.log_path));
    let dispatcher = AlertDispatcher::new(
        notifier,
        log_sink,
        Duration::from_secs(config.alerts.throttle_secs),
    );

    // Rule engine + shared state
    let rules = RuleEngine::new(&config.rules.immediate_keywords, &config.rules.sequences);
    let engine = Arc::new(SentryEngine::new(
        rules,
        dispatcher,
        config.history.capacity,
        config.history.clear_on_reset,
    ));

    // Capture pipeline
    let classifier = Arc::new(EnergyClassifier::new());
    let capture = CaptureLoop::new(
        config.audio.ring_chunks,
        &config.detection,
        classifier,
        engine.clone(),
    );

    let shutdown = CancellationToken::new();

    let capture_task = match spawn_capture(capture, &config, shutdown.clone()) {
        Ok(task) => task,
        Err(e) => {
            error!("Failed to open audio source: {}", e);
            std::process::exit(1);
        }
    };

    // Status server
    let listener = match tokio::net::TcpListener::bind(&config.server.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.server.bind_addr, e);
            std::process::exit(1);
        }
    };
    let server_task = tokio::spawn(server::serve(listener, engine.clone(), shutdown.clone()));

    info!("Audio Sentry running");

    // Cooperative shutdown on Ctrl+C
    tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
    info!("Shutdown requested");
    shutdown.cancel();

    if let Err(e) = capture_task.await {
        error!("Capture task error: {}", e);
    }
    match server_task.await {
        Ok(Err(e)) => error!("Status server error: {}", e),
        Err(e) => error!("Server task error: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Audio Sentry stopped");
}

/// Load configuration from the file named by AUDIO_SENTRY_CONFIG, falling
/// back to built-in defaults
fn load_config() -> Result<SentryConfig, anyhow::Error> {
    match std::env::var("AUDIO_SENTRY_CONFIG") {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            Ok(SentryConfig::load(&path)?)
        }
        Err(_) => {
            let config = SentryConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Live microphone capture
#[cfg(feature = "capture")]
fn spawn_capture(
    capture: CaptureLoop,
    config: &SentryConfig,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, anyhow::Error> {
    let source = audio_sentry::source::MicSource::open(
        config.audio.sample_rate,
        config.audio.chunk_samples,
    )?;
    Ok(tokio::spawn(capture.run(source, shutdown)))
}

/// Headless build: replay the WAV file named by AUDIO_SENTRY_WAV
#[cfg(not(feature = "capture"))]
fn spawn_capture(
    capture: CaptureLoop,
    config: &SentryConfig,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, anyhow::Error> {
    let path = std::env::var("AUDIO_SENTRY_WAV").map_err(|_| {
        anyhow::anyhow!(
            "built without the capture feature; set AUDIO_SENTRY_WAV to a replay file"
        )
    })?;
    let source = audio_sentry::WavSource::open(&path, config.audio.chunk_samples)?;
    Ok(tokio::spawn(capture.run(source, shutdown)))
}

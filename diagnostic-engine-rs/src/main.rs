// diagnostic-engine-rs/src/main.rs
//
// `diagnose`: runs one diagnosis locally.
//
// Reads a failure event as JSON from the file given as the first argument,
// or from stdin, and prints the diagnostic result as JSON (`null` when the
// message is not a failure notification).
//
// Configuration (.env file), on top of the engine settings:
// - DIAG_ANALYSIS_ENABLED: call the analysis model (default: on when an llm credential is set)
// - DIAG_TASK_LOG_SCOPE: credential scope sent as bearer token when fetching task logs

use std::io::{Read, Write};
use std::sync::Arc;

use diagnostic_engine::{
    DiagnosticOrchestrator, EngineConfig, EnvCredentialProvider, FailureEvent, HttpLogProbe, LlmClient, LlmConfig,
    ProbeKind, ProbeRegistry,
};
use error_handling::{log_structured_error, Error, ErrorKind};
use telemetrist::{MetricsSink, NoopSink, Telemetrist, TelemetristConfig};
use tracing::{info, warn};

fn read_event() -> Result<FailureEvent, Box<dyn std::error::Error>> {
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config_rs::load_env();
    error_handling::init("diagnose")?;

    let config = EngineConfig::from_env();
    config.validate()?;

    let event = read_event()?;

    let mut log_probe = HttpLogProbe::new(config.probe_timeout)?;
    if let Some(scope) = config_rs::get_env_string("DIAG_TASK_LOG_SCOPE") {
        log_probe = log_probe.with_credential_scope(scope);
    }
    let registry = ProbeRegistry::new().with(ProbeKind::TaskLogs, Arc::new(log_probe));

    let telemetry_config = TelemetristConfig::from_env();
    let metrics: Arc<dyn MetricsSink> = if telemetry_config.enabled {
        match Telemetrist::new(telemetry_config) {
            Ok(telemetrist) => Arc::new(telemetrist),
            Err(e) => {
                warn!(error = %e, "Metrics publisher unavailable, discarding metrics");
                Arc::new(NoopSink)
            }
        }
    } else {
        Arc::new(NoopSink)
    };

    let credentials = EnvCredentialProvider::new();
    let analysis_enabled = config_rs::get_env_bool("DIAG_ANALYSIS_ENABLED", credentials.is_available("llm"));

    let mut builder = DiagnosticOrchestrator::builder()
        .config(config)
        .registry(registry)
        .credentials(Arc::new(credentials))
        .metrics(Arc::clone(&metrics));
    if analysis_enabled {
        builder = builder.analysis(Arc::new(LlmClient::new(LlmConfig::from_env())?));
    }
    let orchestrator = builder.build()?;

    info!(channel = %event.channel, analysis_enabled, "Diagnosing failure event");
    let result = orchestrator.diagnose(&event).await;

    let rendered = serde_json::to_string_pretty(&result)?;
    let delivered = writeln!(std::io::stdout().lock(), "{}", rendered);
    metrics.flush().await;

    // The diagnosis itself succeeded; only its delivery failed
    if let Err(e) = delivered {
        let mut error = Error::new(ErrorKind::TransportFailure, format!("Failed to write diagnostic result: {}", e))
            .service("diagnose");
        if let Some(result) = &result {
            error = error.correlation_id(result.diagnosis_id.as_str());
        }
        log_structured_error(&error);
        return Err(error.into());
    }

    Ok(())
}

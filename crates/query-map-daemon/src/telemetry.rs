use std::env;

use anyhow::{Context, Result};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    resource::Resource,
    runtime::Tokio,
    trace::{self, Sampler},
};
use tracing::{info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type Registry = tracing_subscriber::registry::Registry;

/// Fraction of traces exported over OTLP. Unset or `0` disables the exporter.
pub const SAMPLING_RATE_ENV: &str = "QUERY_MAP_OTEL_SAMPLING_RATE";

/// Flushes the OTLP pipeline on drop when one was installed.
#[derive(Debug)]
pub struct TelemetryGuard {
    tracer_installed: bool,
}

impl TelemetryGuard {
    pub fn exporting(&self) -> bool {
        self.tracer_installed
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.tracer_installed {
            global::shutdown_tracer_provider();
        }
    }
}

/// Installs the global subscriber: `RUST_LOG` filtering (default `info`),
/// console output and, for a positive sampling rate, an OTLP trace layer.
/// Exporter failures downgrade to console-only logging.
pub fn init(service_name: &str) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (sampling_rate, sampling_warning) =
        parse_sampling_rate(env::var(SAMPLING_RATE_ENV).ok().as_deref());

    let (otel_layer, otel_error) = match build_otel_layer(service_name, sampling_rate) {
        Ok(layer) => (layer, None),
        Err(error) => (None, Some(error)),
    };
    let guard = TelemetryGuard {
        tracer_installed: otel_layer.is_some(),
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(message) = sampling_warning {
        warn!("{message}");
    }
    if let Some(error) = otel_error {
        warn!(%error, "failed to initialize OTLP exporter; continuing with console logs only");
    }

    info!(
        service = service_name,
        sampling_rate,
        otlp = guard.exporting(),
        "telemetry configured"
    );
    Ok(guard)
}

fn build_otel_layer(
    service_name: &str,
    sampling_rate: f64,
) -> Result<Option<OpenTelemetryLayer<Registry, trace::Tracer>>> {
    if sampling_rate <= 0.0 {
        return Ok(None);
    }

    global::set_text_map_propagator(TraceContextPropagator::new());

    let exporter = opentelemetry_otlp::new_exporter().tonic();
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            trace::Config::default()
                .with_sampler(Sampler::TraceIdRatioBased(sampling_rate))
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .with_exporter(exporter)
        .install_batch(Tokio)
        .context("installing OTLP trace pipeline")?;

    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
}

/// Parses the sampling rate, returning the effective rate and a warning to log
/// once the subscriber is up.
pub fn parse_sampling_rate(raw: Option<&str>) -> (f64, Option<String>) {
    let Some(value) = raw.map(str::trim) else {
        return (0.0, None);
    };
    if value.is_empty() {
        return (
            0.0,
            Some(format!("{SAMPLING_RATE_ENV} is empty; trace export disabled")),
        );
    }

    match value.parse::<f64>() {
        Ok(rate) if (0.0..=1.0).contains(&rate) => (rate, None),
        Ok(rate) if !rate.is_nan() => {
            let clamped = rate.clamp(0.0, 1.0);
            (
                clamped,
                Some(format!(
                    "{SAMPLING_RATE_ENV}={value} outside 0.0..=1.0; clamped to {clamped}"
                )),
            )
        }
        _ => (
            0.0,
            Some(format!(
                "{SAMPLING_RATE_ENV}='{value}' is not a valid rate; trace export disabled"
            )),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_sampling_rate;

    #[test]
    fn unset_rate_disables_export() {
        assert_eq!(parse_sampling_rate(None), (0.0, None));
    }

    #[test]
    fn valid_rates_pass_through() {
        assert_eq!(parse_sampling_rate(Some("0.25")), (0.25, None));
        assert_eq!(parse_sampling_rate(Some(" 1 ")), (1.0, None));
    }

    #[test]
    fn out_of_range_rates_are_clamped() {
        let (rate, warning) = parse_sampling_rate(Some("1.5"));
        assert_eq!(rate, 1.0);
        assert!(warning
            .unwrap()
            .contains("QUERY_MAP_OTEL_SAMPLING_RATE=1.5 outside 0.0..=1.0"));

        let (rate, _) = parse_sampling_rate(Some("-2"));
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn garbage_rates_disable_export() {
        for raw in ["abc", "NaN", "   "] {
            let (rate, warning) = parse_sampling_rate(Some(raw));
            assert_eq!(rate, 0.0, "{raw}");
            assert!(warning.is_some(), "{raw}");
        }
    }
}

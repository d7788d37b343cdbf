use crate::app_env;
use anyhow::Context;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_http::HeaderExtractor;
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::Tracer;
use opentelemetry_sdk::{Resource, runtime};
use std::env;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing::{Span, debug, debug_span, field};
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer, OpenTelemetrySpanExt};
use tracing_subscriber::{EnvFilter, prelude::*, registry};

const SERVICE_NAME: &str = "todo-web";

/// Where spans and metrics go when OpenTelemetry export is turned on
#[derive(Debug, PartialEq, Eq)]
pub struct OtelEndpoints {
    pub spans: String,
    pub metrics: String,
}

impl OtelEndpoints {
    /// Export is only turned on when both [app_env::OTEL_SPAN_EXPORT_URL] and
    /// [app_env::OTEL_METRIC_EXPORT_URL] are set
    pub fn from_env() -> Option<OtelEndpoints> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<OtelEndpoints> {
        let spans = lookup(app_env::OTEL_SPAN_EXPORT_URL).filter(|url| !url.is_empty())?;
        let metrics = lookup(app_env::OTEL_METRIC_EXPORT_URL).filter(|url| !url.is_empty())?;

        Some(OtelEndpoints { spans, metrics })
    }
}

pub struct OtelExporters {
    pub tracer: Tracer,
    pub meter: SdkMeterProvider,
}

fn request_span(request: &Request<Body>) -> Span {
    let span = debug_span!(
        "request",
        method = request.method().as_str(),
        path = request.uri().path(),
        response_status = field::Empty,
        user_id = field::Empty,
    );
    let caller_context = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    });
    span.set_parent(caller_context);

    span
}

fn record_response(response: &Response<Body>, latency: Duration, span: &Span) {
    span.record("response_status", field::display(response.status()));
    debug!(latency_ms = latency.as_millis() as u64, "Finished handling request");
}

/// Wraps [router] so every request runs inside a "request" span. The span continues the caller's
/// W3C trace and gets its `user_id` filled in by the authentication gate.
pub fn attach_tracing_http<T>(router: Router<T>) -> Router<T>
where
    T: Clone + Send + Sync + 'static,
{
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(request_span)
            .on_response(record_response),
    )
}

/// Starts the background OTLP (gRPC) exporters for spans and metrics
pub fn init_exporters(endpoints: &OtelEndpoints) -> Result<OtelExporters, anyhow::Error> {
    let service_resource = || Resource::new([KeyValue::new("service.name", SERVICE_NAME)]);

    let span_exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoints.spans)
        .build()
        .with_context(|| format!("building the span exporter for {}", endpoints.spans))?;
    let tracer = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(span_exporter, runtime::Tokio)
        .with_resource(service_resource())
        .build()
        .tracer(SERVICE_NAME);

    let metric_exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoints.metrics)
        .build()
        .with_context(|| format!("building the metric exporter for {}", endpoints.metrics))?;
    let meter = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(metric_exporter, runtime::Tokio).build())
        .with_resource(service_resource())
        .build();

    Ok(OtelExporters { tracer, meter })
}

/// Log filter read from [app_env::LOG_LEVEL], "info" when unset
pub fn init_env_filter() -> Result<EnvFilter, anyhow::Error> {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(app_env::LOG_LEVEL)
        .from_env()
        .with_context(|| format!("{} is not a valid log filter", app_env::LOG_LEVEL))
}

/// Installs the global subscriber. Stdout gets JSON logs filtered by [env_filter]; the OTLP
/// layers, when present, receive everything from "debug" up.
pub fn setup_logging_and_tracing(
    env_filter: EnvFilter,
    otel_exporters: Option<OtelExporters>,
) -> Result<(), anyhow::Error> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let (trace_layer, metrics_layer) = match otel_exporters {
        Some(OtelExporters { tracer, meter }) => (
            Some(OpenTelemetryLayer::new(tracer)),
            Some(MetricsLayer::new(meter)),
        ),
        None => (None, None),
    };

    registry()
        .with(LevelFilter::DEBUG)
        .with(trace_layer)
        .with(metrics_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_filter(env_filter),
        )
        .try_init()
        .context("a global tracing subscriber was already installed")
}

//! Logging and optional OTLP trace export.

use anyhow::{Context, Result};
use base64ct::{Base64, Encoding};
use once_cell::sync::OnceCell;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Compression, SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
};
use std::{env::var, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Where and how spans are exported, taken from the standard `OTEL_*` variables.
#[derive(Debug, PartialEq, Eq)]
struct OtlpSettings {
    endpoint: String,
    headers: Vec<(String, String)>,
    instance_id: String,
}

impl OtlpSettings {
    /// `None` unless `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
    fn from_env() -> Option<Self> {
        if let Ok(protocol) = var("OTEL_EXPORTER_OTLP_PROTOCOL")
            && protocol != "grpc"
        {
            debug!("OTEL_EXPORTER_OTLP_PROTOCOL={protocol} ignored, exporting over gRPC");
        }

        let endpoint = var(ENDPOINT_VAR).ok()?;
        Some(Self::new(
            &endpoint,
            var("OTEL_EXPORTER_OTLP_HEADERS").ok().as_deref(),
            var("OTEL_SERVICE_INSTANCE_ID").ok(),
        ))
    }

    fn new(endpoint: &str, headers: Option<&str>, instance_id: Option<String>) -> Self {
        let endpoint = endpoint.trim().trim_end_matches('/');
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };

        // `k1=v1,k2=v2`; entries without `=` are dropped.
        let headers = headers
            .unwrap_or_default()
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        Self {
            endpoint,
            headers,
            instance_id: instance_id.unwrap_or_else(|| Ulid::new().to_string()),
        }
    }

    fn tls_domain(&self) -> Option<&str> {
        let authority = self.endpoint.strip_prefix("https://")?.split('/').next()?;
        authority.split(':').next().filter(|host| !host.is_empty())
    }

    /// gRPC metadata for the exporter; `-bin` keys carry base64 values.
    fn metadata(&self) -> Result<MetadataMap> {
        let mut metadata = MetadataMap::with_capacity(self.headers.len());
        for (key, value) in &self.headers {
            if key.ends_with("-bin") {
                let bytes = Base64::decode_vec(value)
                    .map_err(|err| anyhow::anyhow!("header {key}: invalid base64: {err}"))?;
                let key = MetadataKey::<Binary>::from_bytes(key.as_bytes())
                    .with_context(|| format!("invalid binary header name {key}"))?;
                metadata.insert_bin(key, MetadataValue::from_bytes(&bytes));
            } else {
                let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                    .with_context(|| format!("invalid header name {key}"))?;
                let value = value
                    .parse::<MetadataValue<Ascii>>()
                    .with_context(|| format!("invalid value for header {key}"))?;
                metadata.insert(name, value);
            }
        }
        Ok(metadata)
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes([
                KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                KeyValue::new("service.instance.id", self.instance_id.clone()),
            ])
            .build()
    }

    fn exporter(&self) -> Result<SpanExporter> {
        let mut builder = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&self.endpoint)
            .with_compression(Compression::Gzip)
            .with_timeout(EXPORT_TIMEOUT);

        if let Some(domain) = self.tls_domain() {
            builder = builder.with_tls_config(
                ClientTlsConfig::new()
                    .domain_name(domain.to_string())
                    .with_native_roots(),
            );
        }
        if !self.headers.is_empty() {
            builder = builder.with_metadata(self.metadata()?);
        }

        builder.build().context("failed to build OTLP span exporter")
    }
}

fn install_tracer(settings: &OtlpSettings) -> Result<Tracer> {
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(settings.exporter()?)
        .with_resource(settings.resource())
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    debug!(endpoint = %settings.endpoint, "exporting traces over OTLP");
    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Install the global subscriber.
///
/// Spans are also exported over OTLP/gRPC when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// # Errors
/// Returns an error if the exporter cannot be built or a subscriber is already set.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.unwrap_or(Level::ERROR).into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    let otel_layer = match OtlpSettings::from_env() {
        Some(settings) => {
            Some(tracing_opentelemetry::layer().with_tracer(install_tracer(&settings)?))
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(fmt::layer().with_target(false))
        .with(otel_layer)
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush pending spans; does nothing when tracing export is off.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        let _ = provider.shutdown();
    }
}

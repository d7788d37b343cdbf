/// URL for accessing the PostgreSQL database (should contain a database name in the path)
pub const DB_URL: &str = "DATABASE_URL";
/// Log level configuration for the application. For formatting info, see [tracing_subscriber's EnvFilter docs](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html)
pub const LOG_LEVEL: &str = "LOG_LEVEL";
/// Address and port the HTTP server binds to. Defaults to 0.0.0.0:3000
pub const LISTEN_ADDR: &str = "LISTEN_ADDR";
/// Server-side secret used to sign session cookies. Must be at least 32 bytes long.
pub const SESSION_SECRET: &str = "SESSION_SECRET";
/// When "true", session cookies are marked `Secure` and only sent over HTTPS
pub const SESSION_COOKIE_SECURE: &str = "SESSION_COOKIE_SECURE";

/// OpenTelemetry span export URL. Should be http://localhost:4317 by default, as the service should
/// have an OpenTelemetry collector sidecar which directs metrics to the correct place
pub const OTEL_SPAN_EXPORT_URL: &str = "OTEL_SPAN_EXPORT_URL";
/// OpenTelemetry metrics export URL. Should be http://localhost:4317 by default, as the service should
/// have an OpenTelemetry collector sidecar which directs metrics to the correct place
pub const OTEL_METRIC_EXPORT_URL: &str = "OTEL_METRIC_EXPORT_URL";

pub mod test {
    /// URL for accessing the PostgreSQL database during integration tests (should not contain a database name in the path)
    pub const TEST_DB_URL: &str = "TEST_DB_URL";
}

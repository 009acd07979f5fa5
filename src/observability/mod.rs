//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline, auth, cache
//!     → tracing events inside an `api_request` span (request_id, method, url)
//!     → metrics.rs (counters, histograms via the metrics facade)
//!
//! Consumers:
//!     → logging.rs subscriber (pretty or JSON on stderr)
//!     → whatever recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line and is sent as X-Request-ID
//! - Metrics are cheap; the library never installs an exporter

pub mod logging;
pub mod metrics;

pub use logging::init_logging;

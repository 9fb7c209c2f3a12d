//! crownscope-server: HTTP surface for the tree crown analyzer

pub mod error;
pub mod http;
pub mod metrics;

pub use error::ApiError;
pub use http::{create_router, ApiState};
pub use metrics::ServiceMetrics;

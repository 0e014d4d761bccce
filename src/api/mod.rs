//! REST API access: transport, envelope, errors and endpoint wrappers

pub mod client;
pub mod envelope;
pub mod error;
pub mod http;
pub mod transport;

pub use client::{ApiClient, ApiResult};
pub use envelope::ApiResponse;
pub use error::{ApiError, AuthFailure, ClientError, ErrorInfo};
pub use http::HttpTransport;
pub use transport::{ApiRequest, Method, MultipartUpload, ProgressFn, RawResponse, Transport, TransportError};

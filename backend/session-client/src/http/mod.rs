/// Outbound HTTP: the transport seam and the authenticated request pipeline
pub mod pipeline;
pub mod transport;

pub use pipeline::{RequestContext, RequestPipeline};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

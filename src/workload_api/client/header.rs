use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Metadata key the agent requires on every Workload API call.
pub const SPIFFE_HEADER_KEY: &str = "workload.spiffe.io";

/// Value of [`SPIFFE_HEADER_KEY`].
pub const SPIFFE_HEADER_VALUE: &str = "true";

/// Adds `workload.spiffe.io: true` to every outgoing request.
///
/// Agents reject calls without it, which keeps browsers and other
/// unintended clients from reaching the Workload API.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataAdder;

impl Interceptor for MetadataAdder {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request.metadata_mut().insert(
            AsciiMetadataKey::from_static(SPIFFE_HEADER_KEY),
            AsciiMetadataValue::from_static(SPIFFE_HEADER_VALUE),
        );
        Ok(request)
    }
}

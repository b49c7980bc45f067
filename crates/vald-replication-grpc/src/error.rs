//! Error types for the gRPC recovery client.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrpcError {
    /// The member address does not form a valid URI.
    #[error("Invalid endpoint {uri}: {source}")]
    InvalidEndpoint {
        uri: String,
        #[source]
        source: tonic::transport::Error,
    },

    /// The channel could not be made ready for a request.
    #[error("Channel to {address} not ready: {source}")]
    NotReady {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    /// The agent answered with a non-OK status.
    #[error("Recover call to {address} failed: {status}")]
    Status {
        address: String,
        #[source]
        status: tonic::Status,
    },
}

pub type Result<T> = std::result::Result<T, GrpcError>;

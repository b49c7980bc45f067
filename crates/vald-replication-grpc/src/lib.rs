//! gRPC recovery client for the Vald replication controller.
//!
//! [`GrpcRecoveryClient`] calls `replication_manager.Replication/Recover` on
//! the agent at a member's address. Messages are declared by hand with
//! `prost` derives; there is no build-time code generation.

mod client;
mod error;
pub mod proto;

pub use client::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT, GrpcRecoveryClient,
};
pub use error::{GrpcError, Result};

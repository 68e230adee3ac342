//! NETCONF session protocol engine.
//!
//! The transport layer hands each session one decoded XML message at a time
//! and sends the returned reply strings back verbatim; everything between
//! those two points (envelope validation, dispatch, lock arbitration,
//! response filtering, error mapping) lives in this crate.

pub mod error;
pub mod filter;
pub mod lock;
pub mod server;
pub mod session;
pub mod xpath;

pub use error::{RpcError, SessionError};
pub use lock::{LockTable, Target};
pub use server::{HandlerRegistry, RpcContext, RpcHandler, Server};
pub use session::Session;

/// Namespace of NETCONF base-protocol XML documents.
pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
/// Capability URI for the base:1.0 protocol revision.
pub const CAP_BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
/// Capability URI for the base:1.1 protocol revision.
pub const CAP_BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

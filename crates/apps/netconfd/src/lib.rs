//! Demo NETCONF agent: file-backed datastore handlers behind the protocol
//! engine, served over a plain-TCP end-of-message-framed transport.

pub mod config;
pub mod handlers;
pub mod store;
pub mod transport;

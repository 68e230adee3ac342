//! Server state shared across sessions: id allocation, the lock table and
//! the handler registry supplied by the surrounding application.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use netconf_xml::XmlElement;

use crate::error::RpcError;
use crate::lock::LockTable;
use crate::session::Session;

/// Everything a handler may need from the calling session and envelope.
pub struct RpcContext<'a> {
    pub session_id: u64,
    /// The full `<rpc>` envelope.
    pub rpc: &'a XmlElement,
    /// The operation element (single child of the envelope).
    pub operation: &'a XmlElement,
    /// The operation's validated parameter children.
    pub params: &'a [XmlElement],
}

/// One registered RPC implementation. Handlers return the raw result tree;
/// reply framing and filtering stay in the session.
pub trait RpcHandler: Send + Sync {
    fn call(&self, ctx: &RpcContext<'_>) -> Result<XmlElement, RpcError>;
}

impl<F> RpcHandler for F
where
    F: Fn(&RpcContext<'_>) -> Result<XmlElement, RpcError> + Send + Sync,
{
    fn call(&self, ctx: &RpcContext<'_>) -> Result<XmlElement, RpcError> {
        self(ctx)
    }
}

/// Lookup key for an operation name: `rpc_` prefix, dashes to underscores.
pub fn method_name(operation: &str) -> String {
    format!("rpc_{}", operation.replace('-', "_"))
}

/// Operation-name → handler map plus the capability-URI extension point,
/// populated by the application before the server starts.
#[derive(Default)]
pub struct HandlerRegistry {
    methods: HashMap<String, Arc<dyn RpcHandler>>,
    capabilities: Vec<String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: &str, handler: impl RpcHandler + 'static) {
        self.methods.insert(method_name(operation), Arc::new(handler));
    }

    /// Append a capability URI advertised in the server hello.
    pub fn add_capability(&mut self, uri: impl Into<String>) {
        self.capabilities.push(uri.into());
    }

    pub fn lookup(&self, operation: &str) -> Option<Arc<dyn RpcHandler>> {
        self.methods.get(&method_name(operation)).cloned()
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }
}

pub struct Server {
    locks: LockTable,
    registry: HandlerRegistry,
    next_session_id: AtomicU64,
    sessions: Mutex<Vec<u64>>,
}

impl Server {
    pub fn new(registry: HandlerRegistry) -> Arc<Self> {
        Arc::new(Self {
            locks: LockTable::new(),
            registry,
            next_session_id: AtomicU64::new(1),
            sessions: Mutex::new(Vec::new()),
        })
    }

    /// Allocate a session id and register the new session.
    pub fn open_session(self: &Arc<Self>) -> Session {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.lock().expect("sessions mutex poisoned").push(id);
        info!("session {id} opened");
        Session::new(id, Arc::clone(self))
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn session_ids(&self) -> Vec<u64> {
        self.sessions.lock().expect("sessions mutex poisoned").clone()
    }

    /// Deregister a closing session and force-release everything it held.
    pub(crate) fn release_session(&self, id: u64) {
        let released = self.locks.release_all(id);
        for target in &released {
            debug!("session {id} force-released lock on {}", target.name());
        }
        let mut sessions = self.sessions.lock().expect("sessions mutex poisoned");
        sessions.retain(|session| *session != id);
        info!("session {id} closed");
    }
}

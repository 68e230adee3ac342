//! Per-connection protocol state machine.
//!
//! A session is fed one decoded XML message at a time and returns the reply
//! strings to send back, one per `<rpc>` envelope found. All error-to-reply
//! mapping happens here; handlers and the filter engine only raise.

use std::sync::Arc;

use log::{debug, warn};
use netconf_xml::{elm, leaf, parse, serialize_document, XmlElement};

use crate::error::{RpcError, SessionError};
use crate::filter::filter_results;
use crate::lock::Target;
use crate::server::{RpcContext, Server};
use crate::{BASE_NS, CAP_BASE_1_0, CAP_BASE_1_1};

/// Operations answered `<ok/>` when the application registers no handler.
const GENERIC_ACK_OPS: &[&str] = &["commit", "discard-changes", "validate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Closed,
}

enum Disposition {
    Reply(XmlElement),
    ReplyAndClose(XmlElement),
}

pub struct Session {
    id: u64,
    server: Arc<Server>,
    state: SessionState,
    base11: bool,
}

impl Session {
    pub(crate) fn new(id: u64, server: Arc<Server>) -> Self {
        Self { id, server, state: SessionState::Open, base11: false }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Whether the negotiated protocol revision carries malformed-message
    /// errors in-band (base:1.1) instead of forcing connection closure.
    pub fn base11(&self) -> bool {
        self.base11
    }

    /// The server `<hello>`, including application capabilities.
    pub fn hello(&self) -> String {
        let mut hello = elm("hello");
        hello.set_attr("xmlns", BASE_NS);
        let capabilities = hello.subelm("capabilities");
        capabilities.push(leaf("capability", CAP_BASE_1_0));
        capabilities.push(leaf("capability", CAP_BASE_1_1));
        for uri in self.server.registry().capabilities() {
            capabilities.push(leaf("capability", uri.as_str()));
        }
        hello.push(leaf("session-id", self.id.to_string()));
        serialize_document(&hello)
    }

    /// Consume the client `<hello>` and negotiate the protocol revision.
    pub fn handle_hello(&mut self, text: &str) -> Result<(), SessionError> {
        let doc = match parse(text) {
            Ok(doc) => doc,
            Err(err) => return Err(self.fail(SessionError::BadHello(err.to_string()))),
        };
        if doc.local_name() != "hello" {
            return Err(self.fail(SessionError::BadHello(format!(
                "expected hello, got {}",
                doc.local_name()
            ))));
        }

        let capabilities: Vec<&str> = doc
            .child("capabilities")
            .map(|caps| {
                caps.children_named("capability")
                    .map(XmlElement::trimmed_text)
                    .collect()
            })
            .unwrap_or_default();
        let base10 = capabilities.contains(&CAP_BASE_1_0);
        self.base11 = capabilities.contains(&CAP_BASE_1_1);
        if !base10 && !self.base11 {
            return Err(self.fail(SessionError::BadHello(
                "client advertises no base capability".to_string(),
            )));
        }
        debug!("session {}: negotiated base:1.{}", self.id, u8::from(self.base11));
        Ok(())
    }

    /// Process one inbound message; returns one reply per envelope, in
    /// document order. `Err` means the session was closed with no reply.
    pub fn handle_message(&mut self, text: &str) -> Result<Vec<String>, SessionError> {
        if self.is_closed() {
            debug!("session {}: dropping message on closed session", self.id);
            return Ok(Vec::new());
        }

        let doc = match parse(text) {
            Ok(doc) => doc,
            Err(err) => return Err(self.fail(SessionError::BadMessage(err.to_string()))),
        };
        let envelopes = collect_envelopes(&doc);
        if envelopes.is_empty() {
            return Err(self.fail(SessionError::MissingRpc));
        }

        let mut replies = Vec::new();
        for rpc in envelopes {
            if rpc.attr("message-id").map(str::trim).filter(|id| !id.is_empty()).is_none() {
                return Err(self.fail(SessionError::MissingMessageId));
            }
            match self.process_rpc(rpc) {
                Ok(Disposition::Reply(payload)) => replies.push(frame_reply(rpc, payload)),
                Ok(Disposition::ReplyAndClose(payload)) => {
                    replies.push(frame_reply(rpc, payload));
                    self.close();
                    break;
                }
                Err(RpcError::MalformedMessage) if !self.base11 => {
                    // base:1.0 cannot carry this error in-band.
                    return Err(self.fail(SessionError::Unreportable(RpcError::MalformedMessage)));
                }
                Err(err) => {
                    warn!("session {}: {err}", self.id);
                    replies.push(frame_reply(rpc, err.to_element()));
                }
            }
        }
        Ok(replies)
    }

    /// Close the session and force-release its locks. Idempotent; also runs
    /// from `Drop` so transport unwinds cannot leak a held lock.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.server.release_session(self.id);
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!("session {}: fatal: {err}", self.id);
        self.close();
        err
    }

    fn process_rpc(&mut self, rpc: &XmlElement) -> Result<Disposition, RpcError> {
        if rpc.children.len() != 1 {
            return Err(RpcError::MalformedMessage);
        }
        let operation = &rpc.children[0];
        let name = operation.local_name().to_string();
        debug!("session {}: dispatching {name}", self.id);

        match name.as_str() {
            "close-session" | "kill-session" => {
                return Ok(Disposition::ReplyAndClose(elm("ok")));
            }
            "lock" => return self.handle_lock(rpc, operation).map(Disposition::Reply),
            "unlock" => return self.handle_unlock(rpc, operation).map(Disposition::Reply),
            "get" => validate_get(operation)?,
            "get-config" => validate_get_config(operation)?,
            "edit-config" => validate_edit_config(operation)?,
            _ => {}
        }

        let payload = match self.server.registry().lookup(&name) {
            Some(handler) => {
                let ctx = RpcContext {
                    session_id: self.id,
                    rpc,
                    operation,
                    params: &operation.children,
                };
                let result = handler.call(&ctx)?;
                match name.as_str() {
                    "get" | "get-config" => {
                        let filtered = filter_results(result, operation.child("filter"))?;
                        ensure_data_container(filtered)
                    }
                    _ => result,
                }
            }
            None if GENERIC_ACK_OPS.contains(&name.as_str()) => elm("ok"),
            None => return Err(RpcError::NotImplemented { operation: name }),
        };
        Ok(Disposition::Reply(payload))
    }

    fn handle_lock(&mut self, rpc: &XmlElement, operation: &XmlElement) -> Result<XmlElement, RpcError> {
        let target = lock_target(operation)?;
        self.server
            .locks()
            .try_lock(target, self.id)
            .map_err(|holder| RpcError::LockDenied { holder })?;
        debug!("session {} locked {}", self.id, target.name());

        if let Some(handler) = self.server.registry().lookup("lock") {
            let ctx = RpcContext {
                session_id: self.id,
                rpc,
                operation,
                params: &operation.children,
            };
            if let Err(err) = handler.call(&ctx) {
                // A failing handler must never leave the lock dangling.
                self.server.locks().unlock(target, self.id);
                return Err(err);
            }
        }
        Ok(elm("ok"))
    }

    fn handle_unlock(&mut self, rpc: &XmlElement, operation: &XmlElement) -> Result<XmlElement, RpcError> {
        let target = lock_target(operation)?;
        let holder = self.server.locks().holder_of(target);
        if holder != self.id {
            return Err(RpcError::LockDenied { holder });
        }

        if let Some(handler) = self.server.registry().lookup("unlock") {
            let ctx = RpcContext {
                session_id: self.id,
                rpc,
                operation,
                params: &operation.children,
            };
            handler.call(&ctx)?;
        }
        self.server.locks().unlock(target, self.id);
        debug!("session {} unlocked {}", self.id, target.name());
        Ok(elm("ok"))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn collect_envelopes(doc: &XmlElement) -> Vec<&XmlElement> {
    if doc.local_name() == "rpc" {
        return vec![doc];
    }
    doc.children_named("rpc").collect()
}

/// Wrap the envelope attributes (message-id included) around the payload,
/// mirroring the envelope's tag prefix.
fn frame_reply(rpc: &XmlElement, payload: XmlElement) -> String {
    let tag = match rpc.tag.rsplit_once(':') {
        Some((prefix, _)) => format!("{prefix}:rpc-reply"),
        None => "rpc-reply".to_string(),
    };
    let mut reply = XmlElement::new(tag);
    for (key, value) in &rpc.attrs {
        reply.set_attr(key.clone(), value.clone());
    }
    if !rpc.attrs.iter().any(|(key, _)| key == "xmlns" || key.starts_with("xmlns:")) {
        reply.set_attr("xmlns", BASE_NS);
    }
    reply.push(payload);
    serialize_document(&reply)
}

/// `get`/`get-config` replies always carry a `<data>` container.
fn ensure_data_container(payload: XmlElement) -> XmlElement {
    if payload.local_name() == "data" {
        return payload;
    }
    let mut data = elm("data");
    data.push(payload);
    data
}

/// The single datastore-name child of a `<target>`/`<source>` container.
fn datastore_child(container: &XmlElement) -> Result<Target, RpcError> {
    if container.children.is_empty() {
        return Err(RpcError::missing_element(container.local_name()));
    }
    if container.children.len() > 1 {
        return Err(RpcError::bad_element(container.local_name()));
    }
    let name = container.children[0].local_name();
    Target::parse(name).ok_or_else(|| RpcError::bad_element(name))
}

fn lock_target(operation: &XmlElement) -> Result<Target, RpcError> {
    let target = operation
        .child("target")
        .ok_or_else(|| RpcError::missing_element("target"))?;
    datastore_child(target)
}

fn validate_get(operation: &XmlElement) -> Result<(), RpcError> {
    let mut filters = 0usize;
    for child in &operation.children {
        match child.local_name() {
            "filter" => filters += 1,
            other => return Err(RpcError::unknown_element(other)),
        }
    }
    if filters > 1 {
        return Err(RpcError::bad_element("filter"));
    }
    Ok(())
}

fn validate_get_config(operation: &XmlElement) -> Result<(), RpcError> {
    let mut filters = 0usize;
    let mut source = false;
    for child in &operation.children {
        match child.local_name() {
            "source" => {
                source = true;
                datastore_child(child)?;
            }
            "filter" => filters += 1,
            other => return Err(RpcError::unknown_element(other)),
        }
    }
    if !source {
        return Err(RpcError::missing_element("source"));
    }
    if filters > 1 {
        return Err(RpcError::bad_element("filter"));
    }
    Ok(())
}

fn validate_edit_config(operation: &XmlElement) -> Result<(), RpcError> {
    let mut target = false;
    let mut config = false;
    for child in &operation.children {
        match child.local_name() {
            "target" => {
                target = true;
                datastore_child(child)?;
            }
            "config" => config = true,
            "default-operation" | "test-option" | "error-option" => {}
            other => return Err(RpcError::unknown_element(other)),
        }
    }
    if !target {
        return Err(RpcError::missing_element("target"));
    }
    if !config {
        return Err(RpcError::missing_element("config"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        collect_envelopes, datastore_child, frame_reply, validate_edit_config, validate_get,
        validate_get_config,
    };
    use netconf_xml::{elm, parse};

    #[test]
    fn envelopes_are_found_at_root_or_one_level_down() {
        let single = parse("<rpc message-id=\"1\"><get/></rpc>").expect("doc");
        assert_eq!(collect_envelopes(&single).len(), 1);

        let batched = parse(
            "<batch><rpc message-id=\"1\"><get/></rpc><rpc message-id=\"2\"><get/></rpc></batch>",
        )
        .expect("doc");
        assert_eq!(collect_envelopes(&batched).len(), 2);

        let none = parse("<hello/>").expect("doc");
        assert!(collect_envelopes(&none).is_empty());
    }

    #[test]
    fn reply_echoes_envelope_attributes_and_prefix() {
        let rpc = parse(
            "<nc:rpc xmlns:nc=\"urn:ietf:params:xml:ns:netconf:base:1.0\" message-id=\"abc\" custom=\"x\"><get/></nc:rpc>",
        )
        .expect("doc");
        let reply = frame_reply(&rpc, elm("ok"));
        assert!(reply.contains("<nc:rpc-reply"));
        assert!(reply.contains("message-id=\"abc\""));
        assert!(reply.contains("custom=\"x\""));
        assert!(reply.contains("<ok/>"));
    }

    #[test]
    fn reply_gains_base_namespace_when_envelope_has_none() {
        let rpc = parse("<rpc message-id=\"1\"><get/></rpc>").expect("doc");
        let reply = frame_reply(&rpc, elm("ok"));
        assert!(reply.contains("xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\""));
    }

    #[test]
    fn get_rejects_unknown_parameters() {
        let op = parse("<get><bogus/></get>").expect("doc");
        assert_eq!(validate_get(&op).expect_err("must fail").tag(), "unknown-element");

        let op = parse("<get><filter/></get>").expect("doc");
        assert!(validate_get(&op).is_ok());
    }

    #[test]
    fn get_config_requires_source() {
        let op = parse("<get-config><filter/></get-config>").expect("doc");
        assert_eq!(validate_get_config(&op).expect_err("must fail").tag(), "missing-element");

        let op = parse("<get-config><source><running/></source></get-config>").expect("doc");
        assert!(validate_get_config(&op).is_ok());
    }

    #[test]
    fn edit_config_requires_target_and_config() {
        let op = parse("<edit-config><target><candidate/></target></edit-config>").expect("doc");
        assert_eq!(validate_edit_config(&op).expect_err("must fail").tag(), "missing-element");

        let op = parse(
            "<edit-config><target><candidate/></target><default-operation>merge</default-operation><config><top/></config></edit-config>",
        )
        .expect("doc");
        assert!(validate_edit_config(&op).is_ok());
    }

    #[test]
    fn datastore_child_rejects_unknown_and_ambiguous_targets() {
        let target = parse("<target><startup/></target>").expect("doc");
        assert_eq!(datastore_child(&target).expect_err("must fail").tag(), "bad-element");

        let target = parse("<target><running/><candidate/></target>").expect("doc");
        assert_eq!(datastore_child(&target).expect_err("must fail").tag(), "bad-element");

        let target = parse("<target/>").expect("doc");
        assert_eq!(datastore_child(&target).expect_err("must fail").tag(), "missing-element");
    }
}

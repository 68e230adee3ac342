//! Failure taxonomy and `<rpc-error>` rendering.
//!
//! Every [`RpcError`] maps to an in-band reply; [`SessionError`] is fatal and
//! closes the session without one.

use netconf_xml::{elm, leaf, XmlElement};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("missing element {element}")]
    MissingElement { element: String },
    #[error("unknown element {element}")]
    UnknownElement { element: String },
    #[error("bad element {element}")]
    BadElement { element: String },
    #[error("missing attribute {attribute} on {element}")]
    MissingAttribute { element: String, attribute: String },
    #[error("bad attribute {attribute} on {element}")]
    BadAttribute { element: String, attribute: String },
    #[error("rpc envelope must contain exactly one operation element")]
    MalformedMessage,
    #[error("lock held by session {holder}")]
    LockDenied { holder: u64 },
    #[error("access denied")]
    AccessDenied,
    #[error("operation {operation} not implemented")]
    NotImplemented { operation: String },
    #[error("operation failed: {detail}")]
    Internal { detail: String },
}

impl RpcError {
    pub fn missing_element(element: impl Into<String>) -> Self {
        Self::MissingElement { element: element.into() }
    }

    pub fn unknown_element(element: impl Into<String>) -> Self {
        Self::UnknownElement { element: element.into() }
    }

    pub fn bad_element(element: impl Into<String>) -> Self {
        Self::BadElement { element: element.into() }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal { detail: detail.into() }
    }

    /// RFC 6241 error-tag for this failure.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MissingElement { .. } => "missing-element",
            Self::UnknownElement { .. } => "unknown-element",
            Self::BadElement { .. } => "bad-element",
            Self::MissingAttribute { .. } => "missing-attribute",
            Self::BadAttribute { .. } => "bad-attribute",
            Self::MalformedMessage => "malformed-message",
            Self::LockDenied { .. } => "lock-denied",
            Self::AccessDenied => "access-denied",
            Self::NotImplemented { .. } => "operation-not-supported",
            Self::Internal { .. } => "operation-failed",
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::AccessDenied | Self::Internal { .. } => "application",
            _ => "protocol",
        }
    }

    /// Render as an `<rpc-error>` element ready for reply framing.
    pub fn to_element(&self) -> XmlElement {
        let mut error = elm("rpc-error");
        error.push(leaf("error-type", self.error_type()));
        error.push(leaf("error-tag", self.tag()));
        error.push(leaf("error-severity", "error"));
        if let Self::Internal { detail } = self {
            error.push(leaf("error-message", detail.as_str()));
        }
        if let Some(info) = self.error_info() {
            error.push(info);
        }
        error
    }

    fn error_info(&self) -> Option<XmlElement> {
        let mut info = elm("error-info");
        match self {
            Self::MissingElement { element }
            | Self::UnknownElement { element }
            | Self::BadElement { element } => {
                info.push(leaf("bad-element", element.as_str()));
            }
            Self::MissingAttribute { element, attribute }
            | Self::BadAttribute { element, attribute } => {
                info.push(leaf("bad-attribute", attribute.as_str()));
                info.push(leaf("bad-element", element.as_str()));
            }
            Self::LockDenied { holder } => {
                info.push(leaf("session-id", holder.to_string()));
            }
            Self::NotImplemented { operation } => {
                info.push(leaf("bad-element", operation.as_str()));
            }
            Self::MalformedMessage | Self::AccessDenied | Self::Internal { .. } => return None,
        }
        Some(info)
    }
}

/// Connection-fatal failures; the session is closed and no reply is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed message: {0}")]
    BadMessage(String),
    #[error("no rpc element found in message")]
    MissingRpc,
    #[error("rpc element has no message-id attribute")]
    MissingMessageId,
    #[error("hello exchange failed: {0}")]
    BadHello(String),
    #[error("cannot report error in-band on base:1.0: {0}")]
    Unreportable(RpcError),
}

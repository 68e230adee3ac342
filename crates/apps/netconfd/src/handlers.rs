//! RPC handlers wiring the datastore and system state to the engine.

use std::sync::Arc;

use log::info;
use netconf_proto::{HandlerRegistry, RpcContext, RpcError, Target};
use netconf_xml::{elm, leaf, XmlElement};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::store::ConfigStore;

pub const XPATH_CAPABILITY: &str = "urn:ietf:params:netconf:capability:xpath:1.0";

/// Build the agent's handler registry around a seeded config store.
pub fn build_registry(store: ConfigStore, extra_capabilities: &[String]) -> HandlerRegistry {
    let store = Arc::new(store);
    let mut registry = HandlerRegistry::new();
    registry.add_capability(XPATH_CAPABILITY);
    for capability in extra_capabilities {
        registry.add_capability(capability.clone());
    }

    registry.register("get", |ctx: &RpcContext<'_>| {
        info!("session {}: get", ctx.session_id);
        Ok(system_state())
    });

    let get_config_store = Arc::clone(&store);
    registry.register("get-config", move |ctx: &RpcContext<'_>| {
        let target = requested_target(ctx.operation, "source")?;
        info!("session {}: get-config from {}", ctx.session_id, target.name());
        get_config_store.load(target)
    });

    let edit_config_store = Arc::clone(&store);
    registry.register("edit-config", move |ctx: &RpcContext<'_>| {
        let target = requested_target(ctx.operation, "target")?;
        let config = ctx
            .operation
            .child("config")
            .ok_or_else(|| RpcError::missing_element("config"))?;
        info!("session {}: edit-config on {}", ctx.session_id, target.name());
        edit_config_store.merge(target, config)?;
        Ok(elm("ok"))
    });

    registry.register("system-restart", |_: &RpcContext<'_>| {
        Err::<XmlElement, _>(RpcError::AccessDenied)
    });
    registry.register("system-shutdown", |_: &RpcContext<'_>| {
        Err::<XmlElement, _>(RpcError::AccessDenied)
    });

    registry
}

/// Synthesized operational state for `get`.
fn system_state() -> XmlElement {
    let mut data = elm("data");
    let state = data.subelm("system-state");
    let platform = state.subelm("platform");
    platform.push(leaf("os-name", std::env::consts::OS));
    platform.push(leaf("machine", std::env::consts::ARCH));

    let clock = state.subelm("clock");
    if let Ok(now) = OffsetDateTime::now_utc().format(&Rfc3339) {
        clock.push(leaf("current-datetime", now));
    }
    data
}

fn requested_target(operation: &XmlElement, container: &str) -> Result<Target, RpcError> {
    operation
        .child(container)
        .and_then(|element| element.children.first())
        .and_then(|child| Target::parse(child.local_name()))
        .ok_or_else(|| RpcError::missing_element(container))
}

use crate::{gateway::Gateway, nginx_proxy::EffectiveNginxProxy};
use nginx_gateway_controller_core::{Condition, ResourceId};
use nginx_gateway_controller_k8s_api::gateway::{ParentReference, GROUP};
use std::collections::{BTreeMap, BTreeSet};

const GATEWAY_KIND: &str = "Gateway";

/// A route's reference to one of our gateways.
///
/// A source parent ref that names neither a section nor a port is expanded
/// into one `ParentRef` per listener; all of them keep the source index.
#[derive(Clone, Debug, PartialEq)]
pub struct ParentRef {
    /// The index of the parent ref in the route's `spec.parentRefs`.
    pub idx: usize,
    pub gateway: ParentRefGateway,
    pub section_name: Option<String>,
    pub port: Option<i32>,

    /// Set once the route has been bound to the gateway's listeners.
    pub attachment: Option<Attachment>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParentRefGateway {
    pub id: ResourceId,
    pub effective_nginx_proxy: Option<EffectiveNginxProxy>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attachment {
    /// Hostnames accepted by each listener, keyed by [`listener_key`].
    pub accepted_hostnames: BTreeMap<String, Vec<String>>,

    /// Explains why the route is not attached, or only partially attached.
    pub failed_conditions: Vec<Condition>,

    /// The port of the last listener the route attached to.
    pub listener_port: Option<i32>,
    pub attached: bool,
}

/// Identifies a listener across gateways.
pub fn listener_key(gateway: &ResourceId, listener: &str) -> String {
    format!("{}/{}/{listener}", gateway.namespace, gateway.name)
}

/// Converts a route's parent refs into refs to our gateways.
///
/// Refs to other gateways are dropped. Fails when two refs name the same
/// listener of one gateway.
pub(crate) fn build(
    parent_refs: &[ParentReference],
    route_ns: &str,
    gateways: &BTreeMap<ResourceId, Gateway>,
) -> Result<Vec<ParentRef>, String> {
    let mut sections = BTreeSet::new();
    let mut check_unique = |gw: &ResourceId, section: &str| {
        if sections.insert((gw.clone(), section.to_string())) {
            Ok(())
        } else {
            Err(format!("duplicate section name {section:?} for Gateway {gw}"))
        }
    };

    let mut refs = Vec::with_capacity(parent_refs.len());
    for (idx, p) in parent_refs.iter().enumerate() {
        let Some((id, gw)) = find_gateway(p, route_ns, gateways) else {
            continue;
        };

        match (&p.section_name, p.port) {
            (None, Some(port)) => refs.push(ParentRef {
                idx,
                gateway: ParentRefGateway::new(id, gw),
                section_name: None,
                port: Some(port),
                attachment: None,
            }),
            (None, None) => {
                for l in &gw.listeners {
                    check_unique(id, &l.name)?;
                    refs.push(ParentRef {
                        idx,
                        gateway: ParentRefGateway::new(id, gw),
                        section_name: Some(l.name.clone()),
                        port: None,
                        attachment: None,
                    });
                }
            }
            (Some(section), port) => {
                check_unique(id, section)?;
                refs.push(ParentRef {
                    idx,
                    gateway: ParentRefGateway::new(id, gw),
                    section_name: Some(section.clone()),
                    port,
                    attachment: None,
                });
            }
        }
    }

    Ok(refs)
}

fn find_gateway<'g>(
    p: &ParentReference,
    route_ns: &str,
    gateways: &'g BTreeMap<ResourceId, Gateway>,
) -> Option<(&'g ResourceId, &'g Gateway)> {
    if p.kind.as_deref().is_some_and(|k| k != GATEWAY_KIND) {
        return None;
    }
    if p.group.as_deref().is_some_and(|g| g != GROUP) {
        return None;
    }

    let ns = p.namespace.as_deref().unwrap_or(route_ns);
    let id = ResourceId::new(ns.to_string(), p.name.clone());
    gateways.get_key_value(&id)
}

// === impl ParentRef ===

impl ParentRef {
    pub fn is_attached(&self) -> bool {
        self.attachment.as_ref().is_some_and(|a| a.attached)
    }

    pub fn is_attached_to(&self, gateway: &ResourceId) -> bool {
        self.gateway.id == *gateway && self.is_attached()
    }
}

// === impl ParentRefGateway ===

impl ParentRefGateway {
    fn new(id: &ResourceId, gw: &Gateway) -> Self {
        Self {
            id: id.clone(),
            effective_nginx_proxy: gw.effective_nginx_proxy.clone(),
        }
    }
}

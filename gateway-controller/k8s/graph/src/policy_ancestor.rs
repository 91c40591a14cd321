//! Bookkeeping for the ancestors written into a policy's status.
//!
//! A policy status may list at most [`MAX_ANCESTORS`] ancestors across all
//! controllers. Ancestors beyond the limit are reported on the ancestor
//! itself instead.

use crate::gateway::Gateway;
use nginx_gateway_controller_core::{
    conditions::{self, reasons},
    creation_order, Condition, ResourceId,
};
use nginx_gateway_controller_k8s_api::gateway::{ParentReference, PolicyStatus, GROUP};
use std::collections::{BTreeMap, BTreeSet};

pub const MAX_ANCESTORS: usize = 16;

/// Counts the ancestors other controllers wrote into a policy's status.
pub fn non_ngf_ancestors(status: Option<&PolicyStatus>, controller_name: &str) -> usize {
    status
        .map(|s| {
            s.ancestors
                .iter()
                .filter(|a| a.controller_name != controller_name)
                .count()
        })
        .unwrap_or(0)
}

/// Whether another ancestor would exceed the limit, given the ancestors
/// computed so far. The computed list replaces our current status entries,
/// so only foreign entries are counted from the status.
pub fn ancestors_full(status: Option<&PolicyStatus>, controller_name: &str, computed: usize) -> bool {
    non_ngf_ancestors(status, controller_name) + computed >= MAX_ANCESTORS
}

/// The gateways our controller already lists as ancestors in a policy's
/// status.
pub fn existing_gateway_ancestors(
    status: Option<&PolicyStatus>,
    controller_name: &str,
) -> Vec<ResourceId> {
    status
        .into_iter()
        .flat_map(|s| s.ancestors.iter())
        .filter(|a| a.controller_name == controller_name)
        .filter_map(|a| {
            let r = &a.ancestor_ref;
            if r.kind.as_deref() != Some("Gateway") {
                return None;
            }
            let ns = r.namespace.as_ref()?;
            Some(ResourceId::new(ns.clone(), r.name.clone()))
        })
        .collect()
}

pub fn create_parent_reference(group: &str, kind: &str, id: &ResourceId) -> ParentReference {
    ParentReference {
        group: Some(group.to_string()),
        kind: Some(kind.to_string()),
        namespace: Some(id.namespace.clone()),
        name: id.name.clone(),
        section_name: None,
        port: None,
    }
}

/// Compares the fields of ancestor references we set.
pub fn parent_ref_eq(a: &ParentReference, b: &ParentReference) -> bool {
    a.kind == b.kind && a.group == b.group && a.namespace == b.namespace && a.name == b.name
}

pub fn ancestor_name(r: &ParentReference) -> String {
    match r.namespace.as_deref() {
        Some(ns) => format!("{ns}/{}", r.name),
        None => r.name.clone(),
    }
}

/// Sorts gateways oldest first. Gateways missing from the graph sort by
/// identity alone.
pub fn sort_gateways_by_creation(ids: &mut [ResourceId], gateways: &BTreeMap<ResourceId, Gateway>) {
    ids.sort_by(|a, b| match (gateways.get(a), gateways.get(b)) {
        (Some(ga), Some(gb)) => creation_order(&ga.source.metadata, &gb.source.metadata),
        _ => a.cmp(b),
    });
}

/// Orders the gateways a policy applies to: gateways already listed in its
/// status come first so that they keep their slots. Each group is ordered
/// oldest first and duplicates are dropped.
pub fn order_gateways(
    candidates: impl IntoIterator<Item = ResourceId>,
    existing: &BTreeSet<ResourceId>,
    gateways: &BTreeMap<ResourceId, Gateway>,
) -> Vec<ResourceId> {
    let mut seen = BTreeSet::new();
    let (mut known, mut new): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .filter(|gw| seen.insert(gw.clone()))
        .partition(|gw| existing.contains(gw));

    sort_gateways_by_creation(&mut known, gateways);
    sort_gateways_by_creation(&mut new, gateways);
    known.extend(new);
    known
}

/// Admits `ordered` gateways as ancestors of a policy until its status is
/// full. Each gateway left out is told which policy could not apply to it.
pub fn admit_gateways(
    ordered: Vec<ResourceId>,
    status: Option<&PolicyStatus>,
    controller_name: &str,
    policy: &ResourceId,
    policy_kind: &str,
    gateways: &mut BTreeMap<ResourceId, Gateway>,
) -> Vec<ResourceId> {
    let mut admitted = Vec::with_capacity(ordered.len());
    let policy_name = policy.to_string();

    for gw in ordered {
        if !ancestors_full(status, controller_name, admitted.len()) {
            admitted.push(gw);
            continue;
        }

        let ancestor = ancestor_name(&create_parent_reference(GROUP, "Gateway", &gw));
        match gateways.get_mut(&gw) {
            Some(gateway) => {
                add_ancestor_limit_condition(&mut gateway.conditions, &policy_name, policy_kind)
            }
            None => tracing::warn!(policy = %policy_name, %ancestor, "Gateway not found in the graph"),
        }
        log_ancestor_limit_reached(&policy_name, policy_kind, &ancestor);
    }

    admitted
}

pub fn log_ancestor_limit_reached(policy: &str, policy_kind: &str, ancestor: &str) {
    tracing::info!(%policy_kind, %ancestor, "Policy ancestor limit reached for {policy}");
}

/// Records on an ancestor's conditions that `policy` could not list it.
/// Policies are merged into a single condition.
pub fn add_ancestor_limit_condition(conds: &mut Vec<Condition>, policy: &str, policy_kind: &str) {
    if let Some(c) = conds
        .iter_mut()
        .find(|c| c.reason == reasons::ANCESTOR_LIMIT_REACHED)
    {
        if !c.message.contains(policy) {
            c.message = format!("{}, {policy_kind} {policy}", c.message);
        }
        return;
    }
    conds.push(conditions::policy_ancestor_limit_reached(format!(
        "{policy_kind} {policy}"
    )));
}

#[cfg(test)]
mod tests {
    use super::*;
    use nginx_gateway_controller_k8s_api::gateway::PolicyAncestorStatus;
    use pretty_assertions::assert_eq;

    fn mk_status(controllers: &[&str]) -> PolicyStatus {
        PolicyStatus {
            ancestors: controllers
                .iter()
                .enumerate()
                .map(|(i, c)| PolicyAncestorStatus {
                    ancestor_ref: create_parent_reference(
                        "gateway.networking.k8s.io",
                        "Gateway",
                        &ResourceId::new("test".to_string(), format!("gw-{i}")),
                    ),
                    controller_name: c.to_string(),
                    conditions: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn counts_foreign_ancestors() {
        let mut controllers = vec!["other"; 15];
        controllers.push("ours");
        let status = mk_status(&controllers);

        assert_eq!(non_ngf_ancestors(Some(&status), "ours"), 15);
        assert!(!ancestors_full(Some(&status), "ours", 0));
        assert!(ancestors_full(Some(&status), "ours", 1));
        assert!(!ancestors_full(None, "ours", 15));
    }

    #[test]
    fn finds_existing_gateway_ancestors() {
        let mut status = mk_status(&["ours", "other", "ours"]);
        status.ancestors[2].ancestor_ref.namespace = None;
        assert_eq!(
            existing_gateway_ancestors(Some(&status), "ours"),
            vec![ResourceId::new("test".to_string(), "gw-0".to_string())]
        );
    }

    #[test]
    fn merges_limit_conditions() {
        let mut conds = vec![];
        add_ancestor_limit_condition(&mut conds, "test/p1", "BackendTLSPolicy");
        add_ancestor_limit_condition(&mut conds, "test/p2", "ObservabilityPolicy");
        add_ancestor_limit_condition(&mut conds, "test/p1", "BackendTLSPolicy");

        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].reason, reasons::ANCESTOR_LIMIT_REACHED);
        assert!(
            conds[0]
                .message
                .ends_with("ignored: BackendTLSPolicy test/p1, ObservabilityPolicy test/p2"),
            "{}",
            conds[0].message
        );
    }

    #[test]
    fn names_ancestors() {
        let id = ResourceId::new("ns".to_string(), "gw".to_string());
        let r = create_parent_reference("gateway.networking.k8s.io", "Gateway", &id);
        assert_eq!(ancestor_name(&r), "ns/gw");
        assert!(parent_ref_eq(&r, &r.clone()));

        let mut other = r.clone();
        other.kind = Some("HTTPRoute".to_string());
        assert!(!parent_ref_eq(&r, &other));
    }

    #[test]
    fn orders_existing_gateways_first() {
        let id = |name: &str| ResourceId::new("test".to_string(), name.to_string());
        let existing = [id("gw-c")].into_iter().collect();
        let ordered = order_gateways(
            vec![id("gw-b"), id("gw-c"), id("gw-a"), id("gw-b")],
            &existing,
            &BTreeMap::new(),
        );
        assert_eq!(ordered, vec![id("gw-c"), id("gw-a"), id("gw-b")]);
    }
}

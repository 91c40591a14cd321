//! NGINX Gateway Fabric policies.
//!
//! ClientSettingsPolicies, ObservabilityPolicies and UpstreamSettingsPolicies
//! are validated, checked for conflicts with older policies of their kind,
//! and attached to the gateways, routes and Services they target. Their
//! ancestors are always gateways, bounded by the shared ancestor limit.

use crate::{
    gateway::Gateway,
    policy_ancestor,
    route::{L7Route, L7RouteKind, RouteKey},
    service::ReferencedService,
    validation,
};
use nginx_gateway_controller_core::{
    conditions, creation_order, Condition, ErrorList, FieldError, Path, ResourceId,
};
use nginx_gateway_controller_k8s_api::{
    gateway::{LocalPolicyTargetReference, PolicyStatus, GROUP},
    nginx::{
        ClientSettingsPolicy, ClientSettingsPolicySpec, ObservabilityPolicy,
        ObservabilityPolicySpec, Tracing, UpstreamSettingsPolicy, UpstreamSettingsPolicySpec,
    },
    ObjectMeta, Resource,
};
use std::collections::{BTreeMap, BTreeSet};

const STRATEGY_RATIO: &str = "ratio";
const STRATEGY_PARENT: &str = "parent";
const TRACING_CONTEXTS: [&str; 4] = ["extract", "inject", "propagate", "ignore"];
const MAX_RATIO: i32 = 100;

const CORE_GROUPS: [&str; 2] = ["", "core"];

const TELEMETRY_NOT_ENABLED: &str = "Telemetry is not enabled in the NginxProxy resource";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyKind {
    ClientSettings,
    Observability,
    UpstreamSettings,
}

/// Identifies a policy across kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyKey {
    pub kind: PolicyKind,
    pub id: ResourceId,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PolicySource {
    ClientSettings(ClientSettingsPolicy),
    Observability(ObservabilityPolicy),
    UpstreamSettings(UpstreamSettingsPolicy),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    Gateway,
    HttpRoute,
    GrpcRoute,
    Service,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyTarget {
    pub kind: TargetKind,
    pub id: ResourceId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Policy {
    pub source: PolicySource,

    /// The target refs that name an object in the graph.
    pub targets: Vec<PolicyTarget>,

    /// The gateways the policy applies to, within the ancestor limit.
    pub ancestors: Vec<ResourceId>,

    /// Ancestors whose configuration cannot honor the policy, with the
    /// condition explaining why.
    pub invalid_for_gateways: BTreeMap<ResourceId, Condition>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
}

pub(crate) struct PolicySources<'a> {
    pub client_settings: &'a BTreeMap<ResourceId, ClientSettingsPolicy>,
    pub observability: &'a BTreeMap<ResourceId, ObservabilityPolicy>,
    pub upstream_settings: &'a BTreeMap<ResourceId, UpstreamSettingsPolicy>,
}

/// The graph nodes policies target. Attached policies are recorded on them.
pub(crate) struct PolicyContext<'a> {
    pub gateways: &'a mut BTreeMap<ResourceId, Gateway>,
    pub routes: &'a mut BTreeMap<RouteKey, L7Route>,
    pub services: &'a mut BTreeMap<ResourceId, ReferencedService>,
    pub controller_name: &'a str,
}

/// Builds every policy that targets something in the graph and attaches it.
pub(crate) fn process(sources: PolicySources<'_>, mut ctx: PolicyContext<'_>) -> BTreeMap<PolicyKey, Policy> {
    let mut policies = BTreeMap::new();
    if ctx.gateways.is_empty() {
        return policies;
    }

    let all = sources
        .client_settings
        .values()
        .map(|p| PolicySource::ClientSettings(p.clone()))
        .chain(sources.observability.values().map(|p| PolicySource::Observability(p.clone())))
        .chain(
            sources
                .upstream_settings
                .values()
                .map(|p| PolicySource::UpstreamSettings(p.clone())),
        );

    for source in all {
        let key = source.key();
        let targets = ctx.resolve_targets(&source);
        if targets.is_empty() {
            tracing::trace!(policy = %key.id, kind = key.kind.as_str(), "Policy does not target anything in the graph");
            continue;
        }

        let conditions = source
            .validate()
            .aggregate()
            .map(|msg| vec![conditions::policy_invalid(msg)])
            .unwrap_or_default();
        let valid = conditions.is_empty();
        if !valid {
            tracing::debug!(policy = %key.id, kind = key.kind.as_str(), "Policy is invalid");
        }

        policies.insert(
            key,
            Policy {
                source,
                targets,
                ancestors: Vec::new(),
                invalid_for_gateways: BTreeMap::new(),
                conditions,
                valid,
            },
        );
    }

    mark_conflicts(&mut policies);

    for (key, policy) in policies.iter_mut() {
        attach(key, policy, &mut ctx);
    }

    policies
}

/// Invalidates every valid policy that sets a field an older policy of the
/// same kind already sets on a shared target.
fn mark_conflicts(policies: &mut BTreeMap<PolicyKey, Policy>) {
    let mut ordered = policies
        .iter()
        .filter(|(_, p)| p.valid)
        .map(|(key, _)| key.clone())
        .collect::<Vec<_>>();
    ordered.sort_by(|a, b| {
        creation_order(policies[a].source.metadata(), policies[b].source.metadata())
            .then_with(|| a.kind.cmp(&b.kind))
    });

    let mut winners = Vec::<PolicyKey>::with_capacity(ordered.len());
    for key in ordered {
        let policy = &policies[&key];
        let loses = winners
            .iter()
            .map(|w| &policies[w])
            .any(|w| policy.shares_target(w) && policy.source.conflicts_with(&w.source));
        if !loses {
            winners.push(key);
            continue;
        }

        tracing::debug!(policy = %key.id, kind = key.kind.as_str(), "Policy conflicts with an older policy");
        if let Some(policy) = policies.get_mut(&key) {
            policy.conditions.push(conditions::policy_conflicted(format!(
                "Conflicts with another {}",
                key.kind.as_str()
            )));
            policy.valid = false;
        }
    }
}

/// Computes the policy's ancestors and, for a valid policy, records it on
/// each target reached through an admitted ancestor.
fn attach(key: &PolicyKey, policy: &mut Policy, ctx: &mut PolicyContext<'_>) {
    let by_target = policy
        .targets
        .iter()
        .map(|t| (t.clone(), ctx.target_gateways(t)))
        .collect::<Vec<_>>();

    let status = policy.source.status();
    let existing = policy_ancestor::existing_gateway_ancestors(status, ctx.controller_name)
        .into_iter()
        .collect::<BTreeSet<_>>();
    let ordered = policy_ancestor::order_gateways(
        by_target.iter().flat_map(|(_, gws)| gws.iter().cloned()),
        &existing,
        ctx.gateways,
    );
    policy.ancestors = policy_ancestor::admit_gateways(
        ordered,
        status,
        ctx.controller_name,
        &key.id,
        key.kind.as_str(),
        ctx.gateways,
    );

    for gw in &policy.ancestors {
        if let Some(cond) = policy.source.invalid_for_gateway(ctx.gateways.get(gw)) {
            tracing::debug!(policy = %key.id, gateway = %gw, "Policy cannot apply to gateway");
            policy.invalid_for_gateways.insert(gw.clone(), cond);
        }
    }

    if !policy.valid {
        return;
    }

    let admitted = policy.ancestors.iter().collect::<BTreeSet<_>>();
    for (target, gateways) in &by_target {
        if gateways.iter().any(|gw| admitted.contains(gw)) {
            ctx.push_policy(target, key);
        }
    }
}

fn validate_target_ref(
    target: &LocalPolicyTargetReference,
    path: &Path,
    groups: &[&str],
    kinds: &[TargetKind],
) -> ErrorList {
    let mut errs = ErrorList::new();
    if !groups.contains(&target.group.as_str()) {
        errs.push(FieldError::not_supported(
            path.child("group"),
            &target.group,
            groups.iter(),
        ));
    }
    if !kinds.iter().any(|k| k.as_str() == target.kind) {
        errs.push(FieldError::not_supported(
            path.child("kind"),
            &target.kind,
            kinds.iter().map(TargetKind::as_str),
        ));
    }
    errs
}

fn validate_client_settings(spec: &ClientSettingsPolicySpec) -> ErrorList {
    let path = Path::new("spec");
    let mut errs = validate_target_ref(
        &spec.target_ref,
        &path.child("targetRef"),
        &[GROUP],
        &[TargetKind::Gateway, TargetKind::HttpRoute, TargetKind::GrpcRoute],
    );

    if let Some(body) = &spec.body {
        let path = path.child("body");
        errs.extend(invalid_size(&path.child("maxSize"), body.max_size.as_deref()));
        errs.extend(invalid_duration(&path.child("timeout"), body.timeout.as_deref()));
    }

    if let Some(keep_alive) = &spec.keep_alive {
        let path = path.child("keepAlive");
        errs.extend(invalid_duration(&path.child("time"), keep_alive.time.as_deref()));
        if let Some(timeout) = &keep_alive.timeout {
            let path = path.child("timeout");
            errs.extend(invalid_duration(&path.child("server"), timeout.server.as_deref()));
            errs.extend(invalid_duration(&path.child("header"), timeout.header.as_deref()));
            if timeout.header.is_some() && timeout.server.is_none() {
                errs.push(FieldError::forbidden(
                    path.child("header"),
                    "header can only be specified if server is specified",
                ));
            }
        }
    }

    errs
}

fn validate_observability(spec: &ObservabilityPolicySpec) -> ErrorList {
    let path = Path::new("spec");
    let mut errs = spec
        .target_refs
        .iter()
        .enumerate()
        .flat_map(|(i, t)| {
            validate_target_ref(
                t,
                &path.child("targetRefs").index(i),
                &[GROUP],
                &[TargetKind::HttpRoute, TargetKind::GrpcRoute],
            )
        })
        .collect::<ErrorList>();

    if let Some(tracing) = &spec.tracing {
        errs.append(validate_tracing(tracing, &path.child("tracing")));
    }

    errs
}

fn validate_tracing(tracing: &Tracing, path: &Path) -> ErrorList {
    let mut errs = ErrorList::new();

    if tracing.strategy != STRATEGY_RATIO && tracing.strategy != STRATEGY_PARENT {
        errs.push(FieldError::not_supported(
            path.child("strategy"),
            &tracing.strategy,
            [STRATEGY_RATIO, STRATEGY_PARENT],
        ));
    }

    if let Some(ratio) = tracing.ratio {
        let path = path.child("ratio");
        if tracing.strategy == STRATEGY_PARENT {
            errs.push(FieldError::forbidden(
                path,
                "ratio can only be specified if strategy is of type ratio",
            ));
        } else if !(0..=MAX_RATIO).contains(&ratio) {
            errs.push(FieldError::invalid(
                path,
                ratio,
                format!("must be between 0 and {MAX_RATIO}"),
            ));
        }
    }

    if let Some(context) = &tracing.context {
        if !TRACING_CONTEXTS.contains(&context.as_str()) {
            errs.push(FieldError::not_supported(
                path.child("context"),
                context,
                TRACING_CONTEXTS,
            ));
        }
    }

    if let Some(name) = &tracing.span_name {
        if let Err(e) = validation::validate_escaped_string_no_var_expansion(name, &["my-span"]) {
            errs.push(FieldError::invalid(path.child("spanName"), name, e));
        }
    }

    for (i, attr) in tracing.span_attributes.iter().flatten().enumerate() {
        let path = path.child("spanAttributes").index(i);
        for (field, value) in [("key", &attr.key), ("value", &attr.value)] {
            if let Err(e) = validation::validate_escaped_string_no_var_expansion(value, &["my-attr"]) {
                errs.push(FieldError::invalid(path.child(field), value, e));
            }
        }
    }

    errs
}

fn validate_upstream_settings(spec: &UpstreamSettingsPolicySpec) -> ErrorList {
    let path = Path::new("spec");
    let mut errs = spec
        .target_refs
        .iter()
        .enumerate()
        .flat_map(|(i, t)| {
            validate_target_ref(
                t,
                &path.child("targetRefs").index(i),
                &CORE_GROUPS,
                &[TargetKind::Service],
            )
        })
        .collect::<ErrorList>();

    errs.extend(invalid_size(&path.child("zoneSize"), spec.zone_size.as_deref()));
    if let Some(keep_alive) = &spec.keep_alive {
        let path = path.child("keepAlive");
        errs.extend(invalid_duration(&path.child("time"), keep_alive.time.as_deref()));
        errs.extend(invalid_duration(&path.child("timeout"), keep_alive.timeout.as_deref()));
    }

    errs
}

fn invalid_duration(path: &Path, value: Option<&str>) -> Option<FieldError> {
    let value = value?;
    let err = validation::validate_nginx_duration(value).err()?;
    Some(FieldError::invalid(path.clone(), value, err))
}

fn invalid_size(path: &Path, value: Option<&str>) -> Option<FieldError> {
    let value = value?;
    let err = validation::validate_nginx_size(value).err()?;
    Some(FieldError::invalid(path.clone(), value, err))
}

fn both<T>(a: &Option<T>, b: &Option<T>) -> bool {
    a.is_some() && b.is_some()
}

fn client_settings_conflict(a: &ClientSettingsPolicySpec, b: &ClientSettingsPolicySpec) -> bool {
    let body = match (&a.body, &b.body) {
        (Some(a), Some(b)) => both(&a.max_size, &b.max_size) || both(&a.timeout, &b.timeout),
        _ => false,
    };
    let keep_alive = match (&a.keep_alive, &b.keep_alive) {
        (Some(a), Some(b)) => {
            both(&a.requests, &b.requests) || both(&a.time, &b.time) || both(&a.timeout, &b.timeout)
        }
        _ => false,
    };
    body || keep_alive
}

fn upstream_settings_conflict(a: &UpstreamSettingsPolicySpec, b: &UpstreamSettingsPolicySpec) -> bool {
    if both(&a.zone_size, &b.zone_size) {
        return true;
    }
    match (&a.keep_alive, &b.keep_alive) {
        (Some(a), Some(b)) => {
            both(&a.connections, &b.connections)
                || both(&a.requests, &b.requests)
                || both(&a.time, &b.time)
                || both(&a.timeout, &b.timeout)
        }
        _ => false,
    }
}

// === impl PolicyKind ===

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::ClientSettings,
        PolicyKind::Observability,
        PolicyKind::UpstreamSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSettings => "ClientSettingsPolicy",
            Self::Observability => "ObservabilityPolicy",
            Self::UpstreamSettings => "UpstreamSettingsPolicy",
        }
    }
}

// === impl PolicySource ===

impl PolicySource {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::ClientSettings(_) => PolicyKind::ClientSettings,
            Self::Observability(_) => PolicyKind::Observability,
            Self::UpstreamSettings(_) => PolicyKind::UpstreamSettings,
        }
    }

    pub fn id(&self) -> ResourceId {
        match self {
            Self::ClientSettings(p) => ResourceId::of(p),
            Self::Observability(p) => ResourceId::of(p),
            Self::UpstreamSettings(p) => ResourceId::of(p),
        }
    }

    pub fn key(&self) -> PolicyKey {
        PolicyKey {
            kind: self.kind(),
            id: self.id(),
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ClientSettings(p) => p.meta(),
            Self::Observability(p) => p.meta(),
            Self::UpstreamSettings(p) => p.meta(),
        }
    }

    pub fn status(&self) -> Option<&PolicyStatus> {
        match self {
            Self::ClientSettings(p) => p.status.as_ref(),
            Self::Observability(p) => p.status.as_ref(),
            Self::UpstreamSettings(p) => p.status.as_ref(),
        }
    }

    pub fn target_refs(&self) -> Vec<&LocalPolicyTargetReference> {
        match self {
            Self::ClientSettings(p) => vec![&p.spec.target_ref],
            Self::Observability(p) => p.spec.target_refs.iter().collect(),
            Self::UpstreamSettings(p) => p.spec.target_refs.iter().collect(),
        }
    }

    fn validate(&self) -> ErrorList {
        match self {
            Self::ClientSettings(p) => validate_client_settings(&p.spec),
            Self::Observability(p) => validate_observability(&p.spec),
            Self::UpstreamSettings(p) => validate_upstream_settings(&p.spec),
        }
    }

    /// Returns true when both policies are of the same kind and set the same
    /// field.
    fn conflicts_with(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ClientSettings(a), Self::ClientSettings(b)) => {
                client_settings_conflict(&a.spec, &b.spec)
            }
            (Self::Observability(a), Self::Observability(b)) => {
                both(&a.spec.tracing, &b.spec.tracing)
            }
            (Self::UpstreamSettings(a), Self::UpstreamSettings(b)) => {
                upstream_settings_conflict(&a.spec, &b.spec)
            }
            _ => false,
        }
    }

    fn invalid_for_gateway(&self, gateway: Option<&Gateway>) -> Option<Condition> {
        let Self::Observability(p) = self else {
            return None;
        };
        p.spec.tracing.as_ref()?;
        let telemetry = gateway?
            .effective_nginx_proxy
            .as_ref()
            .is_some_and(|np| np.telemetry_enabled());
        if telemetry {
            return None;
        }
        Some(conditions::policy_not_accepted_nginx_proxy_not_set(
            TELEMETRY_NOT_ENABLED,
        ))
    }
}

// === impl Policy ===

impl Policy {
    fn shares_target(&self, other: &Policy) -> bool {
        self.targets.iter().any(|t| other.targets.contains(t))
    }
}

// === impl TargetKind ===

impl TargetKind {
    /// Parses the kinds of objects that policies may target in the graph.
    pub fn parse(group: &str, kind: &str) -> Option<Self> {
        match (group, kind) {
            (GROUP, "Gateway") => Some(Self::Gateway),
            (GROUP, "HTTPRoute") => Some(Self::HttpRoute),
            (GROUP, "GRPCRoute") => Some(Self::GrpcRoute),
            ("" | "core", "Service") => Some(Self::Service),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "Gateway",
            Self::HttpRoute => "HTTPRoute",
            Self::GrpcRoute => "GRPCRoute",
            Self::Service => "Service",
        }
    }
}

// === impl PolicyTarget ===

impl PolicyTarget {
    fn route_key(&self) -> Option<RouteKey> {
        let kind = match self.kind {
            TargetKind::HttpRoute => L7RouteKind::Http,
            TargetKind::GrpcRoute => L7RouteKind::Grpc,
            TargetKind::Gateway | TargetKind::Service => return None,
        };
        Some(RouteKey::new(self.id.clone(), kind))
    }
}

// === impl PolicyContext ===

impl PolicyContext<'_> {
    /// The targets of `source` that exist in the graph, deduplicated.
    fn resolve_targets(&self, source: &PolicySource) -> Vec<PolicyTarget> {
        let ns = source.metadata().namespace.clone().unwrap_or_default();
        let mut targets = Vec::new();
        for r in source.target_refs() {
            let Some(kind) = TargetKind::parse(&r.group, &r.kind) else {
                continue;
            };
            let target = PolicyTarget {
                kind,
                id: ResourceId::new(ns.clone(), r.name.clone()),
            };
            if self.contains(&target) && !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    fn contains(&self, target: &PolicyTarget) -> bool {
        match target.kind {
            TargetKind::Gateway => self.gateways.contains_key(&target.id),
            TargetKind::Service => self.services.contains_key(&target.id),
            TargetKind::HttpRoute | TargetKind::GrpcRoute => target
                .route_key()
                .is_some_and(|key| self.routes.contains_key(&key)),
        }
    }

    /// The gateways a policy reaches through `target`. A route reaches only
    /// the gateways it is attached to.
    fn target_gateways(&self, target: &PolicyTarget) -> Vec<ResourceId> {
        match target.kind {
            TargetKind::Gateway => vec![target.id.clone()],
            TargetKind::Service => self
                .services
                .get(&target.id)
                .map(|svc| svc.gateways.iter().cloned().collect())
                .unwrap_or_default(),
            TargetKind::HttpRoute | TargetKind::GrpcRoute => target
                .route_key()
                .and_then(|key| self.routes.get(&key))
                .filter(|route| route.valid)
                .map(|route| {
                    route
                        .parent_refs
                        .iter()
                        .filter(|p| p.is_attached())
                        .map(|p| p.gateway.id.clone())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn push_policy(&mut self, target: &PolicyTarget, key: &PolicyKey) {
        let policies = match target.kind {
            TargetKind::Gateway => self.gateways.get_mut(&target.id).map(|gw| &mut gw.policies),
            TargetKind::Service => self.services.get_mut(&target.id).map(|svc| &mut svc.policies),
            TargetKind::HttpRoute | TargetKind::GrpcRoute => match target.route_key() {
                Some(route) => self.routes.get_mut(&route).map(|r| &mut r.policies),
                None => None,
            },
        };
        if let Some(policies) = policies {
            if !policies.contains(key) {
                policies.push(key.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests;

use crate::{
    gateway::ProtectedPorts,
    reference_grant::{FromResource, RefGrantResolver, ToResource},
    route::{L4RouteKey, RouteKey, RouteKind},
    secret::{SecretResolver, SECRET_TYPE_TLS},
};
use nginx_gateway_controller_core::{
    conditions::{self, types},
    hostname, Condition, ErrorList, FieldError, Path, ResourceId,
};
use nginx_gateway_controller_k8s_api::{
    gateway::{self as api, AllowedRoutes, FromNamespaces, TlsModeType, GROUP},
    Labels, Namespace, Selector,
};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq)]
pub struct Listener {
    pub name: String,

    /// The gateway that owns this listener.
    pub gateway: ResourceId,
    pub source: api::Listener,

    /// `None` when the listener's protocol is not supported.
    pub protocol: Option<Protocol>,
    pub conditions: Vec<Condition>,

    /// Compiled from `allowedRoutes.namespaces.selector` when `from` is `Selector`.
    pub allowed_route_label_selector: Option<Selector>,
    pub supported_kinds: Vec<RouteKind>,

    /// L7 routes attached to this listener.
    pub routes: BTreeSet<RouteKey>,

    /// L4 routes attached to this listener.
    pub l4_routes: BTreeSet<L4RouteKey>,

    /// The TLS secret of an HTTPS listener.
    pub resolved_secret: Option<ResourceId>,
    pub valid: bool,

    /// Routes may attach to invalid listeners so that they can report why
    /// they are not programmed. Listeners with an unusable protocol or port
    /// are not attachable at all.
    pub attachable: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Http,
    Https,
    Tls,
    Tcp,
    Udp,
}

pub(crate) struct ListenerContext<'a, 's> {
    pub gateway: &'a ResourceId,
    pub protected_ports: &'a ProtectedPorts,
    pub ref_grants: &'a RefGrantResolver,
    pub secrets: &'a mut SecretResolver<'s>,
}

pub(crate) fn build_listeners(
    mut ctx: ListenerContext<'_, '_>,
    sources: &[api::Listener],
) -> Vec<Listener> {
    let mut listeners = sources
        .iter()
        .map(|source| build(&mut ctx, source))
        .collect::<Vec<_>>();

    resolve_conflicts(&mut listeners);

    for listener in &mut listeners {
        listener.finalize();
    }
    listeners
}

fn build(ctx: &mut ListenerContext<'_, '_>, source: &api::Listener) -> Listener {
    let mut listener = Listener {
        name: source.name.clone(),
        gateway: ctx.gateway.clone(),
        source: source.clone(),
        protocol: Protocol::parse(&source.protocol),
        conditions: Vec::new(),
        allowed_route_label_selector: None,
        supported_kinds: Vec::new(),
        routes: BTreeSet::new(),
        l4_routes: BTreeSet::new(),
        resolved_secret: None,
        valid: true,
        attachable: true,
    };

    let Some(protocol) = listener.protocol else {
        let err = FieldError::not_supported(
            Path::new("protocol"),
            &source.protocol,
            Protocol::ALL.iter().map(|p| p.as_str()),
        );
        listener.fail(conditions::listener_unsupported_protocol(err));
        listener.attachable = false;
        return listener;
    };

    listener.validate_port(ctx.protected_ports);

    if protocol.uses_hostname() {
        if let Some(host) = source.hostname.as_deref() {
            if let Err(e) = hostname::validate(host) {
                listener.fail(conditions::listener_unsupported_value(FieldError::invalid(
                    Path::new("hostname"),
                    host,
                    e,
                )));
            }
        }
    }

    match protocol {
        Protocol::Https => listener.validate_https(ctx),
        Protocol::Tls => listener.validate_tls_passthrough(),
        Protocol::Http | Protocol::Tcp | Protocol::Udp => {
            if source.tls.is_some() {
                listener.fail(conditions::listener_unsupported_value(FieldError::forbidden(
                    Path::new("tls"),
                    format!("tls is not supported for {} listener", protocol.as_str()),
                )));
            }
        }
    }

    let (kinds, err) = supported_kinds(protocol, source.allowed_routes.as_ref());
    listener.supported_kinds = kinds;
    if let Some(msg) = err {
        listener
            .conditions
            .push(conditions::listener_invalid_route_kinds(msg));
    }

    listener.compile_selector();
    listener
}

/// Filters the requested route kinds to those the protocol can serve,
/// describing any that were dropped.
fn supported_kinds(
    protocol: Protocol,
    allowed: Option<&AllowedRoutes>,
) -> (Vec<RouteKind>, Option<String>) {
    let requested = allowed
        .and_then(|a| a.kinds.as_ref())
        .filter(|kinds| !kinds.is_empty());
    let Some(requested) = requested else {
        return (protocol.route_kinds().to_vec(), None);
    };

    let path = Path::new("allowedRoutes").child("kinds");
    let mut kinds = Vec::new();
    let mut errs = ErrorList::new();
    for (i, rgk) in requested.iter().enumerate() {
        let group_ok = rgk.group.as_deref().is_none_or(|g| g == GROUP);
        let kind = RouteKind::parse(&rgk.kind).filter(|k| protocol.route_kinds().contains(k));
        match kind {
            Some(kind) if group_ok => {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
            _ => errs.push(FieldError::not_supported(
                path.index(i),
                &rgk.kind,
                protocol.route_kinds().iter().map(|k| k.as_str()),
            )),
        }
    }

    (kinds, errs.aggregate())
}

/// Marks every attachable listener that shares a port with an incompatible
/// protocol, or with the same hostname, as conflicted.
fn resolve_conflicts(listeners: &mut [Listener]) {
    let mut by_port = BTreeMap::<i32, Vec<usize>>::new();
    for (i, l) in listeners.iter().enumerate() {
        if l.attachable && l.protocol.is_some() {
            by_port.entry(l.source.port).or_default().push(i);
        }
    }

    for (port, idxs) in by_port {
        let protocol = |i: usize| listeners[i].protocol;

        let protocol_conflicts = idxs
            .iter()
            .copied()
            .filter(|&i| {
                idxs.iter().any(|&j| match (protocol(i), protocol(j)) {
                    (Some(a), Some(b)) => !a.compatible(b),
                    _ => false,
                })
            })
            .collect::<Vec<_>>();
        for &i in &protocol_conflicts {
            listeners[i].fail(conditions::listener_protocol_conflict(format!(
                "Multiple listeners for the same port {port} specify incompatible protocols; \
                 ensure only one protocol per port"
            )));
        }

        let mut by_hostname = BTreeMap::<&str, Vec<usize>>::new();
        for &i in &idxs {
            if protocol_conflicts.contains(&i) {
                continue;
            }
            let l = &listeners[i];
            if l.protocol.is_some_and(Protocol::uses_hostname) {
                let host = l.source.hostname.as_deref().unwrap_or_default();
                by_hostname.entry(host).or_default().push(i);
            }
        }
        let hostname_conflicts = by_hostname
            .into_iter()
            .filter(|(_, idxs)| idxs.len() > 1)
            .map(|(host, idxs)| (host.to_string(), idxs))
            .collect::<Vec<_>>();
        for (host, idxs) in hostname_conflicts {
            for i in idxs {
                listeners[i].fail(conditions::listener_hostname_conflict(format!(
                    "Multiple listeners for the same port {port} specify the same hostname {host:?}; \
                     ensure only one listener per hostname and port"
                )));
            }
        }
    }
}

// === impl Listener ===

impl Listener {
    fn fail(&mut self, conds: Vec<Condition>) {
        self.valid = false;
        self.conditions.extend(conds);
    }

    fn validate_port(&mut self, protected: &ProtectedPorts) {
        let port = self.source.port;
        let err = if !(1..=65535).contains(&port) {
            FieldError::invalid(Path::new("port"), port, "port must be between 1-65535")
        } else if let Some(owner) = protected.get(&port) {
            FieldError::invalid(
                Path::new("port"),
                port,
                format!("port is already in use as {owner}"),
            )
        } else {
            return;
        };

        self.fail(conditions::listener_unsupported_value(err));
        self.attachable = false;
    }

    fn validate_https(&mut self, ctx: &mut ListenerContext<'_, '_>) {
        let Some(tls) = self.source.tls.clone() else {
            self.fail(conditions::listener_unsupported_value(FieldError::required(
                Path::new("tls"),
                "tls must be defined for HTTPS listener",
            )));
            return;
        };
        let path = Path::new("tls");

        if tls.mode.unwrap_or(TlsModeType::Terminate) != TlsModeType::Terminate {
            self.fail(conditions::listener_unsupported_value(
                FieldError::not_supported(path.child("mode"), "Passthrough", ["Terminate"]),
            ));
        }

        if tls.options.as_ref().is_some_and(|o| !o.is_empty()) {
            self.conditions
                .push(conditions::listener_accepted_unsupported_field(
                    FieldError::forbidden(path.child("options"), "options are not supported"),
                ));
        }

        let refs = tls.certificate_refs.unwrap_or_default();
        let refs_path = path.child("certificateRefs");
        let cert = match refs.as_slice() {
            [cert] => cert,
            [] => {
                self.fail(conditions::listener_invalid_certificate_ref(
                    FieldError::required(refs_path, "must specify exactly one certificateRef"),
                ));
                return;
            }
            refs => {
                self.fail(conditions::listener_unsupported_value(FieldError::too_many(
                    refs_path,
                    refs.len(),
                    1,
                )));
                return;
            }
        };
        let path = refs_path.index(0);

        let kind = cert.kind.as_deref().unwrap_or("Secret");
        if kind != "Secret" {
            self.fail(conditions::listener_invalid_certificate_ref(
                FieldError::not_supported(path.child("kind"), kind, ["Secret"]),
            ));
            return;
        }
        let group = cert.group.as_deref().unwrap_or_default();
        if !group.is_empty() && group != "core" {
            self.fail(conditions::listener_invalid_certificate_ref(
                FieldError::not_supported(path.child("group"), group, ["", "core"]),
            ));
            return;
        }

        let id = ResourceId::new(
            cert.namespace
                .clone()
                .unwrap_or_else(|| self.gateway.namespace.clone()),
            cert.name.clone(),
        );
        if !ctx.ref_grants.allowed(
            &ToResource::secret(&id),
            &FromResource::gateway(&self.gateway.namespace),
        ) {
            self.fail(conditions::listener_ref_not_permitted(format!(
                "Certificate ref to secret {id} not permitted by any ReferenceGrant"
            )));
            return;
        }

        let secret = ctx.secrets.resolve(&id);
        let err = match &secret.error {
            Some(e) => Some(e.to_string()),
            None if secret.secret_type() != Some(SECRET_TYPE_TLS) => {
                Some(format!("secret must be of type {SECRET_TYPE_TLS}"))
            }
            None => None,
        };
        match err {
            Some(e) => self.fail(conditions::listener_invalid_certificate_ref(
                FieldError::invalid(path, id.to_string(), e),
            )),
            None => self.resolved_secret = Some(id),
        }
    }

    fn validate_tls_passthrough(&mut self) {
        let path = Path::new("tls");
        let Some(tls) = self.source.tls.as_ref() else {
            self.fail(conditions::listener_unsupported_value(FieldError::required(
                path,
                "tls must be defined for TLS listener",
            )));
            return;
        };

        let mut errs = ErrorList::new();
        if tls.mode != Some(TlsModeType::Passthrough) {
            errs.push(FieldError::required(
                path.child("mode"),
                "Mode must be passthrough for TLS listener",
            ));
        }
        if tls.certificate_refs.as_ref().is_some_and(|r| !r.is_empty()) {
            errs.push(FieldError::forbidden(
                path.child("certificateRefs"),
                "certificateRefs are not supported for TLS listener",
            ));
        }
        if let Some(msg) = errs.aggregate() {
            self.fail(conditions::listener_unsupported_value(msg));
        }
    }

    fn compile_selector(&mut self) {
        let Some(namespaces) = self
            .source
            .allowed_routes
            .as_ref()
            .and_then(|a| a.namespaces.as_ref())
        else {
            return;
        };
        if namespaces.from != Some(FromNamespaces::Selector) {
            return;
        }

        let path = Path::new("allowedRoutes").child("namespaces").child("selector");
        let res = match namespaces.selector.as_ref() {
            None => Err(FieldError::required(
                path,
                "selector must be set when from is Selector",
            )),
            Some(selector) => Selector::try_from(selector)
                .map_err(|e| FieldError::invalid(path, "Selector", e)),
        };
        match res {
            Ok(selector) => self.allowed_route_label_selector = Some(selector),
            Err(e) => self.fail(conditions::listener_unsupported_value(e)),
        }
    }

    fn finalize(&mut self) {
        if !self.valid {
            return;
        }
        if !self.conditions.iter().any(|c| c.type_ == types::ACCEPTED) {
            self.conditions.insert(0, conditions::listener_accepted());
        }
        self.conditions.push(conditions::listener_programmed());
        if !self.conditions.iter().any(|c| c.type_ == types::RESOLVED_REFS) {
            self.conditions.push(conditions::listener_resolved_refs());
        }
    }

    /// The listener's hostname, if its protocol matches on hostnames.
    pub fn hostname(&self) -> Option<&str> {
        if self.protocol.is_some_and(Protocol::uses_hostname) {
            self.source.hostname.as_deref()
        } else {
            None
        }
    }

    pub fn port(&self) -> i32 {
        self.source.port
    }

    pub fn allows_kind(&self, kind: RouteKind) -> bool {
        self.supported_kinds.contains(&kind)
    }

    /// Whether routes in `route_ns` may attach to this listener.
    ///
    /// # Panics
    ///
    /// When the listener selects namespaces by label and `route_ns` is not in
    /// `namespaces`. Every route's namespace must be part of the snapshot.
    pub fn allows_route_namespace(
        &self,
        route_ns: &str,
        namespaces: &BTreeMap<ResourceId, Namespace>,
    ) -> bool {
        let from = self
            .source
            .allowed_routes
            .as_ref()
            .and_then(|a| a.namespaces.as_ref())
            .and_then(|n| n.from)
            .unwrap_or(FromNamespaces::Same);

        match from {
            FromNamespaces::All => true,
            FromNamespaces::Same => route_ns == self.gateway.namespace,
            FromNamespaces::Selector => {
                let Some(selector) = self.allowed_route_label_selector.as_ref() else {
                    return false;
                };
                let ns = namespaces
                    .get(&ResourceId::cluster(route_ns.to_string()))
                    .unwrap_or_else(|| panic!("namespace {route_ns} must exist in the snapshot"));
                selector.matches(&Labels::from(ns.metadata.labels.clone()))
            }
        }
    }
}

// === impl Protocol ===

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Http,
        Protocol::Https,
        Protocol::Tls,
        Protocol::Tcp,
        Protocol::Udp,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tls => "TLS",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }

    /// The route kinds a listener of this protocol serves by default.
    pub fn route_kinds(&self) -> &'static [RouteKind] {
        match self {
            Self::Http | Self::Https => &[RouteKind::Http, RouteKind::Grpc],
            Self::Tls => &[RouteKind::Tls],
            Self::Tcp => &[RouteKind::Tcp],
            Self::Udp => &[RouteKind::Udp],
        }
    }

    pub fn uses_hostname(self) -> bool {
        matches!(self, Self::Http | Self::Https | Self::Tls)
    }

    /// Whether listeners of both protocols may share a port.
    pub fn compatible(self, other: Self) -> bool {
        use Protocol::*;
        self == other || matches!((self, other), (Https, Tls) | (Tls, Https) | (Tcp, Udp) | (Udp, Tcp))
    }
}

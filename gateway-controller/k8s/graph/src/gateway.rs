use crate::{
    config::FeatureFlags,
    gateway_class::GatewayClass,
    listener::{self, Listener, ListenerContext},
    nginx_proxy::{self, EffectiveNginxProxy, NginxProxy, NGINX_PROXY_KIND},
    policy::PolicyKey,
    reference_grant::{FromResource, RefGrantResolver, ToResource},
    secret::SecretResolver,
};
use nginx_gateway_controller_core::{
    conditions, field, Condition, FieldError, Path, ResourceId,
};
use nginx_gateway_controller_k8s_api::gateway::{self as api, LocalParametersReference};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Ports a listener may not use, keyed by port, naming what owns them.
pub type ProtectedPorts = BTreeMap<i32, &'static str>;

const METRICS_PORT_NAME: &str = "MetricsPort";

const IP_ADDRESS_TYPE: &str = "IPAddress";

/// Kubernetes object names may be at most this long.
const MAX_NAME_LEN: usize = 63;
const NAME_HASH_LEN: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct Gateway {
    pub source: api::Gateway,

    /// Empty when the gateway is invalid.
    pub listeners: Vec<Listener>,

    /// The NginxProxy referenced by the gateway's `infrastructure.parametersRef`.
    pub nginx_proxy: Option<ResourceId>,

    /// Present only when at least one valid proxy applies to the gateway.
    pub effective_nginx_proxy: Option<EffectiveNginxProxy>,

    /// The client certificate used for backend TLS.
    pub secret_ref: Option<ResourceId>,

    /// The NGINX deployment provisioned for this gateway.
    pub deployment_name: ResourceId,
    pub protected_ports: ProtectedPorts,
    pub conditions: Vec<Condition>,
    pub policies: Vec<PolicyKey>,
    pub valid: bool,
}

/// The inputs shared by every gateway built in one pass.
pub(crate) struct GatewayContext<'a, 's> {
    pub class: Option<&'a GatewayClass>,
    pub proxies: &'a BTreeMap<ResourceId, NginxProxy>,
    pub ref_grants: &'a RefGrantResolver,
    pub secrets: &'a mut SecretResolver<'s>,
    pub features: FeatureFlags,
}

/// Selects the gateways that name the configured GatewayClass.
pub(crate) fn process(
    gateways: &BTreeMap<ResourceId, api::Gateway>,
    class_name: &str,
) -> BTreeMap<ResourceId, api::Gateway> {
    gateways
        .iter()
        .filter(|(id, gw)| {
            let ours = gw.spec.gateway_class_name == class_name;
            if !ours {
                tracing::trace!(gateway = %id, class = %gw.spec.gateway_class_name, "Skipping gateway for another class");
            }
            ours
        })
        .map(|(id, gw)| (id.clone(), gw.clone()))
        .collect()
}

pub(crate) fn build_all(
    gateways: &BTreeMap<ResourceId, api::Gateway>,
    mut ctx: GatewayContext<'_, '_>,
) -> BTreeMap<ResourceId, Gateway> {
    gateways
        .iter()
        .map(|(id, gw)| (id.clone(), build(id, gw, &mut ctx)))
        .collect()
}

fn build(id: &ResourceId, gw: &api::Gateway, ctx: &mut GatewayContext<'_, '_>) -> Gateway {
    let params = gw
        .spec
        .infrastructure
        .as_ref()
        .and_then(|infra| infra.parameters_ref.as_ref());
    let proxies = ctx.proxies;
    let np_id = params
        .map(|p| ResourceId::new(id.namespace.clone(), p.name.clone()))
        .filter(|id| proxies.contains_key(id));
    let np = np_id.as_ref().and_then(|id| proxies.get(id));

    let class_np = ctx
        .class
        .and_then(|gc| gc.nginx_proxy.as_ref())
        .and_then(|id| proxies.get(id));
    let effective_nginx_proxy = EffectiveNginxProxy::build(class_np, np);

    let (mut conditions, valid, secret_ref) = validate(id, gw, ctx);
    conditions.extend(unsupported_fields(gw));
    if let Some(params) = params {
        conditions.extend(validate_parameters_ref(params, np));
    }

    let mut protected_ports = ProtectedPorts::new();
    if let Some(port) = nginx_proxy::metrics_port(effective_nginx_proxy.as_ref()) {
        protected_ports.insert(port, METRICS_PORT_NAME);
    }

    let listeners = if valid {
        listener::build_listeners(
            ListenerContext {
                gateway: id,
                protected_ports: &protected_ports,
                ref_grants: ctx.ref_grants,
                secrets: &mut *ctx.secrets,
            },
            &gw.spec.listeners,
        )
    } else {
        tracing::debug!(gateway = %id, "Gateway is invalid; skipping its listeners");
        Vec::new()
    };

    Gateway {
        source: gw.clone(),
        listeners,
        nginx_proxy: np_id,
        effective_nginx_proxy,
        secret_ref,
        deployment_name: ResourceId::new(
            id.namespace.clone(),
            resource_name(&id.name, &gw.spec.gateway_class_name),
        ),
        protected_ports,
        conditions,
        policies: Vec::new(),
        valid,
    }
}

/// Returns the gateway's blocking conditions, whether it is valid, and the
/// backend TLS client certificate it references.
fn validate(
    id: &ResourceId,
    gw: &api::Gateway,
    ctx: &mut GatewayContext<'_, '_>,
) -> (Vec<Condition>, bool, Option<ResourceId>) {
    let mut conds = Vec::new();

    match ctx.class {
        None => conds.extend(conditions::gateway_invalid(
            "The GatewayClass doesn't exist",
        )),
        Some(gc) if !gc.valid => conds.extend(conditions::gateway_invalid(
            "The GatewayClass is invalid",
        )),
        Some(_) => {}
    }

    for address in gw.spec.addresses.iter().flatten() {
        match address.type_.as_deref() {
            None => conds.push(conditions::gateway_unsupported_address(
                "The AddressType must be specified",
            )),
            Some(IP_ADDRESS_TYPE) => {}
            Some(_) => conds.push(conditions::gateway_unsupported_address(
                "Only AddressType IPAddress is supported",
            )),
        }
    }

    let mut secret_ref = None;
    let backend = gw.spec.tls.as_ref().and_then(|tls| tls.backend.as_ref());
    if let Some(backend) = backend {
        if !ctx.features.experimental {
            let err = FieldError::forbidden(
                Path::new("spec").child("tls"),
                "tls.backend is not supported when experimental features are disabled",
            );
            conds.extend(conditions::gateway_unsupported_value(err));
        } else if let Some(cert) = backend.client_certificate_ref.as_ref() {
            let secret = ResourceId::new(
                cert.namespace.clone().unwrap_or_else(|| id.namespace.clone()),
                cert.name.clone(),
            );

            if let Some(err) = ctx.secrets.resolve(&secret).error.as_ref() {
                let err = FieldError::invalid(
                    Path::new("backend.clientCertificateRef"),
                    secret.to_string(),
                    err,
                );
                conds.push(conditions::gateway_secret_ref_invalid(err));
            }

            if secret.namespace != id.namespace
                && !ctx.ref_grants.allowed(
                    &ToResource::secret(&secret),
                    &FromResource::gateway(&id.namespace),
                )
            {
                conds.push(conditions::gateway_secret_ref_not_permitted(format!(
                    "secret ref {secret} not permitted by any ReferenceGrant"
                )));
            }

            secret_ref = Some(secret);
        }
    }

    let valid = conds.is_empty();
    (conds, valid, secret_ref)
}

/// Fields we accept but ignore. These never affect validity.
fn unsupported_fields(gw: &api::Gateway) -> Vec<Condition> {
    let mut conds = Vec::new();
    if gw.spec.allowed_listeners.is_some() {
        conds.push(conditions::gateway_accepted_unsupported_field(
            "AllowedListeners",
        ));
    }
    if gw.spec.tls.as_ref().is_some_and(|tls| tls.frontend.is_some()) {
        conds.push(conditions::gateway_accepted_unsupported_field(
            "TLS.Frontend",
        ));
    }
    conds
}

fn validate_parameters_ref(
    params: &LocalParametersReference,
    np: Option<&NginxProxy>,
) -> Vec<Condition> {
    let path = Path::new("spec.infrastructure.parametersRef");

    if params.kind != NGINX_PROXY_KIND {
        let msg = field::capitalize(
            &FieldError::not_supported(path.child("kind"), &params.kind, [NGINX_PROXY_KIND])
                .to_string(),
        );
        return vec![
            conditions::gateway_ref_invalid(&msg),
            conditions::gateway_invalid_parameters(msg),
        ];
    }

    match np {
        None => vec![
            conditions::gateway_ref_not_found(),
            conditions::gateway_invalid_parameters(FieldError::not_found(
                path.child("name"),
                &params.name,
            )),
        ],
        Some(np) if !np.valid => {
            let msg = field::capitalize(&np.errors.aggregate().unwrap_or_default());
            vec![
                conditions::gateway_ref_invalid(&msg),
                conditions::gateway_invalid_parameters(msg),
            ]
        }
        Some(_) => vec![conditions::gateway_resolved_refs()],
    }
}

/// Builds a resource name of the form `<name>-<suffix>`.
///
/// Names longer than Kubernetes permits are truncated and disambiguated with
/// a short hash of the full name.
pub fn resource_name(name: &str, suffix: &str) -> String {
    let full = format!("{name}-{suffix}");
    if full.len() <= MAX_NAME_LEN {
        return full;
    }

    let digest = Sha256::digest(full.as_bytes());
    let hash = hex::encode(digest);
    let hash = &hash[..NAME_HASH_LEN];

    let max = MAX_NAME_LEN.saturating_sub(2 + NAME_HASH_LEN + suffix.len());
    let truncated = name.get(..max.min(name.len())).unwrap_or(name);
    format!("{truncated}-{hash}-{suffix}")
}

// === impl Gateway ===

impl Gateway {
    pub fn listener(&self, name: &str) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.name == name)
    }
}

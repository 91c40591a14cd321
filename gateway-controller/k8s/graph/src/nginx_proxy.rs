use crate::validation;
use nginx_gateway_controller_core::{ErrorList, FieldError, Path, ResourceId};
use nginx_gateway_controller_k8s_api::{
    gateway::{Gateway, GatewayClass},
    nginx::{
        AddressValue, DnsResolver, Metrics, NginxLogging, NginxProxy as NginxProxyResource,
        NginxProxySpec, RewriteClientIp, Telemetry, TelemetryExporter,
    },
};
use std::collections::{BTreeMap, BTreeSet};

pub const NGINX_PROXY_KIND: &str = "NginxProxy";

/// The port NGINX exposes Prometheus metrics on unless configured otherwise.
pub const DEFAULT_METRICS_PORT: i32 = 9113;

const MAX_TRUSTED_ADDRESSES: usize = 16;

const IP_FAMILIES: [&str; 3] = ["dual", "ipv4", "ipv6"];
const ERROR_LEVELS: [&str; 8] = [
    "debug", "info", "notice", "warn", "error", "crit", "alert", "emerg",
];
const REWRITE_CLIENT_IP_MODES: [&str; 2] = ["ProxyProtocol", "XForwardedFor"];
const TRUSTED_ADDRESS_TYPES: [&str; 3] = ["CIDR", "IPAddress", "Hostname"];
const DNS_ADDRESS_TYPES: [&str; 2] = ["IPAddress", "Hostname"];

#[derive(Clone, Debug, PartialEq)]
pub struct NginxProxy {
    pub source: NginxProxyResource,

    /// Empty when the proxy is valid.
    pub errors: ErrorList,
    pub valid: bool,
}

/// The merge of a GatewayClass-level proxy spec with a Gateway-level one.
/// Only valid proxies contribute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectiveNginxProxy(pub NginxProxySpec);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum IpFamily {
    #[default]
    Dual,
    Ipv4,
    Ipv6,
}

/// Processes the proxies referenced by the winning GatewayClass or by one of
/// our Gateways. Others are ignored.
pub(crate) fn process(
    proxies: &BTreeMap<ResourceId, NginxProxyResource>,
    class: Option<&GatewayClass>,
    gateways: &BTreeMap<ResourceId, Gateway>,
) -> BTreeMap<ResourceId, NginxProxy> {
    let mut referenced = BTreeSet::new();

    if let Some(params) = class.and_then(|gc| gc.spec.parameters_ref.as_ref()) {
        if params.kind == NGINX_PROXY_KIND {
            if let Some(ns) = params.namespace.as_ref() {
                referenced.insert(ResourceId::new(ns.clone(), params.name.clone()));
            }
        }
    }

    for (id, gw) in gateways {
        let params = gw
            .spec
            .infrastructure
            .as_ref()
            .and_then(|i| i.parameters_ref.as_ref());
        if let Some(params) = params.filter(|p| p.kind == NGINX_PROXY_KIND) {
            referenced.insert(ResourceId::new(id.namespace.clone(), params.name.clone()));
        }
    }

    referenced
        .into_iter()
        .filter_map(|id| {
            let source = proxies.get(&id)?;
            let errors = validate(&source.spec);
            let np = NginxProxy {
                source: source.clone(),
                valid: errors.is_empty(),
                errors,
            };
            Some((id, np))
        })
        .collect()
}

fn validate(spec: &NginxProxySpec) -> ErrorList {
    let path = Path::new("spec");
    let mut errs = ErrorList::new();

    if let Some(family) = spec.ip_family.as_deref() {
        if !IP_FAMILIES.contains(&family) {
            errs.push(FieldError::not_supported(
                path.child("ipFamily"),
                family,
                IP_FAMILIES,
            ));
        }
    }

    if let Some(telemetry) = spec.telemetry.as_ref() {
        errs.append(validate_telemetry(telemetry, &path.child("telemetry")));
    }

    if let Some(port) = spec.metrics.as_ref().and_then(|m| m.port) {
        if !(1..=65535).contains(&port) {
            errs.push(FieldError::invalid(
                path.child("metrics").child("port"),
                port,
                "must be between 1 and 65535",
            ));
        }
    }

    if let Some(level) = spec.logging.as_ref().and_then(|l| l.error_level.as_deref()) {
        if !ERROR_LEVELS.contains(&level) {
            errs.push(FieldError::not_supported(
                path.child("logging").child("errorLevel"),
                level,
                ERROR_LEVELS,
            ));
        }
    }

    if let Some(rewrite) = spec.rewrite_client_ip.as_ref() {
        errs.append(validate_rewrite_client_ip(
            rewrite,
            &path.child("rewriteClientIP"),
        ));
    }

    if let Some(resolver) = spec.dns_resolver.as_ref() {
        errs.append(validate_dns_resolver(resolver, &path.child("dnsResolver")));
    }

    errs
}

fn validate_telemetry(telemetry: &Telemetry, path: &Path) -> ErrorList {
    let mut errs = ErrorList::new();
    let Some(exporter) = telemetry.exporter.as_ref() else {
        return errs;
    };
    let path = path.child("exporter");

    if let Some(endpoint) = exporter.endpoint.as_deref() {
        if let Err(e) = validation::validate_endpoint(endpoint) {
            errs.push(FieldError::invalid(path.child("endpoint"), endpoint, e));
        }
    }

    if let Some(interval) = exporter.interval.as_deref() {
        if let Err(e) = validation::validate_nginx_duration(interval) {
            errs.push(FieldError::invalid(path.child("interval"), interval, e));
        }
    }

    errs
}

fn validate_rewrite_client_ip(rewrite: &RewriteClientIp, path: &Path) -> ErrorList {
    let mut errs = ErrorList::new();

    if let Some(mode) = rewrite.mode.as_deref() {
        if !REWRITE_CLIENT_IP_MODES.contains(&mode) {
            errs.push(FieldError::not_supported(
                path.child("mode"),
                mode,
                REWRITE_CLIENT_IP_MODES,
            ));
        }
    }

    let addrs = rewrite.trusted_addresses.as_deref().unwrap_or_default();
    let addrs_path = path.child("trustedAddresses");
    if addrs.len() > MAX_TRUSTED_ADDRESSES {
        errs.push(FieldError::too_many(
            addrs_path.clone(),
            addrs.len(),
            MAX_TRUSTED_ADDRESSES,
        ));
    }
    for (i, addr) in addrs.iter().enumerate() {
        if let Err(e) = validate_address(addr, &TRUSTED_ADDRESS_TYPES, &addrs_path.index(i)) {
            errs.push(e);
        }
    }

    errs
}

fn validate_dns_resolver(resolver: &DnsResolver, path: &Path) -> ErrorList {
    let mut errs = ErrorList::new();
    let addrs_path = path.child("addresses");

    if resolver.addresses.is_empty() {
        errs.push(FieldError::required(
            addrs_path.clone(),
            "at least one address must be specified",
        ));
    }
    for (i, addr) in resolver.addresses.iter().enumerate() {
        if let Err(e) = validate_address(addr, &DNS_ADDRESS_TYPES, &addrs_path.index(i)) {
            errs.push(e);
        }
    }

    for (name, value) in [
        ("timeout", resolver.timeout.as_deref()),
        ("cacheTTL", resolver.cache_ttl.as_deref()),
    ] {
        if let Some(value) = value {
            if let Err(e) = validation::validate_nginx_duration(value) {
                errs.push(FieldError::invalid(path.child(name), value, e));
            }
        }
    }

    errs
}

fn validate_address(addr: &AddressValue, types: &[&str], path: &Path) -> Result<(), FieldError> {
    let res = match addr.type_.as_str() {
        t if !types.contains(&t) => {
            return Err(FieldError::not_supported(
                path.child("type"),
                &addr.type_,
                types.iter().copied(),
            ));
        }
        "CIDR" => validation::validate_cidr(&addr.value),
        "IPAddress" => validation::validate_ip_address(&addr.value),
        _ => validation::validate_dns_name(&addr.value),
    };
    res.map_err(|e| FieldError::invalid(path.child("value"), &addr.value, e))
}

// === impl EffectiveNginxProxy ===

impl EffectiveNginxProxy {
    /// Merges the class-level and gateway-level proxies. Invalid proxies are
    /// skipped, and `None` is returned when neither contributes.
    pub fn build(class: Option<&NginxProxy>, gateway: Option<&NginxProxy>) -> Option<Self> {
        let class = class.filter(|np| np.valid).map(|np| &np.source.spec);
        let gateway = gateway.filter(|np| np.valid).map(|np| &np.source.spec);

        let spec = match (class, gateway) {
            (None, None) => return None,
            (Some(spec), None) | (None, Some(spec)) => spec.clone(),
            (Some(class), Some(gateway)) => {
                let mut spec = class.clone();
                spec.overlay(gateway.clone());
                spec
            }
        };
        Some(Self(spec))
    }

    pub fn ip_family(&self) -> IpFamily {
        match self.0.ip_family.as_deref() {
            Some("ipv4") => IpFamily::Ipv4,
            Some("ipv6") => IpFamily::Ipv6,
            _ => IpFamily::Dual,
        }
    }

    pub fn is_http2_disabled(&self) -> bool {
        self.0.disable_http2.unwrap_or(false)
    }

    pub fn has_dns_resolver(&self) -> bool {
        self.0.dns_resolver.is_some()
    }

    /// Returns true when an OpenTelemetry exporter endpoint is configured.
    pub fn telemetry_enabled(&self) -> bool {
        self.0
            .telemetry
            .as_ref()
            .and_then(|t| t.exporter.as_ref())
            .is_some_and(|e| e.endpoint.as_deref().is_some_and(|e| !e.is_empty()))
    }
}

/// Returns the metrics port for a gateway, or `None` when metrics are
/// disabled. Metrics are enabled by default.
pub fn metrics_port(np: Option<&EffectiveNginxProxy>) -> Option<i32> {
    let metrics = np.and_then(|np| np.0.metrics.as_ref());
    match metrics {
        Some(Metrics {
            disable: Some(true),
            ..
        }) => None,
        Some(Metrics {
            port: Some(port), ..
        }) => Some(*port),
        _ => Some(DEFAULT_METRICS_PORT),
    }
}

// === Overlay ===

/// Recursively replaces fields with those set on `top`.
trait Overlay {
    fn overlay(&mut self, top: Self);
}

fn overlay_opt<T: Overlay>(base: &mut Option<T>, top: Option<T>) {
    match (base.as_mut(), top) {
        (Some(base), Some(top)) => base.overlay(top),
        (None, top @ Some(_)) => *base = top,
        (_, None) => {}
    }
}

fn replace<T>(base: &mut Option<T>, top: Option<T>) {
    if top.is_some() {
        *base = top;
    }
}

impl Overlay for NginxProxySpec {
    fn overlay(&mut self, top: Self) {
        replace(&mut self.ip_family, top.ip_family);
        overlay_opt(&mut self.telemetry, top.telemetry);
        overlay_opt(&mut self.metrics, top.metrics);
        overlay_opt(&mut self.rewrite_client_ip, top.rewrite_client_ip);
        overlay_opt(&mut self.logging, top.logging);
        replace(&mut self.disable_http2, top.disable_http2);
        replace(&mut self.dns_resolver, top.dns_resolver);
    }
}

impl Overlay for Telemetry {
    fn overlay(&mut self, top: Self) {
        overlay_opt(&mut self.exporter, top.exporter);
        replace(&mut self.service_name, top.service_name);
        replace(&mut self.span_attributes, top.span_attributes);
        replace(&mut self.disabled_features, top.disabled_features);
    }
}

impl Overlay for TelemetryExporter {
    fn overlay(&mut self, top: Self) {
        replace(&mut self.interval, top.interval);
        replace(&mut self.batch_size, top.batch_size);
        replace(&mut self.batch_count, top.batch_count);
        replace(&mut self.endpoint, top.endpoint);
    }
}

impl Overlay for Metrics {
    fn overlay(&mut self, top: Self) {
        replace(&mut self.port, top.port);
        replace(&mut self.disable, top.disable);
    }
}

impl Overlay for RewriteClientIp {
    fn overlay(&mut self, top: Self) {
        replace(&mut self.mode, top.mode);
        replace(&mut self.set_ip_recursively, top.set_ip_recursively);
        replace(&mut self.trusted_addresses, top.trusted_addresses);
    }
}

impl Overlay for NginxLogging {
    fn overlay(&mut self, top: Self) {
        replace(&mut self.error_level, top.error_level);
        replace(&mut self.agent_level, top.agent_level);
    }
}

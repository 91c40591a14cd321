/// NginxProxy is a configuration object that can be referenced from a
/// GatewayClass or a Gateway parametersRef to provide global configuration to
/// the data plane. Gateway-level settings override class-level settings.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "gateway.nginx.org",
    version = "v1alpha2",
    kind = "NginxProxy",
    root = "NginxProxy",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NginxProxySpec {
    /// IPFamily specifies the IP family used in the NGINX listen directive:
    /// `dual`, `ipv4` or `ipv6`. Defaults to `dual`.
    pub ip_family: Option<String>,

    pub telemetry: Option<Telemetry>,

    pub metrics: Option<Metrics>,

    #[serde(rename = "rewriteClientIP")]
    pub rewrite_client_ip: Option<RewriteClientIp>,

    pub logging: Option<NginxLogging>,

    /// DisableHTTP2 turns off HTTP/2 in every server block. GRPCRoutes cannot
    /// attach to Gateways with HTTP/2 disabled.
    #[serde(rename = "disableHTTP2")]
    pub disable_http2: Option<bool>,

    /// DNSResolver configures the resolver used for ExternalName Services.
    #[serde(rename = "dnsResolver")]
    pub dns_resolver: Option<DnsResolver>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub exporter: Option<TelemetryExporter>,
    pub service_name: Option<String>,
    pub span_attributes: Option<Vec<SpanAttribute>>,
    pub disabled_features: Option<Vec<String>>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryExporter {
    /// Interval is the maximum interval between two exports, as an NGINX
    /// duration.
    pub interval: Option<String>,
    pub batch_size: Option<i32>,
    pub batch_count: Option<i32>,

    /// Endpoint is the `host[:port]` of the OTLP/gRPC collector.
    pub endpoint: Option<String>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct SpanAttribute {
    pub key: String,
    pub value: String,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Port where the Prometheus metrics are exposed. Defaults to 9113.
    pub port: Option<i32>,
    pub disable: Option<bool>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct RewriteClientIp {
    /// Mode is `ProxyProtocol` or `XForwardedFor`.
    pub mode: Option<String>,

    #[serde(rename = "setIPRecursively")]
    pub set_ip_recursively: Option<bool>,

    pub trusted_addresses: Option<Vec<AddressValue>>,
}

/// A typed address: `CIDR`, `IPAddress` or `Hostname`.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct AddressValue {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct NginxLogging {
    pub error_level: Option<String>,
    pub agent_level: Option<String>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct DnsResolver {
    pub timeout: Option<String>,

    #[serde(rename = "cacheTTL")]
    pub cache_ttl: Option<String>,

    #[serde(rename = "disableIPv6")]
    pub disable_ipv6: Option<bool>,

    /// Addresses of DNS servers. `IPAddress` and `Hostname` types are
    /// supported.
    pub addresses: Vec<AddressValue>,
}

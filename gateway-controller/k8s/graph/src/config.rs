use nginx_gateway_controller_core::DEFAULT_CONTROLLER_NAME;

/// Controls which resources the graph builder considers its own and which
/// gated features it honors.
#[derive(Clone, Debug, PartialEq, Eq, clap::Args, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// The name of the GatewayClass resource this controller owns.
    #[clap(long, default_value = "nginx", env = "NGF_GATEWAY_CLASS_NAME")]
    pub gateway_class_name: String,

    /// The controller name written into GatewayClass and status entries.
    #[clap(
        long = "gateway-ctlr-name",
        default_value = DEFAULT_CONTROLLER_NAME,
        env = "NGF_GATEWAY_CTLR_NAME"
    )]
    pub controller_name: String,

    /// Enables features that require NGINX Plus.
    #[clap(long = "nginx-plus", env = "NGF_NGINX_PLUS")]
    pub plus: bool,

    /// Enables experimental Gateway API features.
    #[clap(long = "experimental-features", env = "NGF_EXPERIMENTAL_FEATURES")]
    pub experimental: bool,
}

/// The subset of [`Config`] that gates optional route and gateway features.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub plus: bool,
    pub experimental: bool,
}

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_class_name: "nginx".to_string(),
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            plus: false,
            experimental: false,
        }
    }
}

impl Config {
    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags {
            plus: self.plus,
            experimental: self.experimental,
        }
    }
}

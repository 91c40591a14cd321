use crate::nginx_proxy::{NginxProxy, NGINX_PROXY_KIND};
use nginx_gateway_controller_core::{
    conditions::{self, reasons},
    field, Condition, ErrorList, FieldError, Path, ResourceId,
};
use nginx_gateway_controller_k8s_api::gateway::{self as api, ParametersReference};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayClass {
    pub source: api::GatewayClass,

    /// The NginxProxy named by `parametersRef`, if it was found.
    pub nginx_proxy: Option<ResourceId>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
}

/// The GatewayClasses this controller is responsible for.
#[derive(Debug, Default)]
pub(crate) struct ProcessedGatewayClasses<'s> {
    /// The class with the configured name, if it names our controller.
    pub winner: Option<&'s api::GatewayClass>,

    /// Other classes naming our controller. They are reported as conflicted.
    pub ignored: BTreeMap<ResourceId, api::GatewayClass>,
}

pub(crate) fn process<'s>(
    classes: &'s BTreeMap<ResourceId, api::GatewayClass>,
    class_name: &str,
    controller_name: &str,
) -> ProcessedGatewayClasses<'s> {
    let mut processed = ProcessedGatewayClasses::default();
    for (id, gc) in classes {
        let ours = gc.spec.controller_name == controller_name;
        if id.name == class_name {
            if ours {
                processed.winner = Some(gc);
            } else {
                tracing::debug!(name = %id, controller = %gc.spec.controller_name, "GatewayClass names another controller");
            }
        } else if ours {
            processed.ignored.insert(id.clone(), gc.clone());
        }
    }
    processed
}

pub(crate) fn build(
    gc: &api::GatewayClass,
    proxies: &BTreeMap<ResourceId, NginxProxy>,
) -> GatewayClass {
    let nginx_proxy = gc
        .spec
        .parameters_ref
        .as_ref()
        .and_then(|params| params.namespace.as_ref().map(|ns| (params, ns)))
        .map(|(params, ns)| ResourceId::new(ns.clone(), params.name.clone()))
        .filter(|id| proxies.contains_key(id));

    let mut conds = gc
        .spec
        .parameters_ref
        .as_ref()
        .map(|params| validate_parameters(params, nginx_proxy.as_ref().map(|id| &proxies[id])))
        .unwrap_or_default();
    if !conditions::has_reason(&conds, reasons::INVALID_PARAMETERS) {
        conds.insert(0, conditions::gateway_class_accepted());
    }

    GatewayClass {
        source: gc.clone(),
        nginx_proxy,
        conditions: conds,
        valid: true,
    }
}

fn validate_parameters(params: &ParametersReference, np: Option<&NginxProxy>) -> Vec<Condition> {
    let path = Path::new("spec").child("parametersRef");

    let mut errs = ErrorList::new();
    if params.kind != NGINX_PROXY_KIND {
        errs.push(FieldError::not_supported(
            path.child("kind"),
            &params.kind,
            [NGINX_PROXY_KIND],
        ));
    }
    if params.namespace.is_none() {
        errs.push(FieldError::required(
            path.child("namespace"),
            "ParametersRef must specify Namespace",
        ));
    }
    if let Some(msg) = errs.aggregate() {
        let msg = field::capitalize(&msg);
        return vec![
            conditions::gateway_class_ref_invalid(&msg),
            conditions::gateway_class_invalid_parameters(msg),
        ];
    }

    match np {
        None => vec![
            conditions::gateway_class_ref_not_found(),
            conditions::gateway_class_invalid_parameters(FieldError::not_found(
                path.child("name"),
                &params.name,
            )),
        ],
        Some(np) if !np.valid => {
            let msg = field::capitalize(&np.errors.aggregate().unwrap_or_default());
            vec![
                conditions::gateway_class_ref_invalid(&msg),
                conditions::gateway_class_invalid_parameters(msg),
            ]
        }
        Some(_) => vec![conditions::gateway_class_resolved_refs()],
    }
}

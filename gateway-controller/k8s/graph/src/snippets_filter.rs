use crate::extension_ref::{ExtensionRefFilter, ExtensionRefKind};
use nginx_gateway_controller_core::{conditions, Condition, ErrorList, FieldError, Path, ResourceId};
use nginx_gateway_controller_k8s_api::nginx;
use std::{collections::BTreeMap, fmt, str::FromStr};

#[derive(Clone, Debug, PartialEq)]
pub struct SnippetsFilter {
    pub source: nginx::SnippetsFilter,
    pub conditions: Vec<Condition>,

    /// Snippet values by the NGINX context they are inserted into. Empty
    /// when the filter is invalid.
    pub snippets: BTreeMap<NginxContext, String>,
    pub valid: bool,
    pub referenced: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NginxContext {
    Main,
    Http,
    HttpServer,
    HttpServerLocation,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown NGINX context {0:?}")]
pub struct UnknownContext(String);

// === impl NginxContext ===

impl NginxContext {
    pub const ALL: [NginxContext; 4] = [
        Self::Main,
        Self::Http,
        Self::HttpServer,
        Self::HttpServerLocation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Http => "http",
            Self::HttpServer => "http.server",
            Self::HttpServerLocation => "http.server.location",
        }
    }
}

impl FromStr for NginxContext {
    type Err = UnknownContext;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownContext(s.to_string()))
    }
}

impl fmt::Display for NginxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl SnippetsFilter ===

pub(crate) fn process(
    filters: &BTreeMap<ResourceId, nginx::SnippetsFilter>,
) -> BTreeMap<ResourceId, SnippetsFilter> {
    filters
        .iter()
        .map(|(id, sf)| {
            let filter = match validate(sf) {
                Ok(snippets) => SnippetsFilter {
                    source: sf.clone(),
                    conditions: vec![conditions::snippets_filter_accepted()],
                    snippets,
                    valid: true,
                    referenced: false,
                },
                Err(errs) => SnippetsFilter {
                    source: sf.clone(),
                    conditions: vec![conditions::snippets_filter_invalid(
                        errs.aggregate().unwrap_or_default(),
                    )],
                    snippets: BTreeMap::new(),
                    valid: false,
                    referenced: false,
                },
            };
            (id.clone(), filter)
        })
        .collect()
}

fn validate(sf: &nginx::SnippetsFilter) -> Result<BTreeMap<NginxContext, String>, ErrorList> {
    let path = Path::new("spec").child("snippets");
    let mut errs = ErrorList::new();
    let mut snippets = BTreeMap::new();

    if sf.spec.snippets.is_empty() {
        errs.push(FieldError::required(path, "at least one snippet must be specified"));
        return Err(errs);
    }

    for (i, snippet) in sf.spec.snippets.iter().enumerate() {
        let path = path.index(i);

        let context = match snippet.context.parse::<NginxContext>() {
            Ok(context) => context,
            Err(_) => {
                errs.push(FieldError::not_supported(
                    path.child("context"),
                    &snippet.context,
                    NginxContext::ALL.iter().map(NginxContext::as_str),
                ));
                continue;
            }
        };

        if snippet.value.is_empty() {
            errs.push(FieldError::required(
                path.child("value"),
                "value cannot be empty",
            ));
            continue;
        }

        if snippets.insert(context, snippet.value.clone()).is_some() {
            errs.push(FieldError::invalid(
                path.child("context"),
                &snippet.context,
                "only one snippet allowed per context",
            ));
        }
    }

    if errs.is_empty() {
        Ok(snippets)
    } else {
        Err(errs)
    }
}

/// Looks up a SnippetsFilter in the route's namespace, marking it as
/// referenced.
pub(crate) fn resolve(
    filters: &mut BTreeMap<ResourceId, SnippetsFilter>,
    namespace: &str,
    name: &str,
) -> Option<ExtensionRefFilter> {
    let id = ResourceId::new(namespace.to_string(), name.to_string());
    let sf = filters.get_mut(&id)?;
    sf.referenced = true;
    Some(ExtensionRefFilter {
        kind: ExtensionRefKind::SnippetsFilter,
        id,
        valid: sf.valid,
    })
}

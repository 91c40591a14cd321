use super::RuleErrors;
use crate::validation::{validate_nginx_duration, HttpFieldsValidator};
use nginx_gateway_controller_core::{FieldError, Path, ResourceId};
use nginx_gateway_controller_k8s_api::gateway::{
    CookieLifetimeType, HttpPathMatch, HttpRouteMatch, SessionPersistence, SessionPersistenceType,
};

/// Cookie-based session persistence for the backends of one rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionPersistenceConfig {
    pub name: String,

    /// Empty for session cookies.
    pub expiry: String,
    pub session_type: SessionPersistenceType,

    /// The cookie path, derived from the rule's path matches.
    pub path: String,

    /// Unique per route rule.
    pub idx: String,
    pub valid: bool,
}

/// Builds the session persistence of rule `rule_idx`. Problems are warnings:
/// an invalid configuration is ignored without affecting the rule.
pub(super) fn process(
    sp: &SessionPersistence,
    matches: Option<&[HttpRouteMatch]>,
    route: &ResourceId,
    rule_idx: usize,
    path: &Path,
    validator: &dyn HttpFieldsValidator,
) -> (Option<SessionPersistenceConfig>, RuleErrors) {
    let (expiry, mut errs) = validate(sp, path, validator);

    if !errs.warn.is_empty() {
        errs.warn.push(FieldError::invalid(
            path.clone(),
            path.as_str(),
            "session persistence is ignored because there are errors in the configuration",
        ));
        return (None, errs);
    }

    let session_cookie = sp
        .cookie_config
        .as_ref()
        .and_then(|c| c.lifetime_type)
        .is_some_and(|t| t == CookieLifetimeType::Session);
    let expiry = if sp.absolute_timeout.is_some() && session_cookie {
        String::new()
    } else {
        expiry
    };

    let idx = format!("{}_{}_{rule_idx}", route.name, route.namespace);
    let name = sp
        .session_name
        .clone()
        .unwrap_or_else(|| format!("sp_{idx}"));

    let config = SessionPersistenceConfig {
        name,
        expiry,
        session_type: sp.type_.unwrap_or(SessionPersistenceType::Cookie),
        // gRPC rules have no cookie path.
        path: matches.map(cookie_path).unwrap_or_default(),
        idx,
        valid: true,
    };
    (Some(config), errs)
}

fn validate(
    sp: &SessionPersistence,
    path: &Path,
    validator: &dyn HttpFieldsValidator,
) -> (String, RuleErrors) {
    let mut errs = RuleErrors::default();

    if let Some(type_) = sp.type_.filter(|t| *t != SessionPersistenceType::Cookie) {
        errs.warn.push(FieldError::not_supported(
            path.child("type"),
            format!("{type_:?}"),
            ["Cookie"],
        ));
    }

    if sp.idle_timeout.is_some() {
        errs.warn
            .push(FieldError::forbidden(path.child("idleTimeout"), "IdleTimeout"));
    }

    let mut expiry = String::new();
    if let Some(timeout) = sp.absolute_timeout.as_deref() {
        if validator.skip_validation() {
            expiry = timeout.to_string();
        } else {
            match validate_nginx_duration(timeout) {
                Ok(()) => expiry = timeout.to_string(),
                Err(e) => errs
                    .warn
                    .push(FieldError::invalid(path.child("absoluteTimeout"), timeout, e)),
            }
        }
    }

    (expiry, errs)
}

/// The longest common path prefix of the rule's Exact and PathPrefix
/// matches, by path segment.
fn cookie_path(matches: &[HttpRouteMatch]) -> String {
    let paths = matches
        .iter()
        .map(|m| match m.path.clone().unwrap_or_default() {
            HttpPathMatch::Exact { value } | HttpPathMatch::PathPrefix { value } => value,
            HttpPathMatch::RegularExpression { .. } => String::new(),
        })
        .collect::<Vec<_>>();
    longest_common_path_prefix(&paths)
}

fn longest_common_path_prefix(paths: &[String]) -> String {
    let Some((first, rest)) = paths.split_first() else {
        return String::new();
    };

    let mut common = first.split('/').collect::<Vec<_>>();
    for p in rest {
        let n = common
            .iter()
            .zip(p.split('/'))
            .take_while(|(a, b)| *a == b)
            .count();
        common.truncate(n);
        if common.is_empty() {
            return String::new();
        }
    }

    common.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{NginxValidator, SkipValidator};
    use nginx_gateway_controller_k8s_api::gateway::CookieConfig;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn route() -> ResourceId {
        ResourceId::new("test".to_string(), "hr".to_string())
    }

    fn path() -> Path {
        Path::new("spec").child("rules").index(0).child("sessionPersistence")
    }

    fn prefix(value: &str) -> HttpRouteMatch {
        HttpRouteMatch {
            path: Some(HttpPathMatch::PathPrefix {
                value: value.to_string(),
            }),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::none(&[], "")]
    #[case::one(&["/foo/bar"], "/foo/bar")]
    #[case::siblings(&["/foo/bar", "/foo/baz"], "/foo")]
    #[case::nested(&["/foo/bar", "/foo/bar/b"], "/foo/bar")]
    #[case::disjoint(&["/foo", "/bar"], "")]
    fn finds_common_prefix(#[case] paths: &[&str], #[case] expected: &str) {
        let paths = paths.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        assert_eq!(longest_common_path_prefix(&paths), expected);
    }

    #[test]
    fn builds_cookie_config() {
        let sp = SessionPersistence {
            absolute_timeout: Some("10m".to_string()),
            type_: Some(SessionPersistenceType::Cookie),
            ..Default::default()
        };
        let matches = [prefix("/coffee/hot"), prefix("/coffee/cold")];
        let (config, errs) = process(
            &sp,
            Some(matches.as_slice()),
            &route(),
            2,
            &path(),
            &NginxValidator::default(),
        );
        assert!(errs.warn.is_empty());
        assert_eq!(
            config,
            Some(SessionPersistenceConfig {
                name: "sp_hr_test_2".to_string(),
                expiry: "10m".to_string(),
                session_type: SessionPersistenceType::Cookie,
                path: "/coffee".to_string(),
                idx: "hr_test_2".to_string(),
                valid: true,
            })
        );
    }

    #[test]
    fn session_cookies_do_not_expire() {
        let sp = SessionPersistence {
            session_name: Some("session".to_string()),
            absolute_timeout: Some("1h".to_string()),
            cookie_config: Some(CookieConfig {
                lifetime_type: Some(CookieLifetimeType::Session),
            }),
            ..Default::default()
        };
        let (config, _) = process(&sp, None, &route(), 0, &path(), &SkipValidator::default());
        let config = config.expect("config must be built");
        assert_eq!(config.name, "session");
        assert_eq!(config.expiry, "");
        assert_eq!(config.path, "");
    }

    #[test]
    fn ignores_invalid_config() {
        let sp = SessionPersistence {
            idle_timeout: Some("1h".to_string()),
            type_: Some(SessionPersistenceType::Header),
            ..Default::default()
        };
        let (config, errs) = process(&sp, None, &route(), 0, &path(), &NginxValidator::default());
        assert_eq!(config, None);
        assert_eq!(
            errs.warn.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                r#"spec.rules[0].sessionPersistence.type: Unsupported value: "Header": supported values: "Cookie""#,
                "spec.rules[0].sessionPersistence.idleTimeout: Forbidden: IdleTimeout",
                r#"spec.rules[0].sessionPersistence: Invalid value: "spec.rules[0].sessionPersistence": session persistence is ignored because there are errors in the configuration"#,
            ]
        );
    }
}

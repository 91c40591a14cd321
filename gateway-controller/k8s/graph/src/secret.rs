use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use nginx_gateway_controller_core::ResourceId;
use nginx_gateway_controller_k8s_api as k8s;
use std::collections::BTreeMap;

pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
pub const CA_CERT_KEY: &str = "ca.crt";
pub const AUTH_KEY: &str = "auth";

pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";
pub const SECRET_TYPE_HTPASSWD: &str = "nginx.org/htpasswd";

/// Validates Secrets on first reference and remembers the outcome for the
/// rest of the build.
#[derive(Debug)]
pub struct SecretResolver<'s> {
    secrets: &'s BTreeMap<ResourceId, k8s::Secret>,
    resolved: BTreeMap<ResourceId, ResolvedSecret>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSecret {
    pub source: Option<k8s::Secret>,
    pub cert_bundle: Option<CertificateBundle>,
    pub error: Option<SecretError>,
}

/// Key material gathered from a Secret or ConfigMap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateBundle {
    pub name: ResourceId,
    pub kind: &'static str,
    pub cert: Certificate,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Certificate {
    pub tls_cert: Vec<u8>,
    pub tls_private_key: Vec<u8>,
    pub ca_cert: Option<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("secret does not exist")]
    NotFound,

    #[error("tls secret is invalid: {0}")]
    InvalidTls(String),

    #[error(transparent)]
    InvalidCa(#[from] CaError),

    #[error("missing required key \"{AUTH_KEY}\" in secret type \"{SECRET_TYPE_HTPASSWD}\"")]
    MissingAuth,

    #[error("unsupported secret type \"{0}\"")]
    UnsupportedType(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CaError {
    #[error("the data field {CA_CERT_KEY} must hold a valid CERTIFICATE PEM block")]
    NotPem,

    #[error("the data field {CA_CERT_KEY} must hold a valid CERTIFICATE PEM block, but got '{0}'")]
    UnexpectedBlock(String),

    #[error("failed to validate certificate: {0}")]
    Invalid(String),
}

// === impl SecretResolver ===

impl<'s> SecretResolver<'s> {
    pub fn new(secrets: &'s BTreeMap<ResourceId, k8s::Secret>) -> Self {
        Self {
            secrets,
            resolved: BTreeMap::new(),
        }
    }

    pub fn resolve(&mut self, id: &ResourceId) -> &ResolvedSecret {
        let secrets = self.secrets;
        self.resolved
            .entry(id.clone())
            .or_insert_with(|| resolve_secret(id, secrets.get(id)))
    }

    pub fn into_resolved(self) -> BTreeMap<ResourceId, ResolvedSecret> {
        self.resolved
    }
}

fn resolve_secret(id: &ResourceId, secret: Option<&k8s::Secret>) -> ResolvedSecret {
    let Some(secret) = secret else {
        return ResolvedSecret {
            source: None,
            cert_bundle: None,
            error: Some(SecretError::NotFound),
        };
    };

    let data = |key: &str| {
        secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|v| v.0.as_slice())
    };

    let mut cert_bundle = None;
    let error = match secret.type_.as_deref().unwrap_or_default() {
        SECRET_TYPE_TLS => {
            let cert = data(TLS_CERT_KEY).unwrap_or_default();
            let key = data(TLS_PRIVATE_KEY_KEY).unwrap_or_default();
            let ca = data(CA_CERT_KEY);
            let res = validate_tls(cert, key).and_then(|()| match ca {
                Some(ca) => validate_ca(ca).map_err(SecretError::from),
                None => Ok(()),
            });
            cert_bundle = Some(CertificateBundle {
                name: id.clone(),
                kind: "Secret",
                cert: Certificate {
                    tls_cert: cert.to_vec(),
                    tls_private_key: key.to_vec(),
                    ca_cert: ca.map(<[u8]>::to_vec),
                },
            });
            res.err()
        }
        SECRET_TYPE_HTPASSWD => data(AUTH_KEY).is_none().then_some(SecretError::MissingAuth),
        other => Some(SecretError::UnsupportedType(other.to_string())),
    };

    ResolvedSecret {
        source: Some(secret.clone()),
        cert_bundle,
        error,
    }
}

// === impl ResolvedSecret ===

impl ResolvedSecret {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn secret_type(&self) -> Option<&str> {
        self.source.as_ref()?.type_.as_deref()
    }
}

/// Checks that a certificate chain and a private key are well-formed PEM.
fn validate_tls(cert: &[u8], key: &[u8]) -> Result<(), SecretError> {
    let certs = pem::parse_many(cert)
        .map_err(|e| SecretError::InvalidTls(format!("tls: {e}")))?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .collect::<Vec<_>>();
    if certs.is_empty() {
        return Err(SecretError::InvalidTls(
            "tls: failed to find any PEM data in certificate input".to_string(),
        ));
    }
    for c in &certs {
        x509_parser::parse_x509_certificate(c.contents())
            .map_err(|e| SecretError::InvalidTls(format!("x509: {e}")))?;
    }

    let has_key = pem::parse_many(key)
        .map_err(|e| SecretError::InvalidTls(format!("tls: {e}")))?
        .iter()
        .any(|p| p.tag().ends_with("PRIVATE KEY"));
    if !has_key {
        return Err(SecretError::InvalidTls(
            "tls: failed to find any PEM data in key input".to_string(),
        ));
    }

    Ok(())
}

/// Validates CA data, which may be raw PEM or base64-encoded PEM.
pub(crate) fn validate_ca(data: &[u8]) -> Result<(), CaError> {
    let decoded = BASE64.decode(data).ok();
    let data = decoded.as_deref().unwrap_or(data);

    let block = pem::parse(data).map_err(|_| CaError::NotPem)?;
    if block.tag() != "CERTIFICATE" {
        return Err(CaError::UnexpectedBlock(block.tag().to_string()));
    }
    x509_parser::parse_x509_certificate(block.contents())
        .map_err(|e| CaError::Invalid(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    pub(crate) struct TestCert {
        pub cert: String,
        pub key: String,
    }

    pub(crate) fn mk_cert() -> TestCert {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["example.com".to_string()])
                .expect("certificate must be generated");
        TestCert {
            cert: cert.pem(),
            key: key_pair.serialize_pem(),
        }
    }

    pub(crate) fn mk_secret(
        ns: &str,
        name: &str,
        type_: &str,
        data: BTreeMap<&str, &[u8]>,
    ) -> k8s::Secret {
        k8s::Secret {
            metadata: k8s::ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            type_: Some(type_.to_string()),
            data: Some(
                data.into_iter()
                    .map(|(k, v)| (k.to_string(), k8s::ByteString(v.to_vec())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub(crate) fn mk_tls_secret(ns: &str, name: &str) -> k8s::Secret {
        let TestCert { cert, key } = mk_cert();
        mk_secret(
            ns,
            name,
            SECRET_TYPE_TLS,
            btreemap! {
                TLS_CERT_KEY => cert.as_bytes(),
                TLS_PRIVATE_KEY_KEY => key.as_bytes(),
            },
        )
    }

    fn id(ns: &str, name: &str) -> ResourceId {
        ResourceId::new(ns.to_string(), name.to_string())
    }

    fn secrets(
        secrets: impl IntoIterator<Item = k8s::Secret>,
    ) -> BTreeMap<ResourceId, k8s::Secret> {
        secrets
            .into_iter()
            .map(|s| (ResourceId::of(&s), s))
            .collect()
    }

    #[test]
    fn resolves_tls_secret() {
        let secrets = secrets([mk_tls_secret("ns", "tls")]);
        let mut resolver = SecretResolver::new(&secrets);

        let resolved = resolver.resolve(&id("ns", "tls"));
        assert!(resolved.is_valid(), "{:?}", resolved.error);
        let bundle = resolved.cert_bundle.as_ref().expect("bundle must be set");
        assert_eq!(bundle.name, id("ns", "tls"));
        assert_eq!(bundle.kind, "Secret");
    }

    #[test]
    fn rejects_garbage_tls_secret() {
        let secrets = secrets([mk_secret(
            "ns",
            "tls",
            SECRET_TYPE_TLS,
            btreemap! {
                TLS_CERT_KEY => b"nope".as_slice(),
                TLS_PRIVATE_KEY_KEY => b"nope".as_slice(),
            },
        )]);
        let mut resolver = SecretResolver::new(&secrets);

        let err = resolver
            .resolve(&id("ns", "tls"))
            .error
            .clone()
            .expect("secret must be invalid");
        assert!(matches!(err, SecretError::InvalidTls(_)));
        assert!(err.to_string().starts_with("tls secret is invalid: "));
    }

    #[test]
    fn validates_tls_ca() {
        let TestCert { cert, key } = mk_cert();
        let ca = mk_cert().key;
        let secrets = secrets([mk_secret(
            "ns",
            "tls",
            SECRET_TYPE_TLS,
            btreemap! {
                TLS_CERT_KEY => cert.as_bytes(),
                TLS_PRIVATE_KEY_KEY => key.as_bytes(),
                CA_CERT_KEY => ca.as_bytes(),
            },
        )]);
        let mut resolver = SecretResolver::new(&secrets);

        assert_eq!(
            resolver.resolve(&id("ns", "tls")).error,
            Some(SecretError::InvalidCa(CaError::UnexpectedBlock(
                "PRIVATE KEY".to_string()
            )))
        );
    }

    #[test]
    fn htpasswd_requires_auth() {
        let secrets = secrets([
            mk_secret(
                "ns",
                "good",
                SECRET_TYPE_HTPASSWD,
                btreemap! { AUTH_KEY => b"user:pass".as_slice() },
            ),
            mk_secret("ns", "bad", SECRET_TYPE_HTPASSWD, btreemap! {}),
        ]);
        let mut resolver = SecretResolver::new(&secrets);

        assert!(resolver.resolve(&id("ns", "good")).is_valid());
        assert_eq!(
            resolver
                .resolve(&id("ns", "bad"))
                .error
                .as_ref()
                .map(ToString::to_string)
                .as_deref(),
            Some(r#"missing required key "auth" in secret type "nginx.org/htpasswd""#)
        );
    }

    #[test]
    fn rejects_unsupported_and_missing() {
        let secrets = secrets([mk_secret("ns", "opaque", "Opaque", btreemap! {})]);
        let mut resolver = SecretResolver::new(&secrets);

        assert_eq!(
            resolver
                .resolve(&id("ns", "opaque"))
                .error
                .as_ref()
                .map(ToString::to_string)
                .as_deref(),
            Some(r#"unsupported secret type "Opaque""#)
        );
        assert_eq!(
            resolver.resolve(&id("ns", "missing")).error,
            Some(SecretError::NotFound)
        );
        assert_eq!(resolver.resolve(&id("ns", "missing")).source, None);
    }

    #[test]
    fn memoizes_results() {
        let secrets = secrets([mk_tls_secret("ns", "tls")]);
        let mut resolver = SecretResolver::new(&secrets);
        let first = resolver.resolve(&id("ns", "tls")).clone();
        let second = resolver.resolve(&id("ns", "tls")).clone();
        assert_eq!(first, second);
        assert_eq!(resolver.into_resolved().len(), 1);
    }

    #[test]
    fn ca_accepts_base64() {
        let ca = mk_cert().cert;
        assert_eq!(validate_ca(ca.as_bytes()), Ok(()));
        assert_eq!(validate_ca(BASE64.encode(ca.as_bytes()).as_bytes()), Ok(()));
        assert_eq!(validate_ca(b"not a pem"), Err(CaError::NotPem));
    }
}

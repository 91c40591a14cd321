//! Field-level validation errors rendered the way the Kubernetes API server
//! renders them, so that messages surfaced in conditions read the same as
//! admission failures.

use std::fmt;

/// A dotted path to a field in a manifest, e.g. `spec.rules[0].matches[1].path`.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Path(String);

/// A value echoed back in an error message.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("{path}: Invalid value: {value}: {detail}")]
    Invalid {
        path: Path,
        value: Value,
        detail: String,
    },

    #[error("{path}: Required value: {detail}")]
    Required { path: Path, detail: String },

    #[error("{path}: Unsupported value: {value}: supported values: {}", quote_all(.supported))]
    NotSupported {
        path: Path,
        value: Value,
        supported: Vec<String>,
    },

    #[error("{path}: Forbidden: {detail}")]
    Forbidden { path: Path, detail: String },

    #[error("{path}: Not found: {value}")]
    NotFound { path: Path, value: Value },

    #[error("{path}: Too many: {actual}: must have at most {max} items")]
    TooMany {
        path: Path,
        actual: usize,
        max: usize,
    },

    #[error("{path}: Duplicate value: {value}")]
    Duplicate { path: Path, value: Value },
}

/// An ordered collection of field errors.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorList(Vec<FieldError>);

// === impl Path ===

impl Path {
    pub fn new(root: &str) -> Self {
        Self(root.to_string())
    }

    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            return Self::new(name);
        }
        Self(format!("{}.{name}", self.0))
    }

    pub fn index(&self, idx: usize) -> Self {
        Self(format!("{}[{idx}]", self.0))
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{key}]", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// === impl Value ===

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(i) => i.fmt(f),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(i: $t) -> Self {
                    Self::Int(i as i64)
                }
            }
        )*
    };
}

int_value!(i32, i64, u16, u32, usize);

// === impl FieldError ===

impl FieldError {
    pub fn invalid(path: Path, value: impl Into<Value>, detail: impl ToString) -> Self {
        Self::Invalid {
            path,
            value: value.into(),
            detail: detail.to_string(),
        }
    }

    pub fn required(path: Path, detail: impl ToString) -> Self {
        Self::Required {
            path,
            detail: detail.to_string(),
        }
    }

    pub fn not_supported<S: ToString>(
        path: Path,
        value: impl Into<Value>,
        supported: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::NotSupported {
            path,
            value: value.into(),
            supported: supported.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn forbidden(path: Path, detail: impl ToString) -> Self {
        Self::Forbidden {
            path,
            detail: detail.to_string(),
        }
    }

    pub fn not_found(path: Path, value: impl Into<Value>) -> Self {
        Self::NotFound {
            path,
            value: value.into(),
        }
    }

    pub fn too_many(path: Path, actual: usize, max: usize) -> Self {
        Self::TooMany { path, actual, max }
    }

    pub fn duplicate(path: Path, value: impl Into<Value>) -> Self {
        Self::Duplicate {
            path,
            value: value.into(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Invalid { path, .. }
            | Self::Required { path, .. }
            | Self::NotSupported { path, .. }
            | Self::Forbidden { path, .. }
            | Self::NotFound { path, .. }
            | Self::TooMany { path, .. }
            | Self::Duplicate { path, .. } => path,
        }
    }
}

fn quote_all(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// === impl ErrorList ===

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: FieldError) {
        self.0.push(err);
    }

    pub fn append(&mut self, mut other: ErrorList) {
        self.0.append(&mut other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Renders all errors as a single message.
    ///
    /// A lone error renders as itself; several render as `[e1, e2]`. Repeated
    /// messages are only rendered once.
    pub fn aggregate(&self) -> Option<String> {
        let mut msgs: Vec<String> = Vec::with_capacity(self.0.len());
        for err in &self.0 {
            let msg = err.to_string();
            if !msgs.contains(&msg) {
                msgs.push(msg);
            }
        }

        match msgs.len() {
            0 => None,
            1 => msgs.pop(),
            _ => Some(format!("[{}]", msgs.join(", "))),
        }
    }
}

impl From<FieldError> for ErrorList {
    fn from(err: FieldError) -> Self {
        Self(vec![err])
    }
}

impl FromIterator<FieldError> for ErrorList {
    fn from_iter<T: IntoIterator<Item = FieldError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<FieldError> for ErrorList {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for ErrorList {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Upper-cases the first character of a message.
pub fn capitalize(msg: &str) -> String {
    let mut chars = msg.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

use thiserror::Error;

/// Errors raised while evaluating a configuration.
///
/// Any of these aborts the whole evaluation pass. [`EvalError::InBlock`] wraps an error with the
/// address of the block that was being evaluated; use [`EvalError::root`] to get at the cause.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("type error: {0}")]
    Type(String),

    #[error("unresolved reference '{0}'")]
    UnresolvedReference(String),

    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("error in function '{name}': {message}")]
    FunctionCall { name: String, message: String },

    #[error("invalid count: {0}")]
    InvalidCount(String),

    #[error("{0}")]
    Expansion(String),

    #[error("duplicate key '{0}'")]
    DuplicateKey(String),

    #[error("cyclic dependency between: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("variable '{name}': {message}")]
    Variable { name: String, message: String },

    #[error("address '{0}' is already bound")]
    AlreadyBound(String),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("{address}: {source}")]
    InBlock {
        address: String,
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn type_error(message: impl Into<String>) -> Self {
        EvalError::Type(message.into())
    }

    pub fn in_block(self, address: impl Into<String>) -> Self {
        EvalError::InBlock {
            address: address.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any block-address wrappers.
    pub fn root(&self) -> &EvalError {
        match self {
            EvalError::InBlock { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Failure to resolve a secret reference.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("unsupported secret reference '{0}': expected <scheme>:<name>")]
    UnsupportedReference(String),

    #[error("reading secret '{reference}': {message}")]
    Io { reference: String, message: String },

    #[error("decrypting secret '{reference}': {message}")]
    Decrypt { reference: String, message: String },

    #[error("secret '{0}' is not valid UTF-8")]
    InvalidUtf8(String),
}

impl SecretError {
    /// Whether retrying the same lookup can succeed. Missing or malformed secrets never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SecretError::Io { .. } | SecretError::Decrypt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_unwraps_nested_block_errors() {
        let err = EvalError::MissingKey("name".into())
            .in_block("aws_iam_user.example")
            .in_block("output.names");
        assert!(matches!(err.root(), EvalError::MissingKey(k) if k == "name"));
        assert_eq!(
            err.to_string(),
            "output.names: aws_iam_user.example: missing key 'name'"
        );
    }

    #[test]
    fn only_transient_secret_errors_are_retryable() {
        assert!(!SecretError::NotFound("DB".into()).is_retryable());
        assert!(SecretError::Decrypt {
            reference: "file:x".into(),
            message: "timeout".into()
        }
        .is_retryable());
    }
}

// diagnostic-engine-rs/src/credentials.rs
//
// Credential resolution. Tokens are resolved per named scope before any
// probe runs; a scope that cannot be resolved fails the whole diagnosis.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no credential for scope '{scope}' (set {variable})")]
    Missing { scope: String, variable: String },

    #[error("credential backend error for scope '{scope}': {message}")]
    Backend { scope: String, message: String },
}

/// Opaque tokens keyed by scope
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    tokens: BTreeMap<String, String>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scope: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(scope.into(), token.into());
    }

    pub fn with(mut self, scope: impl Into<String>, token: impl Into<String>) -> Self {
        self.insert(scope, token);
        self
    }

    pub fn token(&self, scope: &str) -> Option<&str> {
        self.tokens.get(scope).map(String::as_str)
    }
}

// Tokens never reach the logs
impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("scopes", &self.tokens.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, scope: &str) -> Result<String, CredentialError>;
}

/// Resolve every scope, stopping at the first failure
pub async fn resolve_all<I>(provider: &dyn CredentialProvider, scopes: I) -> Result<CredentialSet, CredentialError>
where
    I: IntoIterator<Item = String>,
{
    let mut credentials = CredentialSet::new();
    for scope in scopes {
        let token = provider.resolve(&scope).await?;
        credentials.insert(scope, token);
    }
    Ok(credentials)
}

/// Reads `DIAG_CREDENTIAL_<SCOPE>`; scope `llm` also accepts `LLM_API_KEY`
#[derive(Debug, Default, Clone)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self
    }

    fn lookup(scope: &str) -> Option<String> {
        config_rs::get_env_string(&config_rs::credential_var_name(scope)).or_else(|| {
            if scope == "llm" {
                config_rs::get_env_string("LLM_API_KEY")
            } else {
                None
            }
        })
    }

    pub fn is_available(&self, scope: &str) -> bool {
        Self::lookup(scope).is_some()
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(&self, scope: &str) -> Result<String, CredentialError> {
        Self::lookup(scope).ok_or_else(|| CredentialError::Missing {
            scope: scope.to_string(),
            variable: config_rs::credential_var_name(scope),
        })
    }
}

mod sas;
mod workload;

pub use sas::{url_encode, Clock, SharedAccessKeyProvider};
pub use workload::{WorkloadConfig, WorkloadProvider, WORKLOAD_KEY_ID};

use crate::error::AuthError;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Lifetime of every token minted for a method call.
pub const SAS_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Mints scoped SAS tokens and hands out the CA chain used to verify the
/// gateway. Implementations are called concurrently from independent
/// invocations.
pub trait AuthorizationProvider: Send + Sync {
    fn sas_token(&self, scope: &str, lifetime_secs: u64) -> Result<String, AuthError>;

    fn trust_bundle(&self) -> Result<String, AuthError>;
}

impl<T: AuthorizationProvider + ?Sized> AuthorizationProvider for Arc<T> {
    fn sas_token(&self, scope: &str, lifetime_secs: u64) -> Result<String, AuthError> {
        (**self).sas_token(scope, lifetime_secs)
    }

    fn trust_bundle(&self) -> Result<String, AuthError> {
        (**self).trust_bundle()
    }
}

impl<T: AuthorizationProvider + ?Sized> AuthorizationProvider for &T {
    fn sas_token(&self, scope: &str, lifetime_secs: u64) -> Result<String, AuthError> {
        (**self).sas_token(scope, lifetime_secs)
    }

    fn trust_bundle(&self) -> Result<String, AuthError> {
        (**self).trust_bundle()
    }
}

/// The signer a module ends up with after configuration: its own key, or
/// the edge security daemon.
#[derive(Debug)]
pub enum EdgeAuthProvider {
    SharedAccessKey(SharedAccessKeyProvider),
    Workload(WorkloadProvider),
}

impl AuthorizationProvider for EdgeAuthProvider {
    fn sas_token(&self, scope: &str, lifetime_secs: u64) -> Result<String, AuthError> {
        match self {
            Self::SharedAccessKey(provider) => provider.sas_token(scope, lifetime_secs),
            Self::Workload(provider) => provider.sas_token(scope, lifetime_secs),
        }
    }

    fn trust_bundle(&self) -> Result<String, AuthError> {
        match self {
            Self::SharedAccessKey(provider) => provider.trust_bundle(),
            Self::Workload(provider) => provider.trust_bundle(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrustBundleSource {
    Pem(String),
    /// Re-read on every call so a rotated bundle is picked up.
    File(PathBuf),
}

impl TrustBundleSource {
    pub fn load(&self) -> Result<String, AuthError> {
        let pem = match self {
            Self::Pem(pem) => pem.clone(),
            Self::File(path) => fs::read_to_string(path).map_err(|err| {
                AuthError::TrustBundle(format!("failed to read {}: {err}", path.display()))
            })?,
        };
        if pem.trim().is_empty() {
            return Err(AuthError::TrustBundle("trust bundle is empty".to_owned()));
        }
        Ok(pem)
    }
}

/// Credentials for exactly one exchange. Dropped (and the token wiped) once
/// the call returns.
pub struct SignedRequestContext {
    scope: String,
    sas_token: Zeroizing<String>,
    trust_bundle: String,
}

impl SignedRequestContext {
    pub fn acquire<P: AuthorizationProvider + ?Sized>(
        provider: &P,
        scope: String,
    ) -> Result<Self, AuthError> {
        let sas_token = Zeroizing::new(provider.sas_token(&scope, SAS_TOKEN_LIFETIME_SECS)?);
        let trust_bundle = provider.trust_bundle()?;
        Ok(Self { scope, sas_token, trust_bundle })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn sas_token(&self) -> &str {
        self.sas_token.as_str()
    }

    pub fn trust_bundle(&self) -> &str {
        &self.trust_bundle
    }
}

impl std::fmt::Debug for SignedRequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedRequestContext")
            .field("scope", &self.scope)
            .field("sas_token", &"<redacted>")
            .field("trust_bundle_len", &self.trust_bundle.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;

use super::{AuthorizationProvider, TrustBundleSource};
use crate::error::AuthError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

pub type Clock = fn() -> Result<u64, AuthError>;

/// Signs tokens locally with a shared access key.
pub struct SharedAccessKeyProvider {
    key: Zeroizing<Vec<u8>>,
    key_name: Option<String>,
    trust_bundle: TrustBundleSource,
    clock: Clock,
}

impl SharedAccessKeyProvider {
    pub fn new(
        key_base64: &str,
        key_name: Option<String>,
        trust_bundle: TrustBundleSource,
    ) -> Result<Self, AuthError> {
        let key = Zeroizing::new(
            STANDARD
                .decode(key_base64.trim())
                .map_err(|err| AuthError::InvalidKey(err.to_string()))?,
        );
        if key.is_empty() {
            return Err(AuthError::InvalidKey("key is empty".to_owned()));
        }
        let key_name = key_name.map(|name| name.trim().to_owned()).filter(|name| !name.is_empty());
        Ok(Self { key, key_name, trust_bundle, clock: system_clock })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    /// Token expiring at `expiry`, signed with HMAC-SHA256 over
    /// `<url-encoded scope>\n<expiry>`.
    pub fn token_at(&self, scope: &str, expiry: u64) -> Result<String, AuthError> {
        let encoded_scope = url_encode(scope);
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|err| AuthError::Signing(err.to_string()))?;
        mac.update(string_to_sign(&encoded_scope, expiry).as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format_token(&encoded_scope, &signature, expiry, self.key_name.as_deref()))
    }
}

pub(crate) fn string_to_sign(encoded_scope: &str, expiry: u64) -> String {
    format!("{encoded_scope}\n{expiry}")
}

/// `SharedAccessSignature sr=<scope>&sig=<signature>&se=<expiry>[&skn=<key name>]`
pub(crate) fn format_token(
    encoded_scope: &str,
    signature: &str,
    expiry: u64,
    key_name: Option<&str>,
) -> String {
    let mut token = format!(
        "SharedAccessSignature sr={encoded_scope}&sig={}&se={expiry}",
        url_encode(signature)
    );
    if let Some(key_name) = key_name {
        token.push_str("&skn=");
        token.push_str(&url_encode(key_name));
    }
    token
}

impl AuthorizationProvider for SharedAccessKeyProvider {
    fn sas_token(&self, scope: &str, lifetime_secs: u64) -> Result<String, AuthError> {
        let expiry = (self.clock)()?.saturating_add(lifetime_secs);
        self.token_at(scope, expiry)
    }

    fn trust_bundle(&self) -> Result<String, AuthError> {
        self.trust_bundle.load()
    }
}

impl std::fmt::Debug for SharedAccessKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAccessKeyProvider")
            .field("key", &"<redacted>")
            .field("key_name", &self.key_name)
            .field("trust_bundle", &self.trust_bundle)
            .finish()
    }
}

pub(crate) fn system_clock() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|_| AuthError::Clock)
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
pub fn url_encode(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[usize::from(byte >> 4)]));
                out.push(char::from(HEX[usize::from(byte & 0x0f)]));
            }
        }
    }
    out
}

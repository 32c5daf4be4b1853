use super::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

const KEY_B64: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";
const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

fn fixed_clock() -> Result<u64, AuthError> {
    Ok(1_700_000_000)
}

fn provider(key_name: Option<&str>) -> SharedAccessKeyProvider {
    SharedAccessKeyProvider::new(
        KEY_B64,
        key_name.map(str::to_owned),
        TrustBundleSource::Pem(PEM.to_owned()),
    )
    .expect("provider")
    .with_clock(fixed_clock)
}

fn token_fields(token: &str) -> Vec<(String, String)> {
    token
        .strip_prefix("SharedAccessSignature ")
        .expect("token prefix")
        .split('&')
        .map(|pair| {
            let (key, value) = pair.split_once('=').expect("key=value");
            (key.to_owned(), value.to_owned())
        })
        .collect()
}

fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let hex = std::str::from_utf8(&bytes[idx + 1..idx + 3]).expect("hex");
            out.push(u8::from_str_radix(hex, 16).expect("hex digit"));
            idx += 3;
        } else {
            out.push(bytes[idx]);
            idx += 1;
        }
    }
    String::from_utf8(out).expect("utf8")
}

#[test]
fn sas_token_encodes_scope_signature_and_expiry() {
    let scope = "gateway.local/devices/edgeDevice1/modules/filter";
    let token = provider(None).sas_token(scope, SAS_TOKEN_LIFETIME_SECS).expect("token");
    let fields = token_fields(&token);
    let keys = fields.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, vec!["sr", "sig", "se"]);
    assert_eq!(fields[0].1, "gateway.local%2Fdevices%2FedgeDevice1%2Fmodules%2Ffilter");
    assert_eq!(fields[2].1, "1700003600");

    let signature = STANDARD.decode(url_decode(&fields[1].1)).expect("base64 signature");
    let key = STANDARD.decode(KEY_B64).expect("key");
    let mut mac = Hmac::<Sha256>::new_from_slice(&key).expect("hmac key");
    mac.update(format!("{}\n1700003600", fields[0].1).as_bytes());
    mac.verify_slice(&signature).expect("signature verifies");
}

#[test]
fn sas_token_appends_key_name_when_configured() {
    let token = provider(Some("iothubowner")).token_at("hub/devices/d", 42).expect("token");
    assert!(token.ends_with("&se=42&skn=iothubowner"));

    let blank = provider(Some("  ")).token_at("hub/devices/d", 42).expect("token");
    assert!(!blank.contains("skn="));
}

#[test]
fn tokens_differ_per_scope() {
    let provider = provider(None);
    let first = provider.token_at("hub/devices/a/modules/m", 10).expect("token");
    let second = provider.token_at("hub/devices/b/modules/m", 10).expect("token");
    assert_ne!(first, second);
}

#[test]
fn invalid_or_empty_keys_are_rejected() {
    let source = TrustBundleSource::Pem(PEM.to_owned());
    assert!(matches!(
        SharedAccessKeyProvider::new("not base64!", None, source.clone()),
        Err(AuthError::InvalidKey(_))
    ));
    assert!(matches!(
        SharedAccessKeyProvider::new("", None, source),
        Err(AuthError::InvalidKey(_))
    ));
}

#[test]
fn clock_failure_surfaces_as_auth_error() {
    fn broken_clock() -> Result<u64, AuthError> {
        Err(AuthError::Clock)
    }
    let provider = provider(None).with_clock(broken_clock);
    assert!(matches!(provider.sas_token("scope", 1), Err(AuthError::Clock)));
}

#[test]
fn debug_output_hides_key() {
    let rendered = format!("{:?}", provider(Some("owner")));
    assert!(rendered.contains("<redacted>"));
    assert!(!rendered.contains(KEY_B64));
}

#[test]
fn url_encode_keeps_unreserved_characters_only() {
    assert_eq!(url_encode("AZaz09-_.~"), "AZaz09-_.~");
    assert_eq!(url_encode("a/b c+d=e"), "a%2Fb%20c%2Bd%3De");
    assert_eq!(url_encode("é"), "%C3%A9");
}

#[test]
fn trust_bundle_file_is_reread_on_every_load() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(PEM.as_bytes()).expect("write pem");
    let source = TrustBundleSource::File(file.path().to_path_buf());
    assert_eq!(source.load().expect("first load"), PEM);

    let rotated = PEM.replace("MIIB", "MIIC");
    std::fs::write(file.path(), &rotated).expect("rotate pem");
    assert_eq!(source.load().expect("second load"), rotated);
}

#[test]
fn missing_or_empty_trust_bundle_is_an_auth_error() {
    let missing = TrustBundleSource::File("/nonexistent/edge-method/ca.pem".into());
    assert!(matches!(missing.load(), Err(AuthError::TrustBundle(_))));
    assert!(matches!(
        TrustBundleSource::Pem("  \n".to_owned()).load(),
        Err(AuthError::TrustBundle(_))
    ));
}

struct CountingProvider {
    token_calls: AtomicUsize,
    bundle_calls: AtomicUsize,
    fail_bundle: bool,
}

impl AuthorizationProvider for CountingProvider {
    fn sas_token(&self, scope: &str, lifetime_secs: u64) -> Result<String, AuthError> {
        self.token_calls.fetch_add(1, Ordering::Relaxed);
        Ok(format!("token:{scope}:{lifetime_secs}"))
    }

    fn trust_bundle(&self) -> Result<String, AuthError> {
        self.bundle_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_bundle {
            return Err(AuthError::TrustBundle("offline".to_owned()));
        }
        Ok(PEM.to_owned())
    }
}

#[test]
fn signed_context_requests_fixed_lifetime_token_for_scope() {
    let provider = CountingProvider {
        token_calls: AtomicUsize::new(0),
        bundle_calls: AtomicUsize::new(0),
        fail_bundle: false,
    };
    let context = SignedRequestContext::acquire(&provider, "hub/devices/d/modules/m".to_owned())
        .expect("context");
    assert_eq!(context.scope(), "hub/devices/d/modules/m");
    assert_eq!(context.sas_token(), "token:hub/devices/d/modules/m:3600");
    assert_eq!(context.trust_bundle(), PEM);
    let printed = format!("{context:?}");
    assert!(printed.contains("<redacted>"));
    assert!(!printed.contains("token:hub/devices"));
    assert_eq!(provider.token_calls.load(Ordering::Relaxed), 1);
    assert_eq!(provider.bundle_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn signed_context_fails_when_trust_bundle_is_unavailable() {
    let provider = CountingProvider {
        token_calls: AtomicUsize::new(0),
        bundle_calls: AtomicUsize::new(0),
        fail_bundle: true,
    };
    let err = SignedRequestContext::acquire(&provider, "scope".to_owned()).expect_err("must fail");
    assert!(matches!(err, AuthError::TrustBundle(_)));
    assert_eq!(err.code(), crate::error::code::AUTH_TRUST_BUNDLE_UNAVAILABLE);
}

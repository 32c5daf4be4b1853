use crate::envelope::HeaderSet;
use crate::error::TransportError;
use rustls::{ClientConfig, RootCertStore};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;
const SUCCESS_STATUS: u16 = 200;

pub struct ExchangeRequest<'a> {
    pub hostname: &'a str,
    pub path: &'a str,
    pub headers: &'a HeaderSet,
    pub body: &'a [u8],
    pub trust_bundle: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ExchangeResponse {
    /// Only a 200 counts; every other status ends the call.
    pub fn into_success_body(self) -> Result<Vec<u8>, TransportError> {
        if self.status != SUCCESS_STATUS {
            return Err(TransportError::Status { status: self.status });
        }
        Ok(self.body)
    }
}

/// One blocking POST. Implementations must not retry.
pub trait HttpExchange: Send + Sync {
    fn execute(&self, request: &ExchangeRequest<'_>) -> Result<ExchangeResponse, TransportError>;
}

impl<T: HttpExchange + ?Sized> HttpExchange for Arc<T> {
    fn execute(&self, request: &ExchangeRequest<'_>) -> Result<ExchangeResponse, TransportError> {
        (**self).execute(request)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeOptions {
    pub connect_timeout: Duration,
    pub io_timeout: Option<Duration>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self { connect_timeout: Duration::from_secs(10), io_timeout: None }
    }
}

/// HTTPS engine. A fresh agent and TLS config are built for every call from
/// the trust bundle carried by the request.
#[derive(Clone, Debug, Default)]
pub struct HttpsExchange {
    options: ExchangeOptions,
}

impl HttpsExchange {
    pub fn new(options: ExchangeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExchangeOptions {
        &self.options
    }

    fn agent(&self, tls: Arc<ClientConfig>) -> ureq::Agent {
        let mut builder = ureq::AgentBuilder::new()
            .tls_config(tls)
            .timeout_connect(self.options.connect_timeout)
            .redirects(0);
        if let Some(io_timeout) = self.options.io_timeout {
            builder = builder.timeout_read(io_timeout).timeout_write(io_timeout);
        }
        builder.build()
    }
}

impl HttpExchange for HttpsExchange {
    fn execute(&self, request: &ExchangeRequest<'_>) -> Result<ExchangeResponse, TransportError> {
        let tls = build_tls_config(request.trust_bundle)?;
        let agent = self.agent(tls);
        let url = format!("https://{}{}", request.hostname, request.path);

        let mut call = agent.post(&url);
        for (name, value) in request.headers.iter() {
            call = call.set(name, value);
        }
        let response = match call.send_bytes(request.body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(TransportError::Request(err.to_string())),
        };

        let status = response.status();
        let body = read_limited(response.into_reader(), MAX_RESPONSE_BYTES)?;
        log::debug!(
            "method exchange host={} status={} bytes={}",
            request.hostname,
            status,
            body.len()
        );
        Ok(ExchangeResponse { status, body })
    }
}

/// Reads the whole body, failing instead of truncating past `limit` bytes.
pub(crate) fn read_limited(reader: impl Read, limit: u64) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|err| TransportError::Io(err.to_string()))?;
    if body.len() as u64 > limit {
        return Err(TransportError::Io(format!("response exceeds {limit} bytes")));
    }
    Ok(body)
}

/// Root store made only of the certificates in `trust_bundle`.
pub fn build_tls_config(trust_bundle: &str) -> Result<Arc<ClientConfig>, TransportError> {
    let mut reader = trust_bundle.as_bytes();
    let certificates = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            TransportError::TlsConfig(format!("failed to parse PEM certs from trust bundle: {err}"))
        })?;
    if certificates.is_empty() {
        return Err(TransportError::TlsConfig("no certificates found in trust bundle".to_owned()));
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certificates);
    if added == 0 {
        return Err(TransportError::TlsConfig(
            "no valid CA certificates found in trust bundle".to_owned(),
        ));
    }
    if ignored > 0 {
        log::warn!("trust bundle: ignored {ignored} unparsable certificate(s)");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|err| TransportError::TlsConfig(err.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

use crate::auth::{AuthorizationProvider, SignedRequestContext};
use crate::config::ClientConfig;
use crate::decode::decode_response;
use crate::envelope::{self, header};
use crate::error::{ConfigError, InvokeError};
use crate::exchange::{ExchangeRequest, HttpExchange, HttpsExchange};
use crate::types::{MethodRequest, MethodResponse, ModuleIdentity};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeStage {
    Validating,
    BuildingEnvelope,
    Authorizing,
    Exchanging,
    Decoding,
}

impl InvokeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::BuildingEnvelope => "building_envelope",
            Self::Authorizing => "authorizing",
            Self::Exchanging => "exchanging",
            Self::Decoding => "decoding",
        }
    }
}

/// Invokes direct methods on other devices and modules through the gateway.
///
/// The handle is immutable after construction and may be shared across
/// threads; every call builds its own headers, path, scope and token.
pub struct MethodHandle<P: AuthorizationProvider, E: HttpExchange = HttpsExchange> {
    identity: ModuleIdentity,
    auth: P,
    exchange: E,
}

impl<P: AuthorizationProvider> MethodHandle<P, HttpsExchange> {
    pub fn from_config(config: &ClientConfig, auth: P) -> Result<Self, ConfigError> {
        config.validate()?;
        let exchange = HttpsExchange::new(config.exchange_options());
        Self::new(config.identity(), auth, exchange)
            .map_err(|err| ConfigError::invalid("identity", err.to_string()))
    }
}

impl<P: AuthorizationProvider, E: HttpExchange> MethodHandle<P, E> {
    pub fn new(identity: ModuleIdentity, auth: P, exchange: E) -> Result<Self, InvokeError> {
        require_hostname(&identity.hostname)?;
        require_identifier("device_id", &identity.device_id)?;
        require_identifier("module_id", &identity.module_id)?;
        Ok(Self { identity, auth, exchange })
    }

    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    pub fn auth(&self) -> &P {
        &self.auth
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// Runs `request.method_name` on `device_id`/`module_id` and blocks until
    /// the target answers or the exchange fails. Nothing is retried.
    pub fn invoke(
        &self,
        device_id: &str,
        module_id: &str,
        request: &MethodRequest,
    ) -> Result<MethodResponse, InvokeError> {
        let mut stage = InvokeStage::Validating;
        let outcome = self.run(&mut stage, device_id, module_id, request);
        match &outcome {
            Ok(response) => log::debug!(
                "method invoke ok device={device_id} module={module_id} method={} status={} bytes={}",
                request.method_name,
                response.status,
                response.payload_len()
            ),
            Err(err) => log::error!(
                "method invoke failed stage={} code={} device={device_id} module={module_id} method={} err={err}",
                stage.as_str(),
                err.code(),
                request.method_name
            ),
        }
        outcome
    }

    fn run(
        &self,
        stage: &mut InvokeStage,
        device_id: &str,
        module_id: &str,
        request: &MethodRequest,
    ) -> Result<MethodResponse, InvokeError> {
        require_identifier("device_id", device_id)?;
        require_identifier("module_id", module_id)?;
        require_non_empty("method_name", &request.method_name)?;
        require_non_empty("payload", &request.payload)?;

        *stage = InvokeStage::BuildingEnvelope;
        let body = envelope::build_request_body(
            &request.method_name,
            request.timeout_secs,
            &request.payload,
        )?;
        let path = envelope::build_resource_path(device_id, module_id);
        let request_id = envelope::new_request_id();
        let mut headers = envelope::method_headers(&request_id)?;
        log::debug!("method invoke request_id={request_id} path={path}");

        *stage = InvokeStage::Authorizing;
        let scope = envelope::build_scope(
            &self.identity.hostname,
            &self.identity.device_id,
            &self.identity.module_id,
        );
        let signed = SignedRequestContext::acquire(&self.auth, scope)?;
        headers.replace(header::AUTHORIZATION, signed.sas_token())?;

        *stage = InvokeStage::Exchanging;
        let response = self.exchange.execute(&ExchangeRequest {
            hostname: &self.identity.hostname,
            path: &path,
            headers: &headers,
            body: &body,
            trust_bundle: signed.trust_bundle(),
        })?;
        drop(signed);
        let response_body = response.into_success_body()?;

        *stage = InvokeStage::Decoding;
        let decoded = decode_response(&response_body)?;
        Ok(MethodResponse { status: decoded.status, payload: decoded.payload.into_bytes() })
    }
}

impl<P: AuthorizationProvider, E: HttpExchange> std::fmt::Debug for MethodHandle<P, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodHandle").field("identity", &self.identity).finish_non_exhaustive()
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), InvokeError> {
    if value.is_empty() {
        return Err(InvokeError::invalid_argument(field, "must not be empty"));
    }
    Ok(())
}

/// The hostname becomes the URL authority, so only `host[:port]` is allowed.
fn require_hostname(value: &str) -> Result<(), InvokeError> {
    require_non_empty("hostname", value)?;
    if value.chars().any(|ch| {
        matches!(ch, '/' | '?' | '#' | '@' | '\\' | '%') || ch.is_whitespace() || ch.is_control()
    }) {
        return Err(InvokeError::invalid_argument(
            "hostname",
            "must be a bare host name with an optional port",
        ));
    }
    Ok(())
}

/// Identifiers go into the URL path unencoded, so anything that would change
/// the path's structure is refused.
fn require_identifier(field: &str, value: &str) -> Result<(), InvokeError> {
    require_non_empty(field, value)?;
    if value
        .chars()
        .any(|ch| matches!(ch, '/' | '?' | '#' | '%') || ch.is_whitespace() || ch.is_control())
    {
        return Err(InvokeError::invalid_argument(
            field,
            "must not contain '/', '?', '#', '%', whitespace or control characters",
        ));
    }
    Ok(())
}

#![allow(clippy::result_large_err)]

//! Direct-method calls from an edge module to other devices and modules,
//! sent over HTTPS through the edge gateway and authorized with a
//! per-call SAS token.

pub mod auth;
mod client;
pub mod config;
mod decode;
pub mod envelope;
mod error;
mod exchange;
pub mod types;

pub use auth::{
    url_encode, AuthorizationProvider, EdgeAuthProvider, SharedAccessKeyProvider,
    SignedRequestContext, TrustBundleSource, WorkloadConfig, WorkloadProvider,
    SAS_TOKEN_LIFETIME_SECS,
};
pub use client::{InvokeStage, MethodHandle};
pub use config::{ClientConfig, ConnectionString, EdgeEnvironment};
pub use decode::{decode_response, DecodedResponse};
pub use envelope::{
    build_request_body, build_resource_path, build_scope, method_headers, new_request_id,
    HeaderSet, API_VERSION, USER_AGENT,
};
pub use error::{
    code as error_code, AuthError, BuildError, ClientResult, ConfigError, DecodeError,
    ErrorCategory, InvokeError, TransportError,
};
pub use exchange::{
    build_tls_config, ExchangeOptions, ExchangeRequest, ExchangeResponse, HttpExchange,
    HttpsExchange,
};
pub use types::{MethodRequest, MethodResponse, ModuleIdentity};

use super::sas::{format_token, string_to_sign, system_clock, url_encode, Clock};
use super::{AuthorizationProvider, TrustBundleSource};
use crate::error::AuthError;
use crate::exchange::read_limited;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Key the edge runtime provisions for every module.
pub const WORKLOAD_KEY_ID: &str = "primary";

const SIGN_ALGORITHM: &str = "HMACSHA256";
const MAX_WORKLOAD_RESPONSE_BYTES: u64 = 1024 * 1024;
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Workload API coordinates exported by the edge runtime.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// `unix:///path/to/workload.sock` or `http://host:port`.
    pub uri: String,
    pub api_version: String,
    pub generation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum WorkloadEndpoint {
    Http(String),
    Unix(PathBuf),
}

impl WorkloadEndpoint {
    fn parse(uri: &str) -> Result<Self, AuthError> {
        if let Some(path) = uri.strip_prefix("unix://") {
            if !path.is_empty() {
                return Ok(Self::Unix(PathBuf::from(path)));
            }
        } else if uri.starts_with("http://") {
            let base = uri.trim_end_matches('/');
            if base.len() > "http://".len() {
                return Ok(Self::Http(base.to_owned()));
            }
        }
        Err(AuthError::Provider(format!("unsupported workload uri '{uri}'")))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    key_id: &'a str,
    algo: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct SignResponse {
    digest: String,
}

#[derive(Deserialize)]
struct TrustBundleResponse {
    certificate: String,
}

/// Signs tokens through the edge security daemon, which holds the module
/// key. The trust bundle comes from the same API unless overridden.
#[derive(Debug)]
pub struct WorkloadProvider {
    endpoint: WorkloadEndpoint,
    api_version: String,
    module_id: String,
    generation_id: String,
    trust_bundle: Option<TrustBundleSource>,
    timeout: Duration,
    clock: Clock,
}

impl WorkloadProvider {
    pub fn new(
        config: &WorkloadConfig,
        module_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let module_id = module_id.into();
        for (field, value) in [
            ("api version", &config.api_version),
            ("generation id", &config.generation_id),
            ("module id", &module_id),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::Provider(format!("workload {field} is empty")));
            }
        }
        Ok(Self {
            endpoint: WorkloadEndpoint::parse(&config.uri)?,
            api_version: config.api_version.clone(),
            generation_id: config.generation_id.clone(),
            module_id,
            trust_bundle: None,
            timeout,
            clock: system_clock,
        })
    }

    pub fn with_trust_bundle(mut self, source: TrustBundleSource) -> Self {
        self.trust_bundle = Some(source);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn sign_path(&self) -> String {
        format!(
            "/modules/{}/genid/{}/sign?api-version={}",
            url_encode(&self.module_id),
            url_encode(&self.generation_id),
            url_encode(&self.api_version)
        )
    }

    fn trust_bundle_path(&self) -> String {
        format!("/trust-bundle?api-version={}", url_encode(&self.api_version))
    }

    fn call(&self, method: &str, path: &str, body: Option<&[u8]>) -> Result<Vec<u8>, String> {
        let (status, response) = match &self.endpoint {
            WorkloadEndpoint::Http(base) => self.call_http(base, method, path, body)?,
            WorkloadEndpoint::Unix(socket) => self.call_unix(socket, method, path, body)?,
        };
        log::debug!("workload api {method} {path} status={status} bytes={}", response.len());
        if !(200..300).contains(&status) {
            return Err(format!("workload api {method} {path} returned status {status}"));
        }
        Ok(response)
    }

    fn call_http(
        &self,
        base: &str,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<(u16, Vec<u8>), String> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).redirects(0).build();
        let request = agent.request(method, &format!("{base}{path}"));
        let sent = match body {
            Some(body) => request.set("Content-Type", "application/json").send_bytes(body),
            None => request.call(),
        };
        let response = match sent {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(format!("workload api request failed: {err}")),
        };
        let status = response.status();
        let body = read_limited(response.into_reader(), MAX_WORKLOAD_RESPONSE_BYTES)
            .map_err(|err| err.to_string())?;
        Ok((status, body))
    }

    #[cfg(unix)]
    fn call_unix(
        &self,
        socket: &Path,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<(u16, Vec<u8>), String> {
        use std::os::unix::net::UnixStream;

        let mut stream = UnixStream::connect(socket)
            .map_err(|err| format!("failed to connect to {}: {err}", socket.display()))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|err| err.to_string())?;
        stream
            .write_all(&build_http_request(method, path, body))
            .map_err(|err| format!("workload api request failed: {err}"))?;
        let raw = read_limited(&mut stream, MAX_WORKLOAD_RESPONSE_BYTES)
            .map_err(|err| err.to_string())?;
        parse_http_response(&raw)
    }

    #[cfg(not(unix))]
    fn call_unix(
        &self,
        socket: &Path,
        _method: &str,
        _path: &str,
        _body: Option<&[u8]>,
    ) -> Result<(u16, Vec<u8>), String> {
        Err(format!("unix socket {} is not supported on this platform", socket.display()))
    }
}

impl AuthorizationProvider for WorkloadProvider {
    fn sas_token(&self, scope: &str, lifetime_secs: u64) -> Result<String, AuthError> {
        let expiry = (self.clock)()?.saturating_add(lifetime_secs);
        let encoded_scope = url_encode(scope);
        let request = SignRequest {
            key_id: WORKLOAD_KEY_ID,
            algo: SIGN_ALGORITHM,
            data: STANDARD.encode(string_to_sign(&encoded_scope, expiry)),
        };
        let body = serde_json::to_vec(&request).map_err(|err| AuthError::Signing(err.to_string()))?;
        let response =
            self.call("POST", &self.sign_path(), Some(&body)).map_err(AuthError::Provider)?;
        let signed: SignResponse = serde_json::from_slice(&response)
            .map_err(|err| AuthError::Provider(format!("invalid sign response: {err}")))?;
        if signed.digest.is_empty() {
            return Err(AuthError::Provider("workload api returned an empty digest".to_owned()));
        }
        Ok(format_token(&encoded_scope, &signed.digest, expiry, None))
    }

    fn trust_bundle(&self) -> Result<String, AuthError> {
        if let Some(source) = &self.trust_bundle {
            return source.load();
        }
        let response =
            self.call("GET", &self.trust_bundle_path(), None).map_err(AuthError::TrustBundle)?;
        let bundle: TrustBundleResponse = serde_json::from_slice(&response).map_err(|err| {
            AuthError::TrustBundle(format!("invalid trust bundle response: {err}"))
        })?;
        if bundle.certificate.trim().is_empty() {
            return Err(AuthError::TrustBundle(
                "workload api returned an empty trust bundle".to_owned(),
            ));
        }
        Ok(bundle.certificate)
    }
}

fn build_http_request(method: &str, path: &str, body: Option<&[u8]>) -> Vec<u8> {
    let mut request = Vec::new();
    request.extend_from_slice(format!("{method} {path} HTTP/1.1\r\n").as_bytes());
    request.extend_from_slice(b"Host: localhost\r\n");
    request.extend_from_slice(b"Connection: close\r\n");
    if let Some(body) = body {
        request.extend_from_slice(b"Content-Type: application/json\r\n");
        request.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    request.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        request.extend_from_slice(body);
    }
    request
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(HEADER_END.len()).position(|window| window == HEADER_END)
}

fn parse_http_response(raw: &[u8]) -> Result<(u16, Vec<u8>), String> {
    let header_end =
        find_header_end(raw).ok_or_else(|| "workload response has no header end".to_owned())?;
    let head = String::from_utf8_lossy(&raw[..header_end]);
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| "workload response has an invalid status line".to_owned())?;

    let mut content_length = None;
    let mut chunked = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.trim().parse::<usize>().ok();
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.trim().eq_ignore_ascii_case("chunked");
        }
    }

    let rest = &raw[header_end + HEADER_END.len()..];
    if chunked {
        return decode_chunked(rest).map(|body| (status, body));
    }
    match content_length {
        Some(length) if rest.len() < length => Err("workload response body incomplete".to_owned()),
        Some(length) => Ok((status, rest[..length].to_vec())),
        None => Ok((status, rest.to_vec())),
    }
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>, String> {
    let mut body = Vec::new();
    loop {
        let line_end = data
            .windows(2)
            .position(|window| window == b"\r\n")
            .ok_or_else(|| "truncated chunk size".to_owned())?;
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_text = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| format!("invalid chunk size '{size_text}'"))?;
        data = &data[line_end + 2..];
        if size == 0 {
            return Ok(body);
        }
        if data.len() < size + 2 {
            return Err("truncated chunk".to_owned());
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}

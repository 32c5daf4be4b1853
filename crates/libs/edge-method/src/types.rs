use serde::{Deserialize, Serialize};

/// Who is calling: the gateway host the request goes to and the module
/// identity the token scope is derived from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleIdentity {
    pub hostname: String,
    pub device_id: String,
    pub module_id: String,
}

impl ModuleIdentity {
    pub fn new(
        hostname: impl Into<String>,
        device_id: impl Into<String>,
        module_id: impl Into<String>,
    ) -> Self {
        Self { hostname: hostname.into(), device_id: device_id.into(), module_id: module_id.into() }
    }
}

/// A single direct-method call.
///
/// `payload` must already be JSON text; it is placed into the request body
/// as-is. `timeout_secs` tells the target how long it may take to run the
/// method and has no effect on local socket timeouts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodRequest {
    pub method_name: String,
    pub timeout_secs: u32,
    pub payload: String,
}

impl MethodRequest {
    pub fn new(
        method_name: impl Into<String>,
        payload: impl Into<String>,
        timeout_secs: u32,
    ) -> Self {
        Self { method_name: method_name.into(), timeout_secs, payload: payload.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodResponse {
    pub status: i32,
    pub payload: Vec<u8>,
}

impl MethodResponse {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

use crate::error::BuildError;
use std::fmt::Write as _;
use uuid::Uuid;

pub const API_VERSION: &str = "2017-11-08-preview";
pub const USER_AGENT: &str = concat!("edgemethod/", env!("CARGO_PKG_VERSION"));
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

const AUTHORIZATION_PLACEHOLDER: &str = " ";

pub mod header {
    pub const AUTHORIZATION: &str = "Authorization";
    pub const REQUEST_ID: &str = "Request-Id";
    pub const USER_AGENT: &str = "User-Agent";
    pub const CONTENT_TYPE: &str = "Content-Type";
}

/// Builds `{"methodName":..,"timeout":..,"payload":..}`.
///
/// The payload is spliced in without escaping, so the caller's JSON text is
/// carried byte for byte.
pub fn build_request_body(
    method_name: &str,
    timeout_secs: u32,
    payload: &str,
) -> Result<Vec<u8>, BuildError> {
    let name =
        serde_json::to_string(method_name).map_err(|err| BuildError::Format(err.to_string()))?;
    let mut body = String::with_capacity(name.len() + payload.len() + 48);
    write!(body, "{{\"methodName\":{name},\"timeout\":{timeout_secs},\"payload\":{payload}}}")
        .map_err(|err| BuildError::Format(err.to_string()))?;
    Ok(body.into_bytes())
}

pub fn build_resource_path(device_id: &str, module_id: &str) -> String {
    format!("/twins/{device_id}/modules/{module_id}/methods?api-version={API_VERSION}")
}

pub fn build_scope(hostname: &str, device_id: &str, module_id: &str) -> String {
    format!("{hostname}/devices/{device_id}/modules/{module_id}")
}

pub fn new_request_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Ordered header list. Names compare case-insensitively.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: &str) -> Result<(), BuildError> {
        if self.position(name).is_some() {
            return Err(BuildError::DuplicateHeader(name.to_owned()));
        }
        check_header_value(name, value)?;
        self.entries.push((name.to_owned(), value.to_owned()));
        Ok(())
    }

    pub fn replace(&mut self, name: &str, value: &str) -> Result<(), BuildError> {
        let index = self.position(name).ok_or_else(|| BuildError::MissingHeader(name.to_owned()))?;
        check_header_value(name, value)?;
        self.entries[index].1 = value.to_owned();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

fn check_header_value(name: &str, value: &str) -> Result<(), BuildError> {
    if value.contains(['\r', '\n']) {
        return Err(BuildError::InvalidHeaderValue(name.to_owned()));
    }
    Ok(())
}

/// Headers for one method call. `Authorization` holds a placeholder until
/// the token for the call's scope has been minted.
pub fn method_headers(request_id: &str) -> Result<HeaderSet, BuildError> {
    let mut headers = HeaderSet::new();
    headers.add(header::AUTHORIZATION, AUTHORIZATION_PLACEHOLDER)?;
    headers.add(header::REQUEST_ID, request_id)?;
    headers.add(header::USER_AGENT, USER_AGENT)?;
    headers.add(header::CONTENT_TYPE, CONTENT_TYPE_JSON)?;
    Ok(headers)
}

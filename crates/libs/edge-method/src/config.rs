use crate::auth::{
    EdgeAuthProvider, SharedAccessKeyProvider, TrustBundleSource, WorkloadConfig, WorkloadProvider,
};
use crate::error::ConfigError;
use crate::exchange::ExchangeOptions;
use crate::types::ModuleIdentity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod env {
    pub const EDGEHUB_CONNECTION_STRING: &str = "EdgeHubConnectionString";
    pub const AUTH_SCHEME: &str = "IOTEDGE_AUTHSCHEME";
    pub const DEVICE_ID: &str = "IOTEDGE_DEVICEID";
    pub const MODULE_ID: &str = "IOTEDGE_MODULEID";
    pub const IOTHUB_HOSTNAME: &str = "IOTEDGE_IOTHUBHOSTNAME";
    pub const GATEWAY_HOSTNAME: &str = "IOTEDGE_GATEWAYHOSTNAME";
    pub const MODULE_CA_CERTIFICATE_FILE: &str = "EdgeModuleCACertificateFile";
    pub const WORKLOAD_URI: &str = "IOTEDGE_WORKLOADURI";
    pub const API_VERSION: &str = "IOTEDGE_APIVERSION";
    pub const MODULE_GENERATION_ID: &str = "IOTEDGE_MODULEGENERATIONID";
}

pub const SAS_TOKEN_AUTH_SCHEME: &str = "SasToken";

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host the method call is sent to (the edge gateway).
    pub hostname: String,
    pub device_id: String,
    pub module_id: String,
    #[serde(default)]
    pub iothub_name: Option<String>,
    #[serde(default)]
    pub iothub_suffix: Option<String>,
    #[serde(default)]
    pub shared_access_key: Option<String>,
    #[serde(default)]
    pub shared_access_key_name: Option<String>,
    #[serde(default)]
    pub trust_bundle_path: Option<PathBuf>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
    /// Sign through the edge security daemon instead of a local key.
    #[serde(default)]
    pub workload: Option<WorkloadConfig>,
}

impl ClientConfig {
    pub fn new(
        hostname: impl Into<String>,
        device_id: impl Into<String>,
        module_id: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            device_id: device_id.into(),
            module_id: module_id.into(),
            iothub_name: None,
            iothub_suffix: None,
            shared_access_key: None,
            shared_access_key_name: None,
            trust_bundle_path: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            io_timeout_ms: None,
            workload: None,
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("hostname", &self.hostname),
            ("device_id", &self.device_id),
            ("module_id", &self.module_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("connect_timeout_ms", "must be greater than zero"));
        }
        if self.io_timeout_ms == Some(0) {
            return Err(ConfigError::invalid("io_timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn identity(&self) -> ModuleIdentity {
        ModuleIdentity::new(&self.hostname, &self.device_id, &self.module_id)
    }

    pub fn exchange_options(&self) -> ExchangeOptions {
        ExchangeOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: self.io_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Local signer for this module. Needs both a key and a trust bundle file.
    pub fn shared_access_key_provider(&self) -> Result<SharedAccessKeyProvider, ConfigError> {
        let key = self
            .shared_access_key
            .as_deref()
            .ok_or_else(|| ConfigError::invalid("shared_access_key", "is required"))?;
        let trust_bundle = self
            .trust_bundle_path
            .clone()
            .ok_or_else(|| ConfigError::invalid("trust_bundle_path", "is required"))?;
        Ok(SharedAccessKeyProvider::new(
            key,
            self.shared_access_key_name.clone(),
            TrustBundleSource::File(trust_bundle),
        )?)
    }

    /// Workload signer for this module. `trust_bundle_path`, when set,
    /// replaces the bundle the daemon would hand out.
    pub fn workload_provider(&self) -> Result<WorkloadProvider, ConfigError> {
        let workload = self
            .workload
            .as_ref()
            .ok_or_else(|| ConfigError::invalid("workload", "is required"))?;
        let timeout = self.exchange_options().connect_timeout;
        let mut provider = WorkloadProvider::new(workload, &self.module_id, timeout)?;
        if let Some(path) = &self.trust_bundle_path {
            provider = provider.with_trust_bundle(TrustBundleSource::File(path.clone()));
        }
        Ok(provider)
    }

    /// A local key wins over the workload API when both are configured.
    pub fn authorization_provider(&self) -> Result<EdgeAuthProvider, ConfigError> {
        if self.shared_access_key.is_some() {
            return self.shared_access_key_provider().map(EdgeAuthProvider::SharedAccessKey);
        }
        if self.workload.is_some() {
            return self.workload_provider().map(EdgeAuthProvider::Workload);
        }
        Err(ConfigError::invalid("shared_access_key", "or a workload signer is required"))
    }

    /// Copy safe to print: the shared access key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.shared_access_key.is_some() {
            copy.shared_access_key = Some("<redacted>".to_owned());
        }
        copy
    }
}

/// Splits `<name>.<suffix>` at the first dot.
pub fn split_hub_hostname(hostname: &str) -> Result<(String, String), ConfigError> {
    match hostname.split_once('.') {
        Some((name, suffix)) if !name.is_empty() && !suffix.is_empty() => {
            Ok((name.to_owned(), suffix.to_owned()))
        }
        _ => Err(ConfigError::InvalidHubHostname(hostname.to_owned())),
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host_name: String,
    pub device_id: String,
    pub module_id: Option<String>,
    pub shared_access_key: Option<String>,
    pub shared_access_key_name: Option<String>,
    pub gateway_host_name: Option<String>,
}

impl ConnectionString {
    /// `Key=Value` pairs separated by `;`. Values may contain `=`; unknown
    /// keys are ignored and a repeated key keeps its last value.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut host_name = None;
        let mut device_id = None;
        let mut module_id = None;
        let mut shared_access_key = None;
        let mut shared_access_key_name = None;
        let mut gateway_host_name = None;

        for segment in input.split(';').map(str::trim).filter(|segment| !segment.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedConnectionString(segment.to_owned()))?;
            let value = Some(value.trim().to_owned()).filter(|value| !value.is_empty());
            match key.trim() {
                "HostName" => host_name = value,
                "DeviceId" => device_id = value,
                "ModuleId" => module_id = value,
                "SharedAccessKey" => shared_access_key = value,
                "SharedAccessKeyName" => shared_access_key_name = value,
                "GatewayHostName" => gateway_host_name = value,
                _ => {}
            }
        }

        Ok(Self {
            host_name: host_name.ok_or(ConfigError::MissingConnectionStringField("HostName"))?,
            device_id: device_id.ok_or(ConfigError::MissingConnectionStringField("DeviceId"))?,
            module_id,
            shared_access_key,
            shared_access_key_name,
            gateway_host_name,
        })
    }

    /// Method calls go to the gateway when one is named, otherwise to the hub.
    pub fn into_client_config(self) -> Result<ClientConfig, ConfigError> {
        let module_id =
            self.module_id.ok_or(ConfigError::MissingConnectionStringField("ModuleId"))?;
        let (iothub_name, iothub_suffix) = split_hub_hostname(&self.host_name)?;
        let hostname = self.gateway_host_name.unwrap_or(self.host_name);
        let mut config = ClientConfig::new(hostname, self.device_id, module_id);
        config.iothub_name = Some(iothub_name);
        config.iothub_suffix = Some(iothub_suffix);
        config.shared_access_key = self.shared_access_key;
        config.shared_access_key_name = self.shared_access_key_name;
        config.validate()?;
        Ok(config)
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("module_id", &self.module_id)
            .field("shared_access_key", &self.shared_access_key.as_ref().map(|_| "<redacted>"))
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("gateway_host_name", &self.gateway_host_name)
            .finish()
    }
}

/// Settings the edge runtime hands a module through its environment.
pub struct EdgeEnvironment;

impl EdgeEnvironment {
    pub fn from_env() -> Result<ClientConfig, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads every variable through `lookup` exactly once. A connection
    /// string, when present, replaces all other variables.
    pub fn from_lookup<F>(lookup: F) -> Result<ClientConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::MissingVariable(name));
        let trust_bundle_path = get(env::MODULE_CA_CERTIFICATE_FILE).map(PathBuf::from);

        if let Some(connection_string) = get(env::EDGEHUB_CONNECTION_STRING) {
            let mut config = ConnectionString::parse(&connection_string)?.into_client_config()?;
            config.trust_bundle_path = trust_bundle_path;
            return Ok(config);
        }

        let auth_scheme = require(env::AUTH_SCHEME)?;
        if auth_scheme != SAS_TOKEN_AUTH_SCHEME {
            return Err(ConfigError::UnsupportedAuthScheme(auth_scheme));
        }
        let device_id = require(env::DEVICE_ID)?;
        let hub_hostname = require(env::IOTHUB_HOSTNAME)?;
        let gateway_hostname = require(env::GATEWAY_HOSTNAME)?;
        let module_id = require(env::MODULE_ID)?;
        let workload = WorkloadConfig {
            uri: require(env::WORKLOAD_URI)?,
            api_version: require(env::API_VERSION)?,
            generation_id: require(env::MODULE_GENERATION_ID)?,
        };
        let (iothub_name, iothub_suffix) = split_hub_hostname(&hub_hostname)?;

        let mut config = ClientConfig::new(gateway_hostname, device_id, module_id);
        config.iothub_name = Some(iothub_name);
        config.iothub_suffix = Some(iothub_suffix);
        config.trust_bundle_path = trust_bundle_path;
        config.workload = Some(workload);
        config.validate()?;
        Ok(config)
    }
}

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use edge_method::{
    ClientConfig, ConfigError, ConnectionString, EdgeAuthProvider, EdgeEnvironment, InvokeError,
    MethodHandle, MethodRequest,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "edge-invoke", about = "Invoke direct methods through an edge gateway", version)]
#[command(group(ArgGroup::new("source").args(["config", "from_env", "connection_string"])))]
struct Cli {
    /// TOML client configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read the settings the edge runtime exports (the default).
    #[arg(long)]
    from_env: bool,

    #[arg(long)]
    connection_string: Option<String>,

    /// PEM file with the CA chain that signed the gateway certificate.
    #[arg(long)]
    trust_bundle: Option<PathBuf>,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Invoke {
        device: String,
        module: String,
        method: String,
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long, default_value_t = 30)]
        timeout: u32,
    },
    ShowConfig,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("edge-invoke error [{}]: {err:#}", error_code(&err));
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli, |name| std::env::var(name).ok())?;
    match cli.command {
        Command::Invoke { device, module, method, payload, timeout } => {
            serde_json::from_str::<serde_json::Value>(&payload)
                .context("--payload must be a JSON document")?;
            let provider = config
                .authorization_provider()
                .context("no usable signer in the selected configuration")?;
            log::debug!("signing with {}", signer_name(&provider));
            let handle = MethodHandle::from_config(&config, provider)?;
            let response =
                handle.invoke(&device, &module, &MethodRequest::new(method, payload, timeout))?;
            println!("status: {}", response.status);
            println!("{}", String::from_utf8_lossy(&response.payload));
        }
        Command::ShowConfig => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("failed to render configuration")?;
            print!("{rendered}");
        }
    }
    Ok(())
}

fn resolve_config<F>(cli: &Cli, lookup: F) -> Result<ClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = if let Some(path) = &cli.config {
        ClientConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?
    } else if let Some(connection_string) = &cli.connection_string {
        ConnectionString::parse(connection_string)
            .and_then(ConnectionString::into_client_config)
            .context("invalid --connection-string")?
    } else {
        if !cli.from_env {
            log::debug!("no config source given, reading edge environment");
        }
        EdgeEnvironment::from_lookup(lookup).context("edge environment is incomplete")?
    };
    if let Some(trust_bundle) = &cli.trust_bundle {
        config.trust_bundle_path = Some(trust_bundle.clone());
    }
    log::debug!(
        "resolved config hostname={} device={} module={}",
        config.hostname,
        config.device_id,
        config.module_id
    );
    Ok(config)
}

fn signer_name(provider: &EdgeAuthProvider) -> &'static str {
    match provider {
        EdgeAuthProvider::SharedAccessKey(_) => "shared access key",
        EdgeAuthProvider::Workload(_) => "workload api",
    }
}

fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(err) = err.downcast_ref::<InvokeError>() {
        return err.code();
    }
    if let Some(err) = err.downcast_ref::<ConfigError>() {
        return err.code();
    }
    "EDGE_INVOKE_FAILED"
}

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use dubbo_invoke_engine::codec::parse_argument_list;
use dubbo_invoke_engine::{EngineConfig, InvocationEngine, InvocationRequest};
use dubbo_invoke_types::{ProviderEndpoint, RegistryAddress};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_REGISTRY: &str = "zookeeper://127.0.0.1:2181";

/// Generic invocation of Dubbo services through the provider console.
#[derive(Parser, Debug)]
#[command(name = "dubbo-invoke", version, about)]
struct Cli {
    /// Registry address, e.g. zookeeper://host:2181, nacos://host:8848?namespace=dev or direct://host:20880
    #[arg(long, global = true, env = "DUBBO_INVOKE_REGISTRY", default_value = DEFAULT_REGISTRY)]
    registry: String,

    /// Nacos namespace, overriding the one in the registry address
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Invoke `service.method(args)` and print the result as JSON
    Invoke {
        /// Call expression, e.g. 'com.acme.UserService.getUser(42)'
        expression: String,

        /// JSON array of arguments; the expression is then just `service.method`
        #[arg(long)]
        args: Option<String>,

        /// Call timeout in milliseconds. Also bounds the wait for the first
        /// reply byte; a response still streaming is cut off after three times
        /// this value
        #[arg(long)]
        timeout: Option<u64>,

        /// Print only the payload instead of the result envelope
        #[arg(long)]
        raw: bool,
    },
    /// List services known to the registry
    List {
        /// Include instance health (Nacos registries)
        #[arg(long)]
        details: bool,

        /// Ask a provider console (HOST:PORT) instead of the registry
        #[arg(long, value_name = "HOST:PORT")]
        console: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let mut address = RegistryAddress::parse(&cli.registry).with_context(|| format!("invalid --registry '{}'", cli.registry))?;
    if let Some(namespace) = &cli.namespace {
        address = address.with_namespace(namespace);
    }
    debug!(registry = %address, "registry selected");

    match cli.command {
        Commands::Invoke {
            expression,
            args,
            timeout,
            raw,
        } => run_invoke(&address, &expression, args.as_deref(), timeout, raw).await,
        Commands::List { details, console } => {
            run_list(&address, details, console.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_invoke(address: &RegistryAddress, expression: &str, args: Option<&str>, timeout: Option<u64>, raw: bool) -> Result<ExitCode> {
    let request = build_request(expression, args)?;
    let engine = InvocationEngine::new(address, invoke_config(timeout)).context("could not prepare the registry")?;

    let result = engine.invoke(&request).await;
    let output = if raw && result.success {
        serde_json::to_string_pretty(&result.payload)?
    } else {
        serde_json::to_string_pretty(&result.to_wire())?
    };
    println!("{output}");
    Ok(if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn invoke_config(timeout: Option<u64>) -> EngineConfig {
    let config = EngineConfig::from_env();
    match timeout {
        Some(millis) => config.with_call_timeout(Duration::from_millis(millis)),
        None => config,
    }
}

fn build_request(expression: &str, args: Option<&str>) -> Result<InvocationRequest> {
    let Some(args) = args else {
        return InvocationRequest::parse(expression).with_context(|| format!("could not parse '{expression}'"));
    };
    let (service, method) = expression
        .trim()
        .rsplit_once('.')
        .filter(|(service, method)| !service.is_empty() && !method.is_empty())
        .ok_or_else(|| anyhow!("expected 'service.method' when --args is given, got '{expression}'"))?;
    let arguments = parse_argument_list(args).context("could not parse --args")?;
    Ok(InvocationRequest::new(service, method, arguments))
}

async fn run_list(address: &RegistryAddress, details: bool, console: Option<&str>) -> Result<()> {
    let engine = InvocationEngine::new(address, EngineConfig::from_env()).context("could not prepare the registry")?;

    if let Some(console) = console {
        let endpoint = parse_console_endpoint(console)?;
        for service in engine.list_console_services(&endpoint).await.context("console listing failed")? {
            println!("{service}");
        }
        return Ok(());
    }

    if details {
        let services = engine.list_service_details().await.context("service listing failed")?;
        println!("{}", serde_json::to_string_pretty(&services)?);
    } else {
        for service in engine.list_services().await.context("service listing failed")? {
            println!("{service}");
        }
    }
    Ok(())
}

fn parse_console_endpoint(text: &str) -> Result<ProviderEndpoint> {
    let (host, port) = text
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected HOST:PORT, got '{text}'"))?;
    let port = port.parse::<u16>().with_context(|| format!("invalid port in '{text}'"))?;
    if host.is_empty() {
        return Err(anyhow!("expected HOST:PORT, got '{text}'"));
    }
    Ok(ProviderEndpoint::new(host, port, "dubbo"))
}

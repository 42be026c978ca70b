//! # ApiRpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start a demo server
//! apirpc serve -b 127.0.0.1:9001
//!
//! # Call an action (outputs raw JSON)
//! apirpc call -s tcp://127.0.0.1:9001,127.0.0.1:9002 Demo/Add -a '[1, 2]'
//!
//! # Send a one-way action
//! APIRPC_SERVERS=127.0.0.1:9001 apirpc notify Demo/Log -a '"hello"'
//! ```

use anyhow::Result;
use apirpc_cli::{demo, parse_args, resolve_servers, SERVERS_ENV};
use apirpc_client::ApiClient;
use apirpc_common::api::{ApiHandler, RequestHandler};
use apirpc_common::transport::TcpServer;
use apirpc_common::JsonEncoder;
use argh::FromArgs;
use std::sync::Arc;
use std::time::Duration;

#[derive(FromArgs)]
/// ApiRpc - load-balancing RPC client
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Notify(NotifyArgs),
    Serve(ServeArgs),
}

/// Arguments for invoking one action and printing its result.
///
/// The result is written to stdout as raw JSON so it can be piped to `jq`.
/// Errors go to stderr with a non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call an action and print the JSON result
struct CallArgs {
    /// comma-separated server list, defaults to $APIRPC_SERVERS
    #[argh(option, short = 's')]
    servers: Option<String>,

    /// action to call, e.g. Demo/Echo
    #[argh(positional)]
    action: String,

    /// JSON arguments for the action
    #[argh(option, short = 'a', default = "String::new()")]
    args: String,

    /// flag byte sent with the request
    #[argh(option, short = 'f', default = "0")]
    flag: u8,

    /// call timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "notify")]
/// send a one-way action
struct NotifyArgs {
    /// comma-separated server list, defaults to $APIRPC_SERVERS
    #[argh(option, short = 's')]
    servers: Option<String>,

    /// action to send
    #[argh(positional)]
    action: String,

    /// JSON arguments for the action
    #[argh(option, short = 'a', default = "String::new()")]
    args: String,

    /// flag byte sent with the request
    #[argh(option, short = 'f', default = "0")]
    flag: u8,
}

/// Arguments for the demo server.
///
/// The server answers `Api/All`, `Api/Info` and the `Demo` actions.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run a demo server
struct ServeArgs {
    /// address to bind to
    #[argh(option, short = 'b', default = "\"0.0.0.0:9001\".into()")]
    bind: String,

    /// host name reported by Api/Info
    #[argh(option, short = 'n', default = "\"ApiServer\".into()")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep call output clean for piping unless RUST_LOG says otherwise
    let default_level = match cli.command {
        Commands::Call(_) => "warn",
        _ => "info",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Call(args) => run_call(args).await,
        Commands::Notify(args) => run_notify(args).await,
        Commands::Serve(args) => run_serve(args).await,
    }
}

fn build_client(servers: Option<String>, timeout: Duration) -> Result<ApiClient> {
    let servers = resolve_servers(servers, std::env::var(SERVERS_ENV).ok())?;
    Ok(ApiClient::builder().servers(&servers).timeout(timeout).build())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let call_args = parse_args(&args.args)?;
    let client = build_client(args.servers, Duration::from_millis(args.timeout_ms))?;

    let result = client.invoke_value(&args.action, call_args, args.flag).await;
    client.close("CallDone").await;

    println!("{}", serde_json::to_string(&result?)?);
    Ok(())
}

async fn run_notify(args: NotifyArgs) -> Result<()> {
    let call_args = parse_args(&args.args)?;
    let client = build_client(args.servers, Duration::from_secs(30))?;

    let sent = client.invoke(&args.action, call_args, args.flag).await;
    client.close("NotifyDone").await;

    if !sent? {
        anyhow::bail!("No server could be reached");
    }
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let registry = demo::registry(&args.name);
    let handler: Arc<dyn RequestHandler> =
        Arc::new(ApiHandler::new(args.name.clone(), registry, Arc::new(JsonEncoder::new())));

    let server = TcpServer::bind(&args.bind).await?;
    tracing::info!(name = %args.name, addr = %server.local_addr()?, "demo server listening");
    server.serve(handler).await?;
    Ok(())
}

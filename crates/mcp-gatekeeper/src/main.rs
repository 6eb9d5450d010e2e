//! MCP gatekeeper demo server - Entry Point
//!
//! Serves the `echo` and `greet` tools over HTTP behind PAT and (optionally) OAuth
//! authentication.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_gatekeeper::{
    Config, McpServer, UserInfo,
    config::{OAuthRouterConfig, PatSettings, defaults},
    tools::{
        ToolSet,
        demo::{EchoTool, GreetTool},
    },
};

#[derive(Parser, Debug)]
#[command(name = "mcp-gatekeeper")]
#[command(about = "Demo MCP server with OAuth and personal access token authentication")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Public base URL of this server (enables OAuth together with the OIDC settings)
    #[arg(long, env = "MCP_RESOURCE_URL")]
    resource_url: Option<String>,

    /// Identity provider base URL
    #[arg(long, env = "OIDC_ISSUER_URL")]
    issuer_url: Option<String>,

    /// Identity provider realm
    #[arg(long, env = "OIDC_REALM")]
    realm: Option<String>,

    /// Shared public client id handed out by dynamic registration
    #[arg(long, env = "OIDC_CLIENT_ID")]
    client_id: Option<String>,

    /// Expected `aud` claim on bearer tokens
    #[arg(long, env = "OIDC_AUDIENCE")]
    audience: Option<String>,

    /// Human-readable service name
    #[arg(long, env = "MCP_SERVICE_NAME", default_value = defaults::SERVICE_NAME)]
    service_name: String,

    /// Header carrying personal access tokens
    #[arg(long, env = "MCP_PAT_HEADER", default_value = defaults::PAT_HEADER)]
    pat_header: String,

    /// Prefix identifying personal access tokens
    #[arg(long, env = "MCP_PAT_PREFIX", default_value = "demo_pat_")]
    pat_prefix: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

/// Accepts any non-empty token and derives a demo user from it.
async fn verify_demo_token(token: String) -> Option<UserInfo> {
    if token.is_empty() {
        return None;
    }
    let short: String = token.chars().take(8).collect();
    Some(
        UserInfo::new(format!("demo-{short}"))
            .with_username(format!("demo_{short}"))
            .with_name("Demo User"),
    )
}

fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .with_instructions("Demo server exposing the echo and greet tools.")
        .with_pat(PatSettings::new(&cli.pat_header, &cli.pat_prefix));

    match (&cli.resource_url, &cli.issuer_url, &cli.realm, &cli.client_id) {
        (Some(resource), Some(issuer), Some(realm), Some(client)) => {
            config = config.with_oauth(OAuthRouterConfig::new(
                resource.as_str(),
                issuer.as_str(),
                realm.as_str(),
                client.as_str(),
                cli.service_name.as_str(),
            )?);
        }
        (None, None, None, None) => tracing::info!("OAuth not configured; PAT only"),
        _ => anyhow::bail!(
            "OAuth needs all of --resource-url, --issuer-url, --realm and --client-id"
        ),
    }

    if let Some(audience) = &cli.audience {
        config = config.with_audience(audience);
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting MCP gatekeeper demo server");

    let config = build_config(&cli)?;
    let tools = ToolSet::new().with(EchoTool)?.with(GreetTool)?;

    McpServer::new(config, tools).with_pat_verifier(verify_demo_token).run_http(cli.port).await
}

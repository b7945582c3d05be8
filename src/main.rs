use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use cairo_pilot::constants::{DEFAULT_PORT, DEFAULT_REPLY_DELAY_MS};
use cairo_pilot::web_server::{self, WebOptions};
use cairo_pilot::{
    chat, AppState, AppwriteGateway, GatewayConfig, IdentityGateway, Provider, ResponseSimulator,
};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    gateway: GatewayArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Identity gateway settings; flags override the environment.
#[derive(clap::Args, Debug)]
struct GatewayArgs {
    /// Identity gateway endpoint, e.g. https://cloud.appwrite.io/v1
    #[arg(long, global = true, env = "APPWRITE_ENDPOINT")]
    endpoint: Option<String>,

    /// Identity gateway project id.
    #[arg(long, global = true, env = "APPWRITE_PROJECT_ID")]
    project: Option<String>,

    /// Server API key used to turn an OAuth token into a session.
    #[arg(long, global = true, env = "APPWRITE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Where the gateway sends the browser after a successful login.
    /// Defaults to the local web server's /auth/callback.
    #[arg(long, global = true, env = "APPWRITE_OAUTH_SUCCESS_URL")]
    oauth_success_url: Option<String>,

    /// Where the gateway sends the browser after a failed login.
    #[arg(long, global = true, env = "APPWRITE_OAUTH_FAILURE_URL")]
    oauth_failure_url: Option<String>,
}

impl GatewayArgs {
    /// Environment first, then flags; redirects default to the server on `port`.
    fn into_config(self, port: u16) -> GatewayConfig {
        let mut config = GatewayConfig::from_env_on_port(port);
        if let Some(endpoint) = given(self.endpoint) {
            config.endpoint = Some(endpoint);
        }
        if let Some(project) = given(self.project) {
            config.project_id = Some(project);
        }
        if let Some(key) = given(self.api_key) {
            config = config.with_api_key(key);
        }
        if let Some(url) = given(self.oauth_success_url) {
            config.oauth_success_url = url;
        }
        if let Some(url) = given(self.oauth_failure_url) {
            config.oauth_failure_url = url;
        }
        config.report();
        config
    }
}

fn given(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the web UI.
    Start {
        #[arg(long, default_value_t = DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding index.html.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
        #[arg(
            long,
            default_value_t = DEFAULT_REPLY_DELAY_MS,
            help = "Simulated reply delay in milliseconds."
        )]
        reply_delay_ms: u64,
    },
    /// Chat with Cairo Pilot in the terminal.
    Chat {
        #[arg(
            long,
            default_value_t = DEFAULT_REPLY_DELAY_MS,
            help = "Simulated reply delay in milliseconds."
        )]
        reply_delay_ms: u64,
    },
    /// Print the URL that starts an OAuth login.
    LoginUrl {
        #[arg(value_parser = parse_provider, help = "google or github")]
        provider: Provider,
        #[arg(
            long,
            default_value_t = DEFAULT_PORT,
            help = "Port of the web server that receives the OAuth redirect."
        )]
        port: u16,
    },
}

fn parse_provider(value: &str) -> Result<Provider, String> {
    value.parse()
}

fn build_state(config: GatewayConfig, reply_delay_ms: u64) -> AppState {
    let gateway: Arc<dyn IdentityGateway> = Arc::new(AppwriteGateway::new(config));
    AppState::new(gateway, ResponseSimulator::new(Duration::from_millis(reply_delay_ms)))
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for the gateway settings)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,cairo_pilot=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("Cairo Pilot starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Start {
            port,
            templates,
            static_dir,
            reply_delay_ms,
        } => {
            let state = build_state(cli.gateway.into_config(port), reply_delay_ms);
            state.spawn_resync();

            let options = WebOptions {
                templates_dir: templates,
                static_dir,
            };
            let web_state = state.clone();
            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, web_state, options).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            state.shutdown().await;
            info!("Shutdown complete.");
        }
        Commands::Chat { reply_delay_ms } => {
            let state = build_state(cli.gateway.into_config(DEFAULT_PORT), reply_delay_ms);
            state.resync().await;
            chat::run_terminal_chat(state.clone())
                .await
                .context("Chat session failed")?;
            state.shutdown().await;
        }
        Commands::LoginUrl { provider, port } => {
            let gateway = AppwriteGateway::new(cli.gateway.into_config(port));
            let url = gateway
                .oauth_url(provider)
                .context("Cannot build the login URL")?;
            println!("{}", url);
        }
    }

    Ok(())
}

//! linewire-mcp entry point.

use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio::sync::mpsc;

use linewire::{resolve_request_timeout, ConnectionBuilder, JsonRpcNotification, WireConfig};
use linewire_mcp::config::{
    default_initialize_params, resolve_server_command, DEFAULT_SHUTDOWN_GRACE,
};
use linewire_mcp::smoke::{run_smoke, StepReport};
use linewire_mcp::{McpClient, ServerProcess};

#[derive(Parser)]
#[command(
    name = "linewire-mcp",
    about = "Drive an MCP server over stdio: smoke run, single calls, or an interactive session",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG overrides it.
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Request timeout in milliseconds. Also reads LINEWIRE_TIMEOUT_MS.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Seconds the server gets to exit after its stdin is closed.
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE.as_secs(), global = true)]
    grace_secs: u64,

    /// Server command for the default smoke run. Also reads LINEWIRE_SERVER.
    #[arg(last = true)]
    server: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the smoke sequence against a server (default).
    Run {
        /// Print one JSON report instead of per-step output.
        #[arg(long)]
        json: bool,

        /// Client name sent in clientInfo.
        #[arg(long)]
        client_name: Option<String>,

        /// Server command, after `--`.
        #[arg(last = true)]
        server: Vec<String>,
    },

    /// Initialize, send one request, print the result.
    Call {
        /// Method name, for example `tools/list`.
        method: String,

        /// Params as a JSON string.
        params: Option<String>,

        /// Server command, after `--`.
        #[arg(last = true)]
        server: Vec<String>,
    },

    /// Launch an interactive session with a server.
    Repl {
        /// Server command, after `--`.
        #[arg(last = true)]
        server: Vec<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   linewire-mcp completions bash > ~/.local/share/bash-completion/completions/linewire-mcp
    ///   linewire-mcp completions zsh > ~/.zfunc/_linewire-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

/// Settings shared by every subcommand that starts a server.
struct Session {
    config: WireConfig,
    grace: Duration,
}

impl Session {
    fn from_cli(cli: &Cli) -> Self {
        let config = WireConfig {
            request_timeout: resolve_request_timeout(cli.timeout_ms.map(Duration::from_millis)),
            ..WireConfig::default()
        };
        Self {
            config,
            grace: Duration::from_secs(cli.grace_secs),
        }
    }

    /// Spawn the server and attach a client. Server notifications are logged.
    fn start(&self, server: &[String]) -> anyhow::Result<(ServerProcess, Arc<McpClient>)> {
        let command = resolve_server_command(server)?;
        let (tx, rx) = mpsc::channel(self.config.observer_capacity);
        tokio::spawn(log_notifications(rx));

        let builder = ConnectionBuilder::new()
            .config(self.config.clone())
            .on_notification(tx);
        let process = ServerProcess::spawn(&command, builder)?;
        let client = Arc::new(McpClient::new(process.connection().clone()));
        Ok((process, client))
    }

    async fn stop(&self, process: ServerProcess) {
        if let Err(e) = process.shutdown(self.grace).await {
            tracing::warn!("Server shutdown: {e}");
        }
    }
}

async fn log_notifications(mut rx: mpsc::Receiver<JsonRpcNotification>) {
    while let Some(notification) = rx.recv().await {
        tracing::info!(method = %notification.method, params = ?notification.params, "Server notification");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let session = Session::from_cli(&cli);

    match cli.command.unwrap_or(Commands::Run {
        json: false,
        client_name: None,
        server: cli.server,
    }) {
        Commands::Run {
            json,
            client_name,
            server,
        } => {
            let (process, client) = session.start(&server)?;
            let params = default_initialize_params(client_name.as_deref());
            let label = process.command().to_string();

            let report = run_smoke(&client, params, Some(label), |step| {
                if !json {
                    print_step(step);
                }
            })
            .await;
            session.stop(process).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                eprintln!();
                eprintln!(
                    "{} {}/{} steps in {} ms (started {})",
                    if report.passed { "PASS" } else { "FAIL" },
                    report.steps.iter().filter(|s| s.ok).count(),
                    linewire_mcp::SmokeStep::ALL.len(),
                    report.elapsed_ms,
                    report.started_at.to_rfc3339()
                );
            }

            if let Err(e) = report.into_result() {
                eprintln!("Smoke run failed: {e}");
                std::process::exit(1);
            }
        }

        Commands::Call {
            method,
            params,
            server,
        } => {
            let params = params
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?;

            let (process, client) = session.start(&server)?;
            let outcome: linewire_mcp::McpResult<serde_json::Value> = async {
                client.initialize(default_initialize_params(None)).await?;
                client.call_raw(&method, params).await
            }
            .await;
            session.stop(process).await;

            match outcome {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => {
                    eprintln!("Error ({}): {e}", e.code());
                    std::process::exit(1);
                }
            }
        }

        Commands::Repl { server } => {
            let (process, client) = session.start(&server)?;
            client.initialize(default_initialize_params(None)).await?;

            let runtime = tokio::runtime::Handle::current();
            let repl_client = client.clone();
            let outcome =
                tokio::task::spawn_blocking(move || linewire_mcp::repl::run(runtime, repl_client))
                    .await;
            session.stop(process).await;
            outcome??;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "linewire-mcp", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn print_step(step: &StepReport) {
    println!(
        "=== {}. {} ({}) {} ms ===",
        step.index,
        step.step.title(),
        step.method,
        step.elapsed_ms
    );
    match (&step.result, &step.error) {
        (Some(result), _) => match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{result}"),
        },
        (None, Some(error)) => println!("ERROR: {error}"),
        (None, None) => {}
    }
    println!();
}

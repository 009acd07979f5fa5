//! `dashboard-client`: issue one API call through the resilient pipeline.
//!
//! ```text
//! dashboard-client --config client.toml --token <access> get /contacts --param page=2 --cache
//! dashboard-client post /tasks --data '{"title":"Call back"}' --retries 2
//! ```
//!
//! Ctrl-C cancels the in-flight request (reported as `aborted`).

use clap::{Args, Parser, Subcommand};
use reqwest::Method;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use dashboard_client::config::{load_config, parse_config};
use dashboard_client::observability::init_logging;
use dashboard_client::{ApiError, RequestConfig, RequestPipeline, TokenPair};

#[derive(Parser)]
#[command(name = "dashboard-client")]
#[command(about = "Call the dashboard API with retries, caching and session refresh", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Access token for header-based auth.
    #[arg(short, long, env = "DASHBOARD_API_TOKEN")]
    token: Option<String>,

    /// Refresh token used when the access token is rejected.
    #[arg(long, env = "DASHBOARD_API_REFRESH_TOKEN")]
    refresh_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a resource
    Get(CallArgs),
    /// POST a JSON body
    Post(CallArgs),
    /// PUT a JSON body
    Put(CallArgs),
    /// PATCH a JSON body
    Patch(CallArgs),
    /// DELETE a resource
    Delete(CallArgs),
}

#[derive(Args)]
struct CallArgs {
    /// Path relative to the base URL, or an absolute URL.
    path: String,

    /// JSON request body.
    #[arg(short, long)]
    data: Option<String>,

    /// Query parameter as name=value (repeatable).
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Extra attempts for transient failures.
    #[arg(short, long)]
    retries: Option<u32>,

    /// Serve from / store into the response cache (GET only).
    #[arg(long)]
    cache: bool,

    /// Deadline for the whole call, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

impl Commands {
    fn into_parts(self) -> (Method, CallArgs) {
        match self {
            Commands::Get(args) => (Method::GET, args),
            Commands::Post(args) => (Method::POST, args),
            Commands::Put(args) => (Method::PUT, args),
            Commands::Patch(args) => (Method::PATCH, args),
            Commands::Delete(args) => (Method::DELETE, args),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path),
        None => parse_config(""),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.observability);
    tracing::debug!(base_url = %config.base_url, "dashboard-client starting");

    let pipeline = match RequestPipeline::with_reqwest(config) {
        Ok(pipeline) => pipeline,
        Err(e) => return report(&e),
    };
    if let Some(token) = cli.token {
        pipeline.auth().set_tokens(TokenPair::new(token, cli.refresh_token));
    }

    let (method, args) = cli.command.into_parts();
    let request = match build_request(method, args) {
        Ok(request) => request,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling request");
            on_interrupt.cancel();
        }
    });

    match pipeline.execute_raw(request.signal(cancel)).await {
        Ok(response) => {
            let rendered = serde_json::to_string_pretty(&response.data)
                .unwrap_or_else(|_| response.data.to_string());
            println!("{}", rendered);
            ExitCode::SUCCESS
        }
        Err(e) => report(&e),
    }
}

fn build_request(method: Method, args: CallArgs) -> Result<RequestConfig, String> {
    let mut request = RequestConfig::new(method, args.path).cache(args.cache);

    if let Some(data) = args.data {
        let body: Value = serde_json::from_str(&data).map_err(|e| format!("--data is not valid JSON: {}", e))?;
        request = request.json(body);
    }
    for (name, value) in args.params {
        request = request.param(name, value);
    }
    if let Some(retries) = args.retries {
        request = request.retries(retries);
    }
    if let Some(ms) = args.timeout_ms {
        request = request.timeout(Duration::from_millis(ms));
    }
    Ok(request)
}

fn report(error: &ApiError) -> ExitCode {
    let rendered = json!({
        "kind": error.kind().to_string(),
        "status": error.status(),
        "message": error.message(),
        "code": error.code(),
        "details": error.details(),
    });
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&rendered).unwrap_or_else(|_| rendered.to_string())
    );
    ExitCode::FAILURE
}

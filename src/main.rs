mod cache;
mod config;
mod error;
mod extract;
mod gate;
mod handlers;
mod llm;
mod logging;
mod metrics;
mod models;
mod orchestrator;
mod prompt;
mod rate_limit;
mod router;
mod state;
mod sweeper;
mod tools;
mod usage;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use cache::ToolCache;
use config::Args;
use error::ConfigError;
use llm::{CompletionBackend, OpenAiClient, Unconfigured};
use orchestrator::{Orchestrator, OrchestratorConfig};
use rate_limit::RateLimiter;
use state::AppState;
use tools::Toolbox;
use tools::bio::Bio;
use tools::github::{GITHUB_API, GitHubClient};
use tools::web::WebFetcher;
use usage::UsageTracker;

#[tokio::main]
async fn main() {
    // parse cli arguments
    let args = Args::parse();
    logging::setup_logging(args.json_logs(), "info");

    if let Err(e) = run(args).await {
        error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ConfigError> {
    let bio = Arc::new(Bio::load(&args.bio_path)?);

    let backend: Arc<dyn CompletionBackend> = match args.openai_api_key.clone() {
        Some(key) if !key.is_empty() => Arc::new(OpenAiClient::new(
            &args.openai_base_url,
            key,
            args.model.clone(),
            args.max_output_tokens,
        )?),
        _ => {
            warn!("OPENAI_API_KEY not set, /chat will answer 500");
            Arc::new(Unconfigured {
                model: args.model.clone(),
            })
        }
    };

    let github = GitHubClient::new(GITHUB_API, args.github_token.as_deref(), args.github_user.clone())?;
    if args.github_token.is_none() {
        warn!("GITHUB_TOKEN not set, GitHub tools use the unauthenticated rate limit");
    }

    let tool_cache = Arc::new(ToolCache::new(Duration::from_secs(args.cache_ttl)));
    let toolbox = Toolbox::new(bio.clone(), github, WebFetcher::new()?, tool_cache.clone());

    let usage = Arc::new(UsageTracker::new());
    let orchestrator = Orchestrator::new(
        backend,
        Arc::new(toolbox),
        usage.clone(),
        prompt::system_prompt(&bio, &args.github_user),
        OrchestratorConfig {
            time_budget: args.request_timeout(),
            max_output_tokens: args.max_output_tokens,
            ..OrchestratorConfig::default()
        },
    );

    // creating shared state
    let state = Arc::new(AppState {
        api_secret: args.api_secret.clone(),
        trust_forwarded_for: args.trust_forwarded_for,
        usage: usage.clone(),
        limiter: RateLimiter::new(args.rate_limits(), usage),
        orchestrator,
        tool_cache,
    });

    // spawn the background sweeper
    let sweeper_state = state.clone();
    let sweep_every = Duration::from_secs(args.sweep_interval.max(1));
    tokio::spawn(async move {
        sweeper::sweeper(sweeper_state, sweep_every).await;
    });

    let model = state.orchestrator.model().to_string();
    let app = router::build_router(state, &args.cors_origins());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ConfigError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    let limits = args.rate_limits();
    info!(
        %addr,
        environment = ?args.environment,
        model = %model,
        per_minute = limits.per_minute,
        per_hour = limits.per_hour,
        global_per_hour = limits.global_per_hour,
        "agent listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(ConfigError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

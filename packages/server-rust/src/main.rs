//! `openai-relay` entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use relay_server::auth::{Authenticator, CredentialStore};
use relay_server::config::{RelayArgs, RelayConfig};
use relay_server::logging::init_tracing;
use relay_server::network::{NetworkModule, TransportMode};
use relay_server::provider::OpenAiProvider;
use relay_server::service::{build_provider_pipeline, GenerateTool, McpDispatcher};
use relay_server::stdio::serve_stdio;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let args = RelayArgs::parse();
    init_tracing(args.log_format)?;
    let config = args.into_config().context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let result = runtime.block_on(run(config));
    // A blocking stdin read may still be parked after the stdio transport stops.
    runtime.shutdown_timeout(Duration::from_secs(1));

    if let Err(e) = &result {
        error!(error = ?e, "openai-relay stopped with an error");
    }
    result
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let provider =
        Arc::new(OpenAiProvider::new(&config.openai).context("failed to build OpenAI client")?);
    info!(
        endpoint = provider.endpoint(),
        model = %config.service.defaults.model,
        timeout_ms = config.service.provider_timeout_ms,
        "provider configured"
    );

    let pipeline = build_provider_pipeline(provider, &config.service);
    let tool = GenerateTool::new(pipeline, config.service.defaults.clone());
    let dispatcher = Arc::new(McpDispatcher::new(tool, &config.service));

    let transport = config.network.transport;
    if !transport.requires_auth() {
        return serve_stdio(dispatcher, shutdown_signal()).await;
    }

    let store = Arc::new(CredentialStore::resolve(config.mcp_api_key.as_deref()));
    info!(
        fingerprint = %store.fingerprint(),
        source = ?store.source(),
        bypass = ?config.auth_policy.bypass_paths(),
        "client credential ready"
    );
    let authenticator = Arc::new(Authenticator::new(store, config.auth_policy.clone()));

    let mut module = NetworkModule::new(config.network.clone(), dispatcher, authenticator);
    let port = module.start().await.context("failed to bind listener")?;
    info!(
        %transport,
        host = %config.network.host,
        port,
        "openai-relay listening"
    );
    if transport == TransportMode::Sse {
        info!(
            sse = %config.network.endpoints.sse_path,
            messages = %config.network.endpoints.messages_path,
            "legacy SSE endpoints mounted"
        );
    }

    module.serve(shutdown_signal()).await
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

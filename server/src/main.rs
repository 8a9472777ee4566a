// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0

//! # bkgate server
//!
//! Token-authenticated JSON bridge to the university portal: CAS login
//! automation, the course-registration workflow and LMS messages, backed by
//! an encrypted session store and a budgeted stale-while-revalidate cache.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use bkgate_core::application::auth::AuthService;
use bkgate_core::application::cache::SwrCache;
use bkgate_core::application::registration::{LiveContexts, RegistrationService};
use bkgate_core::domain::budget::CommandBudget;
use bkgate_core::domain::config::GateConfig;
use bkgate_core::infrastructure::cas::CasGateway;
use bkgate_core::infrastructure::crypto::RecordCipher;
use bkgate_core::infrastructure::kv::InMemoryKvStore;
use bkgate_core::infrastructure::lms::LmsGateway;
use bkgate_core::infrastructure::session_store::SessionStore;
use bkgate_core::presentation::api::{self, AppState};

/// bkgate - portal bridge server
#[derive(Parser)]
#[command(name = "bkgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "BKGATE_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bind host (overrides configuration)
    #[arg(long, env = "BKGATE_HOST")]
    host: Option<String>,

    /// Bind port (overrides configuration)
    #[arg(long, env = "BKGATE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BKGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let mut config = GateConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let config = Arc::new(config);

    // Shared infrastructure.
    let kv = Arc::new(InMemoryKvStore::new());
    let budget = Arc::new(CommandBudget::new(
        config.cache.daily_command_limit,
        config.cache.circuit_threshold,
        chrono::Utc::now().date_naive(),
    ));
    let cipher = RecordCipher::from_hex_key(&config.security.encryption_key)
        .context("Invalid encryption key")?;
    let store = Arc::new(SessionStore::new(
        kv.clone(),
        cipher,
        config.session_ttl(),
        config.refresh_ttl(),
    ));

    // Services.
    let contexts = Arc::new(LiveContexts::new());
    let gateway = Arc::new(CasGateway::new(config.clone()));
    let lms_gateway = Arc::new(LmsGateway::new(config.clone()).context("Failed to build LMS client")?);
    let auth = Arc::new(AuthService::new(
        gateway,
        lms_gateway.clone(),
        store,
        contexts.clone(),
    ));
    let registration = Arc::new(RegistrationService::new(config.clone(), contexts));
    let cache = SwrCache::new(kv, budget);

    let login_quota = governor::Quota::per_minute(
        std::num::NonZeroU32::new(config.session.login_attempts_per_minute.max(1))
            .expect("max(1) is non-zero"),
    );

    let state = Arc::new(AppState {
        auth,
        registration,
        lms: lms_gateway,
        cache,
        login_limiter: governor::RateLimiter::direct(login_quota),
        started: Instant::now(),
    });

    let app = api::app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("bkgate listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("bkgate shutting down");

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

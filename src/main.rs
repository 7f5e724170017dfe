use std::{env, fs, str::FromStr, sync::Arc, thread, time::Duration};

use axum::ServiceExt;
use axum_sessions::async_session::{
    base64::{self, URL_SAFE_NO_PAD},
    MemoryStore,
};
use color_eyre::{
    eyre::{bail, Context},
    Result,
};
use config::Config;
use rand::{thread_rng, RngCore};
use storage::{JsonStore, StorageExecutor};
use tokio::{select, time::interval};
use tokio_util::sync::CancellationToken;
use tower_http::normalize_path::NormalizePathLayer;
use tower_layer::Layer;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

mod config;
mod docx;
mod ingest;
mod posts;
mod router;
mod storage;
mod templates;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::config::HookBuilder::default()
        .display_env_section(false)
        .install()?;
    match env::args().nth(1).as_deref() {
        None => serve().await,
        Some("gensecret") => {
            println!("{}", cookie_secret());
            Ok(())
        }
        Some(other) => bail!("Unknown subcommand '{other}', the only one is 'gensecret'"),
    }
}

/// A fresh value for `cookie_secret`.
fn cookie_secret() -> String {
    let mut bytes = [0u8; 64];
    thread_rng().fill_bytes(&mut bytes);
    base64::encode_config(bytes, URL_SAFE_NO_PAD)
}

fn init_logging(level: &str) -> Result<WorkerGuard> {
    let level = Level::from_str(level).wrap_err_with(|| format!("Invalid log_level '{level}'"))?;
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .init();
    Ok(guard)
}

async fn serve() -> Result<()> {
    let cfg = Arc::new(Config::load().wrap_err("Failed to load the configuration file")?);
    let _log_guard = init_logging(&cfg.log_level)?;
    tracing::info!(concat!("Starting fundsite v", env!("CARGO_PKG_VERSION")));

    fs::create_dir_all(&cfg.upload_dir).wrap_err_with(|| {
        format!("Failed to create upload directory {}", cfg.upload_dir.display())
    })?;

    let (storage_exec, storage) =
        StorageExecutor::create(JsonStore::new(&cfg.posts_file, &cfg.image_data_file));
    let storage_thread = thread::spawn(move || storage_exec.run());

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let sessions = MemoryStore::new();
    let sweeper = tokio::spawn(sweep_sessions(sessions.clone(), shutdown.clone()));

    let router = router::build(storage, cfg.clone(), sessions).await?;
    let app = NormalizePathLayer::trim_trailing_slash().layer(router);

    tracing::info!("Listening on {}", cfg.listen);
    let server_shutdown = shutdown.clone();
    let served = axum::Server::bind(&cfg.listen)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await;
    if let Err(e) = served {
        tracing::error!("Server stopped with an error: {e}");
    }

    // the router, and with it the last storage connection, is gone by now
    shutdown.cancel();
    sweeper.await.wrap_err("Session sweeper panicked")?;
    if storage_thread.join().is_err() {
        tracing::error!("Storage executor panicked");
    }
    tracing::info!("Stopped");
    Ok(())
}

async fn watch_signals(shutdown: CancellationToken) {
    match termination().await {
        Ok(()) => {
            tracing::info!("Termination requested, draining connections");
            shutdown.cancel();
        }
        Err(e) => tracing::error!("Cannot listen for termination signals: {e}"),
    }
}

#[cfg(unix)]
async fn termination() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn termination() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn sweep_sessions(sessions: MemoryStore, shutdown: CancellationToken) {
    let mut ticker = interval(SESSION_SWEEP_INTERVAL);
    loop {
        select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        match sessions.cleanup().await {
            Ok(()) => tracing::debug!("Expired sessions swept"),
            Err(e) => tracing::error!("Failed to sweep sessions: {e}"),
        }
    }
}

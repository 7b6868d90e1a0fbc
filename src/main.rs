use std::{future::IntoFuture, process, sync::Arc};

use chatcache::{
    application::{
        chat::ChatService,
        error::AppError,
        generation::{Generator, ResponseGenerator},
    },
    cache::{CacheBackend, CacheConfig, KEY_NAMESPACE, MemoryBackend, ResponseCache},
    config::{self, CacheBackendKind},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        redis::RedisBackend,
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(err) if err.not_found() => {}
        Err(err) => return Err(AppError::unexpected(format!("failed to load .env: {err}"))),
    }

    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ClearCache(_) => run_clear_cache(settings).await,
    }
}

fn build_cache_backend(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, AppError> {
    let backend: Arc<dyn CacheBackend> = match config.backend {
        CacheBackendKind::Redis => {
            Arc::new(RedisBackend::new(config).map_err(|err| AppError::from(InfraError::from(err)))?)
        }
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    Ok(backend)
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = ResponseCache::new(build_cache_backend(&cache_config)?);

    if cache.connect().await {
        info!(
            target = "chatcache::serve",
            backend = cache.backend_name(),
            "Response cache ready"
        );
    } else {
        warn!(
            target = "chatcache::serve",
            backend = cache.backend_name(),
            "Response cache unreachable; serving uncached until it recovers"
        );
    }

    let generator = Generator::new(settings.generation.clone());
    info!(
        target = "chatcache::serve",
        live = generator.is_live(),
        model = %settings.generation.model,
        "Response generator ready"
    );
    let generator: Arc<dyn ResponseGenerator> = Arc::new(generator);

    let chat = ChatService::new(cache, generator, cache_config.expiration);
    let result = serve_http(&settings, HttpState { chat: chat.clone() }).await;

    chat.shutdown().await;
    result
}

async fn run_clear_cache(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let backend = build_cache_backend(&cache_config)?;

    let removed = backend
        .clear_prefix(KEY_NAMESPACE)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    backend.close().await;

    info!(target = "chatcache::clear_cache", removed, "Cache cleared");
    println!("Removed {removed} cached responses");
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let public_router = http::build_router(state.clone());
    let admin_router = http::build_admin_router(state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "chatcache::serve",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "Listening"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(stopped(stop_rx.clone()))
        .into_future();
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(stopped(stop_rx.clone()))
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let result = tokio::select! {
        result = async { try_join!(public_server, admin_server) } => {
            result
                .map(|_| ())
                .map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = async {
            stopped(stop_rx).await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "chatcache::serve",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    };

    signal_task.abort();
    result
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "chatcache::serve", "Shutdown signal received");
}

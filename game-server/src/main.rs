use clap::Parser;
use gomoku_server::acceptor::SessionAcceptor;
use gomoku_server::admin;
use gomoku_server::authority::LocalAuthority;
use gomoku_server::config::{CliArgs, ServerConfig};
use gomoku_server::error::ServerError;
use gomoku_server::game_session::GameSession;
use gomoku_server::host::{ExitReason, SessionHost};
use gomoku_server::results::{JsonLinesSink, LogSink, ResultDispatcher, ResultSink};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code when the server could not come up.
const STARTUP_FAILURE: u8 = 2;

#[tokio::main]
/// Loads the config, activates tracing, then serves one game. The exit code tells the supervisor
/// how the game ended.
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config = match ServerConfig::load(&args) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::from(STARTUP_FAILURE);
        }
    };
    let _log_guard = match init_tracing(config.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    match run(config).await {
        Ok(reason) => {
            tracing::info!(?reason, code = reason.code(), "Server exits.");
            ExitCode::from(reason.code())
        }
        Err(error) => {
            tracing::error!(%error, "Startup failed.");
            ExitCode::from(STARTUP_FAILURE)
        }
    }
}

/// Console output as always, plus `<log_dir>/<process id>.log` if a log directory is set.
fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, ServerError> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| ServerError::LogDir {
                path: dir.to_owned(),
                source,
            })?;
            let appender = tracing_appender::rolling::never(dir, format!("{}.log", process_id()));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .with(file_layer)
        .init();
    Ok(guard)
}

/// The id the hosting environment gave this process, or the OS pid.
fn process_id() -> String {
    std::env::var("GAME_PROCESS_ID").unwrap_or_else(|_| std::process::id().to_string())
}

async fn run(config: ServerConfig) -> Result<ExitReason, ServerError> {
    let sink: Arc<dyn ResultSink> = match &config.results_path {
        Some(path) => Arc::new(JsonLinesSink::new(path)),
        None => Arc::new(LogSink),
    };
    let game = GameSession::new(ResultDispatcher::new(sink));
    let authority = Arc::new(LocalAuthority::new(&config.roster, config.default_rating));
    let host = Arc::new(SessionHost::new(game, authority, config.state_file()));

    let listen_addr = config.listen_addr();
    let acceptor = SessionAcceptor::bind(&listen_addr, host.clone()).await?;
    tracing::info!(addr = listen_addr, "Listening for players.");
    host.on_process_ready().await;

    if let Some(addr) = &config.admin_addr {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        tracing::info!(addr, "Admin surface listening.");
        tokio::spawn(admin::serve(listener, host.clone()));
    }
    if config.auto_start {
        host.on_session_start().await;
    }

    let mut shutdown = host.shutdown_signal();
    tokio::select! {
        _ = acceptor.run() => {}
        _ = shutdown.wait_for(Option::is_some) => {}
        _ = tokio::signal::ctrl_c() => host.on_terminate(),
    }
    host.game().flush_results().await;
    Ok(host.exit_reason())
}

//! TV macro remote.
//!
//! # Usage
//!
//! ```bash
//! # Wake the TV and exit
//! tv-macro-remote
//!
//! # Run one macro and exit
//! tv-macro-remote --action channel_1
//!
//! # Serve the Telegram bot and the web panel together
//! tv-macro-remote --bot --web
//! ```

mod config;
mod device;
mod engine;
mod error;
mod frontend;

#[cfg(test)]
mod test_utils;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use config::{AppConfig, DEFAULT_CONFIG_PATH, FileCredentialStore};
use device::{DeviceSession, LgClientConfig, LgWebOsClient, MagicPacketWaker};
use engine::{MacroCatalog, MacroEngine, MacroRunner};
use error::ConfigError;
use frontend::{bot, cli, web};

/// Wake an LG webOS TV and run remote-control macros
#[derive(Parser, Debug)]
#[command(name = "tv-macro-remote")]
#[command(about = "Wake the TV and run predefined remote-control macros")]
#[command(version)]
struct Args {
    /// Run one macro (or wake / turn_off) and exit
    #[arg(short, long, conflicts_with_all = ["bot", "web"])]
    action: Option<String>,

    /// Serve the Telegram bot
    #[arg(long)]
    bot: bool,

    /// Serve the web button panel
    #[arg(long)]
    web: bool,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let source = AppConfig::resolve_path(&args.config);
    let loaded = AppConfig::load(&source).and_then(|config| {
        let engine = build_engine(&config, &args.config, &source)?;
        Ok((config, engine))
    });
    let (config, engine) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(cli::EXIT_USAGE);
        }
    };

    if args.bot || args.web {
        return serve(&args, &config, engine).await;
    }

    let action = args.action.clone();
    match tokio::task::spawn_blocking(move || cli::run_once(engine.as_ref(), action.as_deref()))
        .await
    {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("Command failed: {}", e);
            ExitCode::from(cli::EXIT_FAILED)
        }
    }
}

fn build_engine(
    config: &AppConfig,
    target: &Path,
    source: &Path,
) -> Result<Arc<MacroEngine>, ConfigError> {
    let catalog = MacroCatalog::from_config(&config.macros)?;
    if catalog.is_empty() {
        warn!("No macros configured");
    }
    let waker = MagicPacketWaker::new(config.device.mac_address()?, &config.wake)?;

    let store = FileCredentialStore::new(target, source, &config.device.client_key);
    info!("Pairing key is stored in {}", store.path().display());
    let client = LgWebOsClient::new(LgClientConfig::from(&config.device));
    let session = DeviceSession::new(Box::new(client), Arc::new(store));

    Ok(Arc::new(MacroEngine::new(
        Arc::new(catalog),
        session,
        Arc::new(waker),
        config.device.wake_grace()?,
        config.engine.when_busy,
    )))
}

/// Run the requested long-lived front-ends against one shared engine. Both
/// are validated before either starts.
async fn serve(args: &Args, config: &AppConfig, engine: Arc<MacroEngine>) -> ExitCode {
    let runner: Arc<dyn MacroRunner> = engine;

    let bot = match (args.bot, &config.telegram) {
        (false, _) => None,
        (true, None) => {
            error!("--bot requires a [telegram] section in the configuration");
            return ExitCode::from(cli::EXIT_USAGE);
        }
        (true, Some(telegram)) => match telegram.token() {
            Ok(token) => Some((
                Arc::new(bot::BotFrontend::from_config(telegram, runner.clone())),
                token.to_string(),
            )),
            Err(e) => {
                error!("{}", e);
                return ExitCode::from(cli::EXIT_USAGE);
            }
        },
    };

    let panel = if args.web {
        match web::WebState::new(&config.web, runner.clone()) {
            Ok(state) => Some(state),
            Err(e) => {
                error!("{}", e);
                return ExitCode::from(cli::EXIT_USAGE);
            }
        }
    } else {
        None
    };

    let web_server =
        panel.map(|state| web::start(state, config.web.host.clone(), config.web.port));
    let bot_task = bot.map(|(frontend, token)| {
        tokio::spawn(async move { bot::telegram::run(frontend, &token).await })
    });

    // A web server that cannot bind takes the whole process down
    if let Some(server) = web_server {
        match server.await {
            Ok(Ok(())) => info!("Web server stopped"),
            Ok(Err(e)) => {
                error!("Web server failed: {}", e);
                return ExitCode::from(cli::EXIT_FAILED);
            }
            Err(e) => {
                error!("Web server thread failed: {}", e);
                return ExitCode::from(cli::EXIT_FAILED);
            }
        }
    }
    if let Some(task) = bot_task
        && let Err(e) = task.await
    {
        error!("Telegram bot task failed: {}", e);
        return ExitCode::from(cli::EXIT_FAILED);
    }
    ExitCode::SUCCESS
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bot_core::{
    load_bot_config, notifier_from_config, BotConfig, HttpGateway, JobPlanStore, PollScheduler,
    Session, StartupError,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Keeps villages building and reports incoming attacks", long_about = None)]
struct Cli {
    /// Path to the JSON config file (defaults to $VILLAGE_BOT_CONFIG_PATH, then village_bot.json).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the build plan path from the config.
    #[arg(long)]
    plan: Option<PathBuf>,
    /// Run a single cycle, then log out.
    #[arg(long, conflicts_with = "max_cycles")]
    once: bool,
    /// Stop after this many cycles.
    #[arg(long)]
    max_cycles: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The config decides the default log level, so read it before the
    // subscriber exists and report its failure on stderr.
    let (mut config, config_path) = match load_bot_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("village-bot: {}", StartupError::from(err));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);
    info!(
        target: "village_bot::config",
        path = %config_path.display(),
        poll_interval_seconds = config.poll_interval_seconds,
        debug_mode = config.debug_mode,
        "bot_config.loaded=file"
    );
    if config.auto_evade_attack {
        info!(
            target: "village_bot::config",
            "auto_evade_attack is reserved and currently has no effect"
        );
    }

    if let Some(plan) = cli.plan {
        config.job_plan_path = plan;
    }
    if cli.once {
        config.max_cycles = Some(1);
    } else if cli.max_cycles.is_some() {
        config.max_cycles = cli.max_cycles;
    }

    // `_signal` keeps the channel connected even if no handler could be installed.
    let (_signal, shutdown) = install_shutdown_handler();
    match run(&config, shutdown) {
        Ok(cycles) => {
            info!(target: "village_bot::main", cycles, "village-bot exited cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(target: "village_bot::main", error = %err, "startup.failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &BotConfig) {
    let default_level = if config.debug_mode { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn install_shutdown_handler() -> (Sender<()>, Receiver<()>) {
    let (sender, receiver) = bounded::<()>(1);
    let handler_sender = sender.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = handler_sender.try_send(());
    }) {
        warn!(
            target: "village_bot::main",
            error = %err,
            "interrupt handler unavailable; stop with --max-cycles or kill"
        );
    }
    (sender, receiver)
}

fn run(config: &BotConfig, shutdown: Receiver<()>) -> Result<u64, StartupError> {
    info!(
        target: "village_bot::main",
        server = %config.server_url,
        plan = %config.job_plan_path.display(),
        "village-bot starting"
    );
    let notifier = notifier_from_config(config);
    let gateway = HttpGateway::authenticate(config)?;
    let session = Session::new(gateway);
    let plan = JobPlanStore::new(config.job_plan_path.clone());
    let scheduler = PollScheduler::start(config, session, plan, notifier, shutdown)?;
    Ok(scheduler.run())
}

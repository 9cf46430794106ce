//! VIGIL - Live dashboard for a multi-agent runtime
//!
//! Watches a (simulated) multi-agent runtime and lets the operator steer it.
//!
//! ## Usage
//!
//! ```bash
//! # Start the dashboard
//! vigil
//!
//! # Modal command shell instead of the dashboard
//! vigil --shell
//!
//! # With verbose logging and six demo agents
//! vigil -v --agents 6
//!
//! # With a custom config file and log directory
//! vigil --config ./vigil.yaml --log-dir /path/to/logs/
//! ```

use std::io::Write;
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vigil_core::{
    DemoRuntime, EventBus, InMemoryActionService, LogGuard, RequestResponseRegistry, Result,
    VigilConfig, VigilError, init_logging,
};
use vigil_tui::ansi;
use vigil_tui::{
    CommandDispatcher, CrosstermScreen, DashboardScheduler, KeyReader, ModalCommandInterpreter,
    PresenterConfig, ReplShell, SchedulerConfig, ViewStatePresenter,
};

/// VIGIL multi-agent dashboard
///
/// A terminal interface for observing agents, tickets and escalations
/// and answering questions the agents raise.
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.vigil/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.vigil/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the modal command shell instead of the dashboard
    #[arg(long)]
    shell: bool,

    /// Number of simulated agents
    #[arg(long)]
    agents: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match VigilConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report(&e);
            return ExitCode::from(2);
        }
    };
    if let Some(agents) = cli.agents {
        config.demo.agents = agents;
    }

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(1);
        }
    };

    install_panic_hook();

    info!(shell = cli.shell, agents = config.demo.agents, "Starting VIGIL");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            report(&VigilError::internal(format!("failed to start async runtime: {e}")));
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli.shell, config)) {
        Ok(()) => {
            info!("VIGIL exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "VIGIL exited with an error");
            report(&e);
            ExitCode::from(1)
        }
    }
}

fn report(e: &VigilError) {
    eprintln!("Error: {e}");
    if let Some(guidance) = e.guidance() {
        eprintln!("  {guidance}");
    }
}

/// Install a panic hook that restores the terminal before printing the panic message.
fn install_panic_hook() {
    let original_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(ansi::restore_sequence().as_bytes());
        let _ = stdout.flush();

        original_hook(panic_info);
    }));
}

/// Set up logging based on CLI arguments.
///
/// The console layer stays off: the dashboard and shell own the terminal.
fn setup_logging(cli: &Cli) -> Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0, false)
}

/// Wire the runtime and run the dashboard or shell until the operator leaves.
async fn run(shell: bool, config: VigilConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let bus = Arc::new(EventBus::new(config.event_buffer));
    let registry = RequestResponseRegistry::new();
    let actions = Arc::new(InMemoryActionService::new(bus.clone()));

    let presenter = Arc::new(
        ViewStatePresenter::new(bus.clone(), PresenterConfig::from(&config))
            .with_registry(registry.clone()),
    );
    presenter.start();
    let dispatcher = CommandDispatcher::new(actions.clone(), registry.clone(), presenter.clone());

    let demo = Arc::new(DemoRuntime::new(
        bus.clone(),
        registry.clone(),
        actions,
        &config.demo,
        config.escalation_timeout(),
    ));
    let demo_task = tokio::spawn(demo.run(cancel.child_token()));

    let (keys, rx) = KeyReader::spawn(config.input_poll(), &cancel)?;
    let mut screen = CrosstermScreen::new();

    let outcome = if shell {
        let mut repl = ReplShell::new(
            ModalCommandInterpreter::new(config.double_escape()),
            dispatcher,
            bus.clone(),
            cancel.clone(),
        );
        let outcome = match screen.enter_raw() {
            Ok(()) => repl.run(&mut screen, rx).await.map(|exit| {
                info!(?exit, "shell closed");
            }),
            Err(e) => Err(e),
        };
        presenter.stop().await;
        outcome
    } else {
        let scheduler = DashboardScheduler::new(
            presenter.clone(),
            dispatcher,
            SchedulerConfig::from(&config),
            cancel.clone(),
        );
        scheduler.run(&mut screen, rx).await
    };

    cancel.cancel();
    if let Err(e) = tokio::task::spawn_blocking(move || keys.stop()).await {
        warn!(error = %e, "key reader did not stop cleanly");
    }
    if let Err(e) = demo_task.await {
        warn!(error = %e, "demo runtime ended abnormally");
    }
    outcome
}

//! Harbor CLI

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use harbor_config::{
    apply_overrides, bootstrap, load_application, load_config, validate_config, Config,
    ServerOverrides,
};
use harbor_core::{ServerMode, SocketType};
use harbor_runtime::{Server, SignalHandler, WorkerPool};
use harbor_supervisor::Supervisor;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "harbor")]
#[command(about = "Harbor persistent HTTP worker", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "harbor.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the worker (blocks until it stops)
    Start(ServerArgs),

    /// Stop the running worker
    Stop,

    /// Stop the running worker, wait for it to exit, start again
    Restart(ServerArgs),

    /// Reload the worker (same as restart)
    Reload(ServerArgs),

    /// Reload task workers of the running worker
    ReloadTask,

    /// Validate configuration files
    Validate,

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },

    /// Show version information
    Version,
}

/// Per-invocation server overrides
#[derive(Args, Default)]
struct ServerArgs {
    /// Bind host (socket path for unix sockets)
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Dispatch mode (multi-process|process, event-loop|base)
    #[arg(short, long)]
    mode: Option<ServerMode>,

    /// Listener transport (tcp, unix)
    #[arg(long)]
    socket_type: Option<SocketType>,
}

impl From<ServerArgs> for ServerOverrides {
    fn from(args: ServerArgs) -> Self {
        ServerOverrides {
            host: args.host,
            port: args.port,
            mode: args.mode,
            socket_type: args.socket_type,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Start(args) => {
            let config = load(&cli.config, args)?;
            let supervisor = Supervisor::new(&config.server);
            supervisor.prepare_directories()?;
            init_tracing(&cli.log_level, Some(&config.server.log_file))?;

            supervisor.start(|| launch(config))?;
            Ok(())
        }

        Commands::Stop => {
            init_tracing(&cli.log_level, None)?;
            let config = load(&cli.config, ServerArgs::default())?;

            Supervisor::new(&config.server).stop()?;
            println!(
                "server is stopped, stop listening {}",
                config.server.listen_label()
            );
            Ok(())
        }

        Commands::Restart(args) | Commands::Reload(args) => {
            let config = load(&cli.config, args)?;
            let supervisor = Supervisor::new(&config.server);
            init_tracing(&cli.log_level, None)?;

            supervisor.stop_and_wait()?;
            println!("Server is stopped success");

            supervisor.start(|| launch(config))?;
            Ok(())
        }

        Commands::ReloadTask => {
            init_tracing(&cli.log_level, None)?;
            let config = load(&cli.config, ServerArgs::default())?;

            let pid = Supervisor::new(&config.server).reload_tasks()?;
            println!("task workers reloading (pid {pid})");
            Ok(())
        }

        Commands::Validate => {
            init_tracing(&cli.log_level, None)?;
            tracing::info!("Validating configuration: {}", cli.config.display());

            let config = load(&cli.config, ServerArgs::default())?;
            let app = load_application(&config.application)?;

            println!("Configuration is valid");
            println!("  Listen: {}", config.server.listen_label());
            println!("  Mode: {}", config.server.mode);
            println!("  Components: {}", app.components.len());
            println!("  Connections: {}", app.connections.len());
            Ok(())
        }

        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "harbor", &mut std::io::stdout());
            Ok(())
        }

        Commands::Version => {
            println!("Harbor");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

/// Load the config file and apply command-line overrides
fn load(path: &Path, args: ServerArgs) -> Result<Config> {
    let config = load_config(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let config = apply_overrides(config, args.into());
    validate_config(&config)?;
    Ok(config)
}

/// Bootstrap, build the worker runtime and serve until shutdown
fn launch(config: Config) -> harbor_core::Result<()> {
    let app = load_application(&config.application)?;
    let boot = Arc::new(bootstrap(&config.application, config.server, app)?);

    let pool = WorkerPool::new(boot.server.mode, boot.server.worker_num);
    tracing::info!(
        mode = %pool.mode(),
        workers = pool.worker_count(),
        "Starting Harbor worker"
    );
    let runtime = pool.runtime()?;

    runtime.block_on(async move {
        let server = Server::builder(Arc::clone(&boot)).build()?;
        let listener = server.bind().await?;

        let mut handler = SignalHandler::new(server.shutdown_signal());
        if let Some(reload) = server.reload_handle() {
            handler = handler.with_reload(reload);
        }
        // handlers must be registered before serve() publishes the PID
        let signals = handler.install()?;
        tokio::spawn(async move {
            if let Err(e) = signals.run().await {
                tracing::error!(error = %e, "Signal handler failed");
            }
        });

        println!("server is running, listening {}", boot.server.listen_label());
        server.serve(listener).await
    })
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into()))
        .init();

    Ok(())
}

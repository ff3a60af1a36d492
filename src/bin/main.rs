//! launcher CLI

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use launcher::{BootstrapOutcome, Launcher, LauncherConfig, RuntimeOptions, StartOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "launcher")]
#[command(about = "Bootstrap and run an application container from layered templates")]
#[command(version)]
struct Cli {
    /// Directory holding containers/ and templates/
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Skip the engine reachability check
    #[arg(long, global = true)]
    skip_prereqs: bool,

    /// Extra arguments for the engine's run command
    #[arg(long, global = true, allow_hyphen_values = true)]
    docker_args: Option<String>,

    /// Do not assign a derived mac address
    #[arg(long, global = true)]
    skip_mac_address: bool,

    /// Image to run instead of the bootstrapped one
    #[arg(long, global = true)]
    run_image: Option<String>,

    /// Keep failed bootstrap containers as images and log verbosely
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a container, creating it if needed
    Start { config: String },
    /// Stop a running container
    Stop { config: String },
    /// Stop, then start
    Restart { config: String },
    /// Stop and remove a container
    Destroy { config: String },
    /// Open a shell in a running container
    Enter { config: String },
    /// Show container logs
    Logs { config: String },
    /// Provision the runtime image
    Bootstrap { config: String },
    /// Run a command in a throwaway container
    Run { config: String, command: String },
    /// Destroy, bootstrap and start
    Rebuild { config: String },
    /// Remove stopped containers and dangling images
    Cleanup,
    /// Print the command start would run
    StartCmd { config: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli) {
        Ok(code) => exit_code(code),
        Err(e) => {
            tracing::error!("{}", e);
            exit_code(e.exit_code())
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn run(cli: Cli) -> launcher::Result<i32> {
    let mut config = LauncherConfig::from_env(&cli.root);
    config.debug = cli.debug;

    let options = RuntimeOptions {
        docker_args: cli.docker_args,
        run_image: cli.run_image,
        skip_mac_address: cli.skip_mac_address,
    };
    let launcher = Launcher::new(config, options)?;

    if !cli.skip_prereqs {
        launcher.check_engine()?;
    }

    match cli.command {
        Commands::Start { config } => {
            report_start(&config, launcher.start(&config)?);
            Ok(0)
        }
        Commands::Stop { config } => {
            launcher.stop(&config)?;
            println!("Stopped {}", config);
            Ok(0)
        }
        Commands::Restart { config } => {
            report_start(&config, launcher.restart(&config)?);
            Ok(0)
        }
        Commands::Destroy { config } => {
            launcher.destroy(&config)?;
            println!("Destroyed {}", config);
            Ok(0)
        }
        Commands::Enter { config } => launcher.enter(&config),
        Commands::Logs { config } => launcher.logs(&config),
        Commands::Bootstrap { config } => match launcher.bootstrap(&config)? {
            BootstrapOutcome::Success { image } => {
                println!("Bootstrapped {} into {}", config, image);
                Ok(0)
            }
            BootstrapOutcome::Failure { debug_image: Some(image), exit_code } => {
                println!("Failed bootstrap kept as {} for inspection", image);
                Err(launcher::Error::BootstrapFailed {
                    config,
                    exit_code,
                    debug_image: Some(image),
                })
            }
            outcome => outcome.into_result(&config).map(|_| 0),
        },
        Commands::Run { config, command } => launcher.run(&config, &command),
        Commands::Rebuild { config } => {
            report_start(&config, launcher.rebuild(&config)?);
            Ok(0)
        }
        Commands::Cleanup => {
            launcher.cleanup()?;
            Ok(0)
        }
        Commands::StartCmd { config } => {
            let line = launcher.start_command(&config)?;
            println!("{}", line.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" "));
            Ok(0)
        }
    }
}

fn report_start(config: &str, outcome: StartOutcome) {
    match outcome {
        StartOutcome::AlreadyRunning => println!("{} is already running", config),
        StartOutcome::Resumed => println!("Started existing container {}", config),
        StartOutcome::Created { image } => println!("Started {} from {}", config, image),
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

//! allpath-rpc - command-line caller for the allpath runner daemon.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use allpath_rpc::client::{RunOutput, RpcClient};
use allpath_rpc::config::{LoggingConfig, ServerConfig, Settings};
use allpath_rpc::functions::FunctionRegistry;
use allpath_rpc::socket::SocketListener;
use allpath_rpc::{Provider, RpcError};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

/// What the user asked for.
#[derive(Debug, PartialEq)]
enum Command {
    Call { function: String, args: Vec<String> },
    Run(PipelineArgs),
    Byakugan(PipelineArgs),
    SkillsCount,
    CheckSkill { content: String },
    Version,
    Serve,
}

#[derive(Debug, PartialEq)]
struct PipelineArgs {
    task: String,
    provider: Provider,
    model: Option<String>,
    verbose: bool,
}

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct Cli {
    config_path: Option<String>,
    socket_path: Option<String>,
    timeout_secs: Option<u64>,
    command: Option<Command>,
}

fn main() -> ExitCode {
    // Parse command line arguments (simple std::env approach)
    let args: Vec<String> = env::args().skip(1).collect();

    if args.first().map_or(true, |a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if wants_version(&args) {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!("Run '{} --help' for usage.", NAME);
            return ExitCode::from(2);
        }
    };

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings.logging) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(command) = cli.command else {
        print_help();
        return ExitCode::FAILURE;
    };

    // The credential must be present before any connection is attempted.
    let api_key = match &command {
        Command::Run(p) | Command::Byakugan(p) => match p.provider.api_key_from_env() {
            Some(key) => Some(key),
            None => {
                eprintln!(
                    "Error: API key required for provider '{}'. Set the {} environment variable.",
                    p.provider,
                    p.provider.env_var()
                );
                return ExitCode::FAILURE;
            }
        },
        _ => None,
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error creating Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(command, api_key, settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run one command and print its result.
async fn execute(
    command: Command,
    api_key: Option<String>,
    settings: Settings,
) -> Result<(), RpcError> {
    if command == Command::Serve {
        return serve(settings.server).await;
    }

    let client = RpcClient::new(settings.client)?;
    let api_key = api_key.unwrap_or_default();

    match command {
        Command::Call { function, args } => {
            let map = client.call(&function, args).await?;
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        Command::Run(p) => {
            let output = client
                .run(&p.task, &api_key, p.provider, p.model.as_deref(), p.verbose)
                .await?;
            print_run_output(&output);
        }
        Command::Byakugan(p) => {
            let output = client
                .byakugan(&p.task, &api_key, p.provider, p.model.as_deref())
                .await?;
            println!("=== BYAKUGAN ===");
            println!("{}", output.byakugan.unwrap_or_default());
            if let Some(time) = output.time {
                println!("\nTime: {:.1}s", time);
            }
        }
        Command::SkillsCount => {
            println!("{}", client.skills_count().await?);
        }
        Command::CheckSkill { content } => {
            let check = client.check_skill(&content).await?;
            if check.safe {
                println!("safe");
            } else {
                println!("unsafe");
                for violation in &check.violations {
                    println!("  - {}", violation);
                }
            }
        }
        Command::Version => {
            let info = client.version().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Serve => {}
    }

    Ok(())
}

fn print_run_output(output: &RunOutput) {
    println!("=== BYAKUGAN ===");
    println!("{}", output.byakugan.as_deref().unwrap_or_default());
    if let Some(jougan) = &output.jougan {
        println!("\n=== JOUGAN ===");
        println!("{}", jougan);
    }
    println!("\n=== CODE ===");
    println!("{}", output.execution.as_deref().unwrap_or_default());
    println!("\nTime: {:.1}s", output.total_time.unwrap_or(0.0));
    println!("Skills: {:?}", output.skills_used);
}

/// Run the reference server until SIGINT/SIGTERM.
async fn serve(config: ServerConfig) -> Result<(), RpcError> {
    info!("Starting {} v{} reference server", NAME, VERSION);

    let registry = FunctionRegistry::with_builtins(config.package.clone());
    let listener = SocketListener::bind(config, registry).await?;

    let shutdown = Arc::new(Notify::new());

    tokio::select! {
        result = listener.run(Arc::clone(&shutdown)) => {
            if let Err(e) = result {
                error!(error = %e, "Socket listener failed");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown...");
            shutdown.notify_waiters();

            let drain_timeout = Duration::from_secs(30);
            match tokio::time::timeout(drain_timeout, listener.wait_for_drain()).await {
                Ok(()) => info!("Graceful shutdown complete"),
                Err(_) => warn!(
                    "Shutdown timeout after {}s, some connections may be terminated",
                    drain_timeout.as_secs()
                ),
            }
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Call functions on the allpath runner daemon over its Unix socket.

USAGE:
    {} [OPTIONS] <COMMAND> [ARGS...]

COMMANDS:
    call <function> [args...]          Call any function, print the result as JSON
    run <task> [provider] [model] [--verbose]
                                       Full generation pipeline; --verbose
                                       asks the daemon to trace each step
    byakugan <task> [provider] [model] Structural analysis only
    skills-count                       Number of indexed skills
    check-skill <content>              Security check for a skill document
    version                            Daemon version
    serve                              Run the reference server (ping, version)

OPTIONS:
    -c, --config <PATH>     Path to a TOML configuration file
    -s, --socket <PATH>     Socket path [default: /tmp/allpath_runner.sock]
    -t, --timeout <SECS>    Whole-call timeout [default: 120]
    -h, --help              Print help information
    -V, --version           Print version information

ENVIRONMENT:
    GROQ_API_KEY, OPENAI_API_KEY, ...  Credential for the chosen provider
    RUST_LOG                           Log filter, overrides the config level
"#,
        NAME, VERSION, NAME
    );
}

/// Whether `-V`/`--version` appears among the options before the command.
fn wants_version(args: &[String]) -> bool {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-V" | "--version" => return true,
            "-c" | "--config" | "-s" | "--socket" | "-t" | "--timeout" => {
                iter.next();
            }
            flag if flag.starts_with('-') => {}
            _ => return false,
        }
    }
    false
}

/// Parse everything after the program name.
///
/// Options must come before the command; everything after the command is
/// passed through untouched.
fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut cli = Cli::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if let Some((flag, value)) = arg.split_once('=').filter(|(f, _)| f.starts_with("--")) {
            apply_option(&mut cli, flag, value)?;
            continue;
        }

        match arg.as_str() {
            "-c" | "--config" | "-s" | "--socket" | "-t" | "--timeout" => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("Option '{}' requires a value", arg))?;
                apply_option(&mut cli, arg, value)?;
            }
            flag if flag.starts_with('-') => return Err(format!("Unknown option '{}'", flag)),
            name => {
                let rest: Vec<String> = iter.by_ref().cloned().collect();
                cli.command = Some(parse_command(name, rest)?);
                break;
            }
        }
    }

    Ok(cli)
}

fn apply_option(cli: &mut Cli, flag: &str, value: &str) -> Result<(), String> {
    match flag {
        "-c" | "--config" => cli.config_path = Some(value.to_string()),
        "-s" | "--socket" => cli.socket_path = Some(value.to_string()),
        "-t" | "--timeout" => {
            let secs = value
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| format!("Invalid timeout '{}': expected whole seconds > 0", value))?;
            cli.timeout_secs = Some(secs);
        }
        other => return Err(format!("Unknown option '{}'", other)),
    }
    Ok(())
}

fn parse_command(name: &str, mut rest: Vec<String>) -> Result<Command, String> {
    let command = match name {
        "call" => {
            if rest.is_empty() {
                return Err("'call' requires a function name".to_string());
            }
            let function = rest.remove(0);
            Command::Call { function, args: rest }
        }
        "run" | "byakugan" => {
            let before = rest.len();
            if name == "run" {
                rest.retain(|a| a != "--verbose");
            }
            let verbose = rest.len() < before;
            if rest.is_empty() || rest.len() > 3 {
                return Err(format!("'{}' expects <task> [provider] [model]", name));
            }
            let mut rest = rest.into_iter();
            let task = rest.next().unwrap_or_default();
            let provider = match rest.next() {
                Some(p) => p.parse::<Provider>().map_err(|e| e.to_string())?,
                None => Provider::default(),
            };
            let pipeline = PipelineArgs {
                task,
                provider,
                model: rest.next(),
                verbose,
            };
            if name == "run" {
                Command::Run(pipeline)
            } else {
                Command::Byakugan(pipeline)
            }
        }
        "skills-count" | "skills_count" => expect_no_args(name, &rest, Command::SkillsCount)?,
        "check-skill" | "check_skill" => {
            if rest.len() != 1 {
                return Err(format!("'{}' expects exactly one <content> argument", name));
            }
            Command::CheckSkill {
                content: rest.remove(0),
            }
        }
        "version" => expect_no_args(name, &rest, Command::Version)?,
        "serve" => expect_no_args(name, &rest, Command::Serve)?,
        other => return Err(format!("Unknown command '{}'", other)),
    };
    Ok(command)
}

fn expect_no_args(name: &str, rest: &[String], command: Command) -> Result<Command, String> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(format!("'{}' takes no arguments", name))
    }
}

/// Load the config file (if any) and apply command-line overrides.
fn load_settings(cli: &Cli) -> Result<Settings, RpcError> {
    let mut settings = match &cli.config_path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    if let Some(socket) = &cli.socket_path {
        settings.client.endpoint_path = socket.into();
        settings.server.socket_path = socket.into();
    }
    if let Some(secs) = cli.timeout_secs {
        settings.client = settings
            .client
            .with_call_timeout(Duration::from_secs(secs));
    }

    settings.validate()?;
    Ok(settings)
}

/// Initialize logging to stderr, keeping stdout for results.
fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;

    match logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

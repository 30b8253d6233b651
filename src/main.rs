//! Vantage CLI entrypoint.
//!
//! This is the main entrypoint for the vantage command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vantage_reconcile::cli::{Cli, Commands, LogFormat, OutputFormatter, StateCommands};
use vantage_reconcile::config::{ConfigParser, ConfigValidator, VantageConfig, find_config_file};
use vantage_reconcile::error::{LifecycleError, Result};
use vantage_reconcile::executor::{CancelSignal, cancel_pair};
use vantage_reconcile::session::{Session, find_record, open_store};
use vantage_reconcile::state::{STATE_DIR, StateStore};

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point. Returns whether the command converged.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| true),
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(config, detailed, &formatter).await,
        Commands::Apply { yes } => cmd_apply(config, yes, &formatter).await,
        Commands::Refresh => cmd_refresh(config, &formatter).await,
        Commands::Repair { target } => cmd_repair(config, &target, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config, yes, &formatter).await,
        Commands::State { command } => cmd_state(config, command, &formatter).await.map(|()| true),
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new Vantage project in: {}", path.display());

    let config_path = path.join("vantage.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/vantage.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    // Write/update .gitignore
    let state_entry = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_entry.as_str()]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# Vantage")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set VANTAGE_PASSWORD");
    eprintln!("  2. Edit vantage.yaml with your connection and compute profiles");
    eprintln!("  3. Run 'vantage validate' to check your configuration");
    eprintln!("  4. Run 'vantage plan' to see what will change");
    eprintln!("  5. Run 'vantage apply' to converge");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&config)?;
    emit(&formatter.format_validation(&result, show_warnings));

    eprintln!("\nConfiguration summary:");
    eprintln!("  System: {}", config.connection.system);
    eprintln!("  State backend: {}", config.state.backend);
    eprintln!("  Resources: {}", config.resources.len());

    Ok(result.is_valid())
}

/// Show the reconciliation plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let session = connect(config_path).await?;
    let plan = session.plan().await?;
    emit(&formatter.format_plan(&plan, detailed));
    Ok(true)
}

/// Apply the reconciliation plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let session = connect(config_path).await?;
    let plan = session.plan().await?;

    if plan.is_empty() {
        eprintln!("No changes to apply.");
        return Ok(true);
    }

    emit(&formatter.format_plan(&plan, false));

    if !auto_approve && !confirm("Do you want to apply this plan?")? {
        eprintln!("Apply cancelled.");
        return Ok(true);
    }

    let report = session.apply(&plan, &interruptible()).await;
    emit(&formatter.format_apply(&report));
    Ok(report.success)
}

/// Read back every record.
async fn cmd_refresh(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<bool> {
    let session = connect(config_path).await?;
    let report = session.refresh(&interruptible()).await?;
    emit(&formatter.format_refresh(&report));
    Ok(report.errors.is_empty())
}

/// Repair one record.
async fn cmd_repair(
    config_path: Option<&PathBuf>,
    target: &str,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let session = connect(config_path).await?;
    let result = session.repair(target, &interruptible()).await?;
    emit(&formatter.format_repair(target, &result));
    Ok(!result.state.needs_repair())
}

/// Drop every managed object.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let session = connect(config_path).await?;
    let plan = session.plan_destroy().await?;

    if plan.is_empty() {
        eprintln!("Nothing to destroy.");
        return Ok(true);
    }

    emit(&formatter.format_plan(&plan, false));

    if !auto_approve {
        eprintln!(
            "\nWARNING: This will drop {} object(s) on system {}.",
            plan.actionable().len(),
            session.config().connection.system
        );
        if !confirm("Type 'yes' to confirm")? {
            eprintln!("Destroy cancelled.");
            return Ok(true);
        }
    }

    let report = session.apply(&plan, &interruptible()).await;
    emit(&formatter.format_apply(&report));
    Ok(report.success)
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, store) = load_config_and_state(config_path).await?;
    let store = store.as_ref();

    match command {
        StateCommands::List => {
            emit(&formatter.format_records(&store.list().await?));
        }
        StateCommands::Show { target } => {
            let record = required_record(store, &target).await?;
            let lock = store.get_lock_info(&record.identity).await?;
            emit(&formatter.format_record(&record, lock.as_ref()));
        }
        StateCommands::Rm { target, yes } => {
            let record = required_record(store, &target).await?;
            eprintln!(
                "This forgets {} without dropping it; the remote object stays in place.",
                record.identity
            );
            if yes || confirm("Remove the record?")? {
                store.delete(&record.identity).await?;
                emit(&formatter.success(&format!("Removed record {}", record.identity)));
            } else {
                eprintln!("Removal cancelled.");
            }
        }
        StateCommands::Unlock { target, lock_id, force } => {
            let record = required_record(store, &target).await?;
            if force {
                store.force_unlock(&record.identity).await?;
                emit(&formatter.success(&format!("{} forcefully unlocked", record.identity)));
            } else if let Some(id) = lock_id {
                store.release_lock(&record.identity, &id).await?;
                emit(&formatter.success(&format!("{} unlocked", record.identity)));
            } else {
                emit(&formatter.warning("Please provide --lock-id or use --force"));
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output to stdout; logs and prompts go to stderr.
fn emit(output: &str) {
    let mut stdout = std::io::stdout().lock();
    if writeln!(stdout, "{}", output.trim_end()).is_err() {
        warn!("stdout closed; output dropped");
    }
}

/// Asks a y/N question on stderr.
fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    let answer = input.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Returns a signal that fires on Ctrl-C.
///
/// Interrupted commands leave their objects tainted rather than guessing.
fn interruptible() -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; in-flight objects will be marked tainted");
            handle.cancel();
        }
    });
    signal
}

/// Finds a record by name or identity, failing when there is none.
async fn required_record(
    store: &dyn StateStore,
    target: &str,
) -> Result<vantage_reconcile::state::StateRecord> {
    find_record(store, target).await?.ok_or_else(|| {
        LifecycleError::UnknownIdentity {
            identity: target.to_string(),
        }
        .into()
    })
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Directory of the configuration file.
fn config_dir(config_file: &Path) -> &Path {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Loads and validates the configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<(VantageConfig, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base_dir = config_dir(&config_file).to_path_buf();
    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    ConfigValidator::new().validate(&config)?;

    Ok((config, base_dir))
}

/// Loads configuration and creates the appropriate state store.
async fn load_config_and_state(
    config_path: Option<&PathBuf>,
) -> Result<(VantageConfig, std::sync::Arc<dyn StateStore>)> {
    let (config, base_dir) = load_config(config_path)?;
    let store = open_store(&config.state, &base_dir).await?;
    Ok((config, store))
}

/// Loads configuration and connects to the Query Service.
async fn connect(config_path: Option<&PathBuf>) -> Result<Session> {
    let (config, base_dir) = load_config(config_path)?;
    let password = ConfigParser::get_password()?;
    Session::connect(config, &base_dir, &password).await
}

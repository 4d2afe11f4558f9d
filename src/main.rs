use anyhow::{Context, Result, bail};
use clap::Parser;
use pstream::app::App;
use pstream::config::Config;
use pstream::error::CoreError;
use pstream::ipc::HeadlessHost;
use pstream::runtime::RealRuntime;
use pstream::update::AutoUpdateOutcome;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// pstream - P-Stream Desktop core
///
/// Checks for and installs app updates, relays requests the way the desktop
/// page does, and manages offline downloads and settings.
///
/// If the GITHUB_TOKEN environment variable is set, it will be used for
/// release API requests.
#[derive(Parser, Debug)]
#[command(author, version = env!("PSTREAM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User data directory (also via PSTREAM_DATA_DIR)
    #[arg(
        long = "data-dir",
        env = "PSTREAM_DATA_DIR",
        value_name = "PATH",
        global = true
    )]
    pub data_dir: Option<PathBuf>,

    /// GitHub API URL (defaults to https://api.github.com)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Check for a newer release and print the report as JSON
    Check,

    /// Download and launch the installer of a newer release
    Update,

    /// Send one request through the relay and print the response as JSON
    Relay(RelayArgs),

    /// Manage offline downloads
    #[command(subcommand)]
    Downloads(DownloadsCommand),

    /// Read or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(clap::Args, Debug)]
pub struct RelayArgs {
    /// Request object, e.g. '{"url": "https://example.com"}'
    #[arg(value_name = "JSON")]
    pub request: String,
}

#[derive(clap::Subcommand, Debug)]
enum DownloadsCommand {
    /// List downloads from the manifest
    List,
    /// Delete a download and its files
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum SettingsCommand {
    /// Print a setting as JSON
    Get {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Store a JSON value (bare words are stored as strings)
    Set {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "JSON")]
        value: String,
    },
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = Arc::new(RealRuntime);

    let config = Config::new(&*runtime, cli.data_dir, cli.api_url)?;
    let app = App::new(runtime, config, Arc::new(HeadlessHost))?;

    match cli.command {
        Commands::Check => print_json(&app.updater.check().await)?,
        Commands::Update => {
            let on_progress = Box::new(|percent: u8| eprint!("\rDownloading update: {}%", percent));
            match app.updater.auto_update(on_progress).await {
                AutoUpdateOutcome::Skipped => {
                    println!("Update checking is not available in development mode")
                }
                AutoUpdateOutcome::UpToDate => println!("Already up to date"),
                AutoUpdateOutcome::NoInstaller => {
                    println!("No installer for this platform in the latest release")
                }
                AutoUpdateOutcome::QuitForInstall => println!("\nInstaller launched"),
                AutoUpdateOutcome::ManualInstall(path) => {
                    println!("\nInstaller opened, finish the update manually: {:?}", path)
                }
                AutoUpdateOutcome::Offline(message) | AutoUpdateOutcome::Failed(message) => {
                    bail!(message)
                }
            }
        }
        Commands::Relay(args) => {
            let request: Value =
                serde_json::from_str(&args.request).context("Relay request is not valid JSON")?;
            let reply = app.page.handle("makeRequest", request).await;
            print_json(&reply)?;
            if reply["success"] != true {
                bail!("Request failed");
            }
        }
        Commands::Downloads(DownloadsCommand::List) => print_json(&app.downloads.list())?,
        Commands::Downloads(DownloadsCommand::Delete { id }) => {
            if !app.downloads.delete(&id) {
                return Err(CoreError::NotFound(format!("No download with id '{}'", id)).into());
            }
            println!("Deleted {}", id);
        }
        Commands::Settings(SettingsCommand::Get { key }) => match app.settings.get(&key) {
            Some(value) => print_json(&value)?,
            None => return Err(CoreError::NotFound(format!("Unknown setting '{}'", key)).into()),
        },
        Commands::Settings(SettingsCommand::Set { key, value }) => {
            app.settings.set(&key, parse_setting_value(&value))?;
        }
    }
    Ok(())
}

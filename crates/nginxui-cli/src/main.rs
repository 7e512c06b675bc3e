//! nginxui: manage the nginx add-on of an ASUSWRT-Merlin router.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;

use nginxui_cli::commands;
use nginxui_cli::config::{resolve_settings_path, Overrides, Settings};
use nginxui_cli::output;
use nginxui_engine::{EngineResponse, LogQuery, SubmitAction};

#[derive(Parser)]
#[command(
    name = "nginxui",
    about = "Manage nginx on an ASUSWRT-Merlin router through its apply endpoint",
    version,
    after_help = "Run 'nginxui <command> --help' for details on each command.\nRun 'nginxui' with no command to enter interactive mode."
)]
struct Cli {
    /// Router web interface URL (e.g. http://192.168.1.1).
    #[arg(long, global = true)]
    router: Option<String>,

    /// Path to settings.json.
    #[arg(long, global = true)]
    settings: Option<String>,

    /// Session token (asus_token cookie) from an existing login.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Router admin user, used to log in when no token is given.
    #[arg(long, global = true)]
    user: Option<String>,

    /// Router admin password.
    #[arg(long, global = true)]
    password: Option<String>,

    /// Seconds the firmware waits before answering (action_wait).
    #[arg(long, global = true)]
    wait: Option<u64>,

    /// Output results as JSON (machine-readable).
    #[arg(long, global = true)]
    json: bool,

    /// Treat replies without recognizable markers as failures.
    #[arg(long, global = true, conflicts_with = "no_strict")]
    strict: bool,

    /// Keep assumed successes even if the settings file enables strict mode.
    #[arg(long, global = true)]
    no_strict: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show nginx state and version
    Status,
    /// Start nginx
    Start,
    /// Stop nginx
    Stop,
    /// Restart nginx
    Restart,
    /// Reload nginx configuration
    Reload,
    /// Run a configuration test (nginx -t)
    Test,
    /// Show the nginx log
    Logs {
        /// Only lines of this level (e.g. error, warn)
        #[arg(long)]
        level: Option<String>,
        /// Maximum number of lines
        #[arg(long)]
        lines: Option<u32>,
    },
    /// Truncate the nginx log
    ClearLog,
    /// Apply a JSON configuration ('-' reads stdin)
    Apply {
        source: String,
    },
    /// Regenerate nginx.conf from the saved settings
    Generate,
    /// Back up the current configuration
    Backup {
        /// Write the backup payload to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Restore a configuration backup ('-' reads stdin)
    Restore {
        source: String,
    },
    /// Check that the router answers
    Ping,
    /// Poll until nginx is running (or stopped)
    Wait {
        /// Wait for nginx to be stopped instead
        #[arg(long)]
        stopped: bool,
        /// Give up after this many seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },
    /// Submit any action by its wire name (e.g. check_status)
    Send {
        #[arg(value_parser = parse_action)]
        action: SubmitAction,
        /// JSON config file to attach ('-' reads stdin)
        #[arg(long)]
        config: Option<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
    /// Launch interactive REPL mode
    Repl,
}

fn parse_action(s: &str) -> Result<SubmitAction, String> {
    s.parse::<SubmitAction>().map_err(|e| e.to_string())
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            router_url: self.router.clone(),
            token: self.token.clone(),
            username: self.user.clone(),
            password: self.password.clone(),
            wait_secs: self.wait,
            strict: match (self.strict, self.no_strict) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "nginxui", &mut std::io::stdout());
        return Ok(());
    }

    let json = cli.json;
    let result = run(cli).await;

    // Consistent exit codes: 0=success, 1=error or failed action
    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({"success": false, "message": format!("{e:#}")})
                );
            } else {
                eprintln!("  Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}

/// Execute the selected command. `Ok(false)` means the router reported failure.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let settings_path = resolve_settings_path(cli.settings.as_deref());
    let mut settings = Settings::load(&settings_path)?;
    settings.apply_env();
    settings.apply_overrides(&cli.overrides());

    let engine = commands::connect(&settings).await?;
    let json = cli.json;

    let resp: EngineResponse = match cli.command.unwrap_or(Commands::Repl) {
        Commands::Status => submit(&engine, SubmitAction::CheckStatus, None).await?,
        Commands::Start => submit(&engine, SubmitAction::StartService, None).await?,
        Commands::Stop => submit(&engine, SubmitAction::StopService, None).await?,
        Commands::Restart => submit(&engine, SubmitAction::RestartService, None).await?,
        Commands::Reload => submit(&engine, SubmitAction::ReloadService, None).await?,
        Commands::Test => submit(&engine, SubmitAction::TestConfig, None).await?,
        Commands::ClearLog => submit(&engine, SubmitAction::ClearLog, None).await?,
        Commands::Generate => submit(&engine, SubmitAction::GenerateConfig, None).await?,
        Commands::Logs { level, lines } => {
            commands::logs(&engine, &LogQuery { level, lines }).await?
        }
        Commands::Apply { source } => {
            let config = commands::read_config(&source)?;
            submit(&engine, SubmitAction::ApplyConfig, Some(&config)).await?
        }
        Commands::Restore { source } => {
            let config = commands::read_config(&source)?;
            submit(&engine, SubmitAction::RestoreConfig, Some(&config)).await?
        }
        Commands::Backup { output } => {
            let resp = submit(&engine, SubmitAction::BackupConfig, None).await?;
            if let (Some(path), true) = (output, resp.success) {
                commands::write_backup(&resp, &path)?;
            }
            resp
        }
        Commands::Send { action, config } => {
            let config = config.as_deref().map(commands::read_config).transpose()?;
            submit(&engine, action, config.as_ref()).await?
        }
        Commands::Wait { stopped, timeout } => {
            commands::wait_for_state(
                &engine,
                !stopped,
                Duration::from_secs(timeout),
                Duration::from_secs(1),
            )
            .await?
        }
        Commands::Ping => {
            let alive = engine.ping().await;
            if json {
                println!("{}", serde_json::json!({ "success": alive }));
            } else {
                println!("{}", if alive { "Router is responding" } else { "No answer" });
            }
            return Ok(alive);
        }
        Commands::Repl => {
            let engine = Arc::new(engine);
            let handle = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || nginxui_cli::repl::run(&engine, handle, json))
                .await??;
            return Ok(true);
        }
        Commands::Completions { .. } => return Ok(true),
    };

    println!("{}", output::render(&resp, json));
    Ok(resp.success)
}

async fn submit(
    engine: &nginxui_engine::Engine,
    action: SubmitAction,
    config: Option<&Value>,
) -> anyhow::Result<EngineResponse> {
    commands::execute(engine, action, config, None).await
}

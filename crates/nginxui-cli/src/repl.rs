//! Interactive REPL for the nginxui client.
//!
//! Launch with `nginxui repl`. Type `/help` for available commands, Tab for
//! completion. Every command is one submission to the router.

use std::path::Path;
use std::time::Duration;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use tokio::runtime::Handle;

use nginxui_engine::{Engine, LogQuery, SubmitAction};

use crate::commands;
use crate::output;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/status", "Show nginx state and version"),
    ("/start", "Start nginx"),
    ("/stop", "Stop nginx"),
    ("/restart", "Restart nginx"),
    ("/reload", "Reload nginx configuration"),
    ("/test", "Run nginx -t on the router"),
    ("/logs", "Show the log: /logs [level] [lines]"),
    ("/clear-log", "Truncate the nginx log"),
    ("/apply", "Apply a JSON config: /apply <file.json>"),
    ("/generate", "Regenerate nginx.conf from saved settings"),
    ("/backup", "Back up the config: /backup [file.json]"),
    ("/restore", "Restore a backup: /restore <file.json>"),
    ("/wait", "Wait for nginx: /wait [running|stopped]"),
    ("/send", "Submit any action: /send <action> [file.json]"),
    ("/ping", "Check the router answers"),
    ("/router", "Show the router this session talks to"),
    ("/json", "Toggle JSON output"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// nginx `error_log` severities offered after `/logs`.
const LOG_LEVELS: &[&str] = &[
    "debug", "info", "notice", "warn", "error", "crit", "alert", "emerg",
];

const WAIT_STATES: &[&str] = &["running", "stopped"];

/// One parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Submit(SubmitAction),
    Logs(LogQuery),
    Apply(String),
    Restore(String),
    Backup(Option<String>),
    Wait(bool),
    Send(SubmitAction, Option<String>),
    Ping,
    Router,
    Json,
    Clear,
    Help,
    Exit,
    Empty,
    Usage(&'static str),
    Unknown(String),
}

/// Parse a REPL line; the leading `/` is optional.
pub fn parse_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let input = line.strip_prefix('/').unwrap_or(line);
    if input.is_empty() {
        return ReplCommand::Help;
    }

    let mut parts = input.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim();
    let first_arg = args.split_whitespace().next().map(str::to_string);

    match cmd {
        "exit" | "quit" => ReplCommand::Exit,
        "help" | "h" | "?" => ReplCommand::Help,
        "clear" | "cls" => ReplCommand::Clear,
        "status" => ReplCommand::Submit(SubmitAction::CheckStatus),
        "start" => ReplCommand::Submit(SubmitAction::StartService),
        "stop" => ReplCommand::Submit(SubmitAction::StopService),
        "restart" => ReplCommand::Submit(SubmitAction::RestartService),
        "reload" => ReplCommand::Submit(SubmitAction::ReloadService),
        "test" => ReplCommand::Submit(SubmitAction::TestConfig),
        "clear-log" => ReplCommand::Submit(SubmitAction::ClearLog),
        "generate" => ReplCommand::Submit(SubmitAction::GenerateConfig),
        "logs" => {
            let mut query = LogQuery::default();
            for token in args.split_whitespace() {
                match token.parse::<u32>() {
                    Ok(n) => query.lines = Some(n),
                    Err(_) => query.level = Some(token.to_string()),
                }
            }
            ReplCommand::Logs(query)
        }
        "apply" => match first_arg {
            Some(path) => ReplCommand::Apply(path),
            None => ReplCommand::Usage("/apply <file.json>"),
        },
        "restore" => match first_arg {
            Some(path) => ReplCommand::Restore(path),
            None => ReplCommand::Usage("/restore <file.json>"),
        },
        "backup" => ReplCommand::Backup(first_arg),
        "wait" => match first_arg.as_deref() {
            None | Some("running") => ReplCommand::Wait(true),
            Some("stopped") => ReplCommand::Wait(false),
            Some(_) => ReplCommand::Usage("/wait [running|stopped]"),
        },
        "send" => {
            let mut words = args.split_whitespace();
            match words.next().map(str::parse::<SubmitAction>) {
                Some(Ok(action)) => ReplCommand::Send(action, words.next().map(str::to_string)),
                _ => ReplCommand::Usage("/send <action> [file.json]"),
            }
        }
        "ping" => ReplCommand::Ping,
        "router" => ReplCommand::Router,
        "json" => ReplCommand::Json,
        other => ReplCommand::Unknown(other.to_string()),
    }
}

/// `.json` files in the working directory, sorted.
fn json_files() -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(".")
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|e| e == "json"))
                .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Words that may follow `cmd` as its `index`-th argument.
fn argument_words(cmd: &str, index: usize) -> Vec<String> {
    match (cmd, index) {
        ("/logs", 0) => owned(LOG_LEVELS),
        ("/wait", 0) => owned(WAIT_STATES),
        ("/send", 0) => SubmitAction::ALL.iter().map(|a| a.as_str().to_string()).collect(),
        ("/send", 1) | ("/apply" | "/restore" | "/backup", 0) => json_files(),
        _ => Vec::new(),
    }
}

/// Start offset and candidates for the word under the cursor.
fn candidates(input: &str) -> (usize, Vec<String>) {
    let Some((cmd, args)) = input.split_once(' ') else {
        let matches = COMMANDS
            .iter()
            .map(|(cmd, _)| cmd.to_string())
            .filter(|cmd| cmd.starts_with(input))
            .collect();
        return (0, matches);
    };

    let word_start = input.rfind(' ').map_or(0, |i| i + 1);
    let current = &input[word_start..];
    let index = args.split_whitespace().count() - usize::from(!current.is_empty());
    let matches = argument_words(cmd, index)
        .into_iter()
        .filter(|w| w.starts_with(current))
        .collect();
    (word_start, matches)
}

/// REPL helper for tab completion.
#[derive(Default)]
struct NginxHelper;

impl Completer for NginxHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, words) = candidates(&line[..pos]);
        let pairs = words
            .into_iter()
            .map(|word| {
                let display = COMMANDS
                    .iter()
                    .find(|(cmd, _)| *cmd == word)
                    .map_or_else(|| word.clone(), |(cmd, desc)| format!("{cmd:<16} {desc}"));
                Pair {
                    display,
                    replacement: format!("{word} "),
                }
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for NginxHelper {
    type Hint = String;

    /// Greys out the rest of the only candidate, if there is exactly one.
    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || !line.starts_with('/') || line.ends_with(' ') {
            return None;
        }
        let (start, words) = candidates(line);
        match words.as_slice() {
            [only] if only.len() > line.len() - start => {
                Some(only[line.len() - start..].to_string())
            }
            _ => None,
        }
    }
}

impl Highlighter for NginxHelper {}
impl Validator for NginxHelper {}
impl Helper for NginxHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL.
///
/// Blocks on the terminal, so call it from a blocking thread; `handle` drives
/// the engine's requests.
pub fn run(engine: &Engine, handle: Handle, json: bool) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mnginxui v{}\x1b[0m \x1b[90m{}\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        engine.client().base_url()
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<NginxHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(NginxHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".nginxui_history");
    if hist_path.exists() {
        if let Err(e) = rl.load_history(&hist_path) {
            tracing::debug!("Could not load REPL history from {}: {e}", hist_path.display());
        }
    }

    let mut json = json;
    let prompt = " \x1b[36mnginx>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let result = match parse_line(&line) {
                    ReplCommand::Empty => continue,
                    ReplCommand::Exit => {
                        eprintln!("  \x1b[90mGoodbye!\x1b[0m");
                        break;
                    }
                    ReplCommand::Help => {
                        cmd_help();
                        Ok(())
                    }
                    ReplCommand::Clear => {
                        eprint!("\x1b[2J\x1b[H");
                        Ok(())
                    }
                    ReplCommand::Json => {
                        json = !json;
                        eprintln!("  JSON output {}", if json { "on" } else { "off" });
                        Ok(())
                    }
                    ReplCommand::Router => {
                        eprintln!("  Router: {}", engine.client().base_url());
                        Ok(())
                    }
                    ReplCommand::Usage(usage) => {
                        eprintln!("  Usage: {usage}");
                        Ok(())
                    }
                    ReplCommand::Unknown(cmd) => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                        Ok(())
                    }
                    other => handle.block_on(dispatch(engine, other, json)),
                };
                if let Err(e) = result {
                    eprintln!("  Error: {e:#}");
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90mGoodbye!\x1b[0m");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&hist_path) {
        tracing::debug!("Could not save REPL history to {}: {e}", hist_path.display());
    }

    Ok(())
}

async fn dispatch(engine: &Engine, cmd: ReplCommand, json: bool) -> anyhow::Result<()> {
    let resp = match cmd {
        ReplCommand::Submit(action) => commands::execute(engine, action, None, None).await?,
        ReplCommand::Logs(query) => commands::logs(engine, &query).await?,
        ReplCommand::Apply(path) => {
            let config = commands::read_config(&path)?;
            commands::execute(engine, SubmitAction::ApplyConfig, Some(&config), None).await?
        }
        ReplCommand::Restore(path) => {
            let config = commands::read_config(&path)?;
            commands::execute(engine, SubmitAction::RestoreConfig, Some(&config), None).await?
        }
        ReplCommand::Backup(path) => {
            let resp = commands::execute(engine, SubmitAction::BackupConfig, None, None).await?;
            if let (Some(path), true) = (path, resp.success) {
                commands::write_backup(&resp, Path::new(&path))?;
            }
            resp
        }
        ReplCommand::Wait(running) => {
            commands::wait_for_state(engine, running, WAIT_TIMEOUT, Duration::from_secs(1)).await?
        }
        ReplCommand::Send(action, path) => {
            let config = path.as_deref().map(commands::read_config).transpose()?;
            commands::execute(engine, action, config.as_ref(), None).await?
        }
        ReplCommand::Ping => {
            let alive = engine.ping().await;
            eprintln!("  {}", if alive { "Router is responding" } else { "No answer" });
            return Ok(());
        }
        _ => return Ok(()),
    };

    println!("{}", output::render(&resp, json));
    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completes commands, action names, log levels and .json files.");
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            parse_line("/status"),
            ReplCommand::Submit(SubmitAction::CheckStatus)
        );
        assert_eq!(
            parse_line("restart"),
            ReplCommand::Submit(SubmitAction::RestartService)
        );
        assert_eq!(
            parse_line("/clear-log"),
            ReplCommand::Submit(SubmitAction::ClearLog)
        );
    }

    #[test]
    fn test_parse_logs_arguments() {
        assert_eq!(
            parse_line("/logs error 50"),
            ReplCommand::Logs(LogQuery {
                level: Some("error".into()),
                lines: Some(50),
            })
        );
        assert_eq!(parse_line("/logs"), ReplCommand::Logs(LogQuery::default()));
    }

    #[test]
    fn test_parse_file_commands() {
        assert_eq!(
            parse_line("/apply site.json"),
            ReplCommand::Apply("site.json".into())
        );
        assert!(matches!(parse_line("/restore"), ReplCommand::Usage(_)));
        assert_eq!(parse_line("/backup"), ReplCommand::Backup(None));
    }

    #[test]
    fn test_parse_wait() {
        assert_eq!(parse_line("/wait"), ReplCommand::Wait(true));
        assert_eq!(parse_line("/wait stopped"), ReplCommand::Wait(false));
        assert!(matches!(parse_line("/wait later"), ReplCommand::Usage(_)));
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_line("   "), ReplCommand::Empty);
        assert_eq!(parse_line("/"), ReplCommand::Help);
        assert_eq!(parse_line("/quit"), ReplCommand::Exit);
        assert_eq!(parse_line("/reboot"), ReplCommand::Unknown("reboot".into()));
    }

    #[test]
    fn test_parse_send() {
        assert_eq!(
            parse_line("/send check-status"),
            ReplCommand::Send(SubmitAction::CheckStatus, None)
        );
        assert_eq!(
            parse_line("/send restore_config old.json"),
            ReplCommand::Send(SubmitAction::RestoreConfig, Some("old.json".into()))
        );
        assert!(matches!(parse_line("/send reboot"), ReplCommand::Usage(_)));
        assert!(matches!(parse_line("/send"), ReplCommand::Usage(_)));
    }

    #[test]
    fn test_complete_commands() {
        let (start, words) = candidates("/re");
        assert_eq!(start, 0);
        assert_eq!(words, vec!["/restart", "/reload", "/restore", "/router"]);
    }

    #[test]
    fn test_complete_send_offers_wire_ids() {
        let (start, words) = candidates("/send re");
        assert_eq!(start, 6);
        assert_eq!(words, vec!["restart_service", "reload_service", "restore_config"]);

        let (_, all) = candidates("/send ");
        assert_eq!(all.len(), SubmitAction::ALL.len());
    }

    #[test]
    fn test_complete_log_levels_and_states() {
        assert_eq!(candidates("/logs e").1, vec!["error", "emerg"]);
        assert_eq!(candidates("/wait s").1, vec!["stopped"]);
        // A line count follows the level; nothing to offer there.
        assert!(candidates("/logs error ").1.is_empty());
    }
}

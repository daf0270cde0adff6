//! Interactive REPL against a running MCP server.
//!
//! Launch with `linewire-mcp repl -- <server command>`.
//! Type `/help` for available commands, Tab for completion.

use std::sync::Arc;

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
use serde_json::Value;
use tokio::runtime::Handle;

use crate::client::McpClient;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/info", "Show the negotiated session"),
    ("/tools", "List the server's tools"),
    ("/resources", "List the server's resources"),
    ("/templates", "List the server's resource templates"),
    ("/prompts", "List the server's prompts"),
    ("/ping", "Ping the server"),
    ("/call", "Call a tool: /call <tool> [json-arguments]"),
    ("/read", "Read a resource: /read <uri>"),
    ("/prompt", "Get a prompt: /prompt <name> [json-arguments]"),
    ("/raw", "Send any request: /raw <method> [json-params]"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Info,
    Tools,
    Resources,
    Templates,
    Prompts,
    Ping,
    Call { tool: String, arguments: Option<Value> },
    Read { uri: String },
    Prompt { name: String, arguments: Option<Value> },
    Raw { method: String, params: Option<Value> },
    Clear,
    Exit,
    Empty,
}

/// Parse one input line. Errors are user-facing usage messages.
pub fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    let input = line.strip_prefix('/').unwrap_or(line);
    if input.is_empty() {
        return Ok(ReplCommand::Help);
    }

    let mut parts = input.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim();

    match cmd {
        "exit" | "quit" => Ok(ReplCommand::Exit),
        "help" | "h" | "?" => Ok(ReplCommand::Help),
        "clear" | "cls" => Ok(ReplCommand::Clear),
        "info" => Ok(ReplCommand::Info),
        "tools" => Ok(ReplCommand::Tools),
        "resources" => Ok(ReplCommand::Resources),
        "templates" => Ok(ReplCommand::Templates),
        "prompts" => Ok(ReplCommand::Prompts),
        "ping" => Ok(ReplCommand::Ping),
        "call" => {
            let (tool, json) = split_target(args).ok_or("Usage: /call <tool> [json-arguments]")?;
            Ok(ReplCommand::Call {
                tool,
                arguments: parse_json(json)?,
            })
        }
        "read" => match split_target(args) {
            Some((uri, "")) => Ok(ReplCommand::Read { uri }),
            _ => Err("Usage: /read <uri>".into()),
        },
        "prompt" => {
            let (name, json) =
                split_target(args).ok_or("Usage: /prompt <name> [json-arguments]")?;
            Ok(ReplCommand::Prompt {
                name,
                arguments: parse_json(json)?,
            })
        }
        "raw" => {
            let (method, json) = split_target(args).ok_or("Usage: /raw <method> [json-params]")?;
            Ok(ReplCommand::Raw {
                method,
                params: parse_json(json)?,
            })
        }
        _ => Err(format!("Unknown command '/{cmd}'. Type /help for commands.")),
    }
}

fn split_target(args: &str) -> Option<(String, &str)> {
    let mut parts = args.splitn(2, char::is_whitespace);
    let target = parts.next().filter(|t| !t.is_empty())?;
    Some((target.to_string(), parts.next().unwrap_or("").trim()))
}

fn parse_json(raw: &str) -> Result<Option<Value>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| format!("Invalid JSON: {e}"))
}

/// REPL helper for tab completion. Tool and prompt names are filled in
/// from `tools/list` and `prompts/list` at startup.
#[derive(Default)]
struct ClientHelper {
    tools: Vec<String>,
    prompts: Vec<String>,
}

fn complete_names(names: &[String], input: &str, args: &str) -> (usize, Vec<Pair>) {
    let matches = names
        .iter()
        .filter(|n| n.starts_with(args))
        .map(|n| Pair {
            display: n.clone(),
            replacement: format!("{n} "),
        })
        .collect();
    (input.len() - args.len(), matches)
}

impl Completer for ClientHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        if let Some(args) = input.strip_prefix("/call ") {
            if !args.contains(' ') {
                return Ok(complete_names(&self.tools, input, args));
            }
        }
        if let Some(args) = input.strip_prefix("/prompt ") {
            if !args.contains(' ') {
                return Ok(complete_names(&self.prompts, input, args));
            }
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for ClientHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for ClientHelper {}
impl Validator for ClientHelper {}
impl Helper for ClientHelper {}

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

/// Run the interactive REPL. Blocks the calling thread, so call it from
/// `spawn_blocking`; requests are driven on `runtime`.
pub fn run(runtime: Handle, client: Arc<McpClient>) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mlinewire-mcp v{}\x1b[0m",
        env!("CARGO_PKG_VERSION")
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

    let tools = match runtime.block_on(client.list_tools()) {
        Ok(list) => list.tools.into_iter().map(|t| t.name).collect(),
        Err(e) => {
            tracing::debug!("No tool names for completion: {e}");
            Vec::new()
        }
    };

    let prompts = match runtime.block_on(client.list_prompts()) {
        Ok(list) => list.prompts.into_iter().map(|p| p.name).collect(),
        Err(e) => {
            tracing::debug!("No prompt names for completion: {e}");
            Vec::new()
        }
    };

    let mut rl: Editor<ClientHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(ClientHelper { tools, prompts }));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".linewire_mcp_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mmcp>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let command = match parse_command(&line) {
                    Ok(command) => command,
                    Err(usage) => {
                        eprintln!("  {usage}");
                        continue;
                    }
                };
                if command == ReplCommand::Exit {
                    eprintln!("  Goodbye!");
                    break;
                }
                runtime.block_on(execute(&client, command));
                if !client.connection().state().accepts_requests() {
                    eprintln!("  Connection closed; leaving the REPL.");
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

async fn execute(client: &McpClient, command: ReplCommand) {
    let outcome = match command {
        ReplCommand::Empty | ReplCommand::Exit => return,
        ReplCommand::Help => {
            cmd_help();
            return;
        }
        ReplCommand::Clear => {
            eprint!("\x1b[2J\x1b[H");
            return;
        }
        ReplCommand::Info => {
            cmd_info(client).await;
            return;
        }
        ReplCommand::Tools => client.list_tools().await.map(|r| to_value(&r)),
        ReplCommand::Resources => client.list_resources().await.map(|r| to_value(&r)),
        ReplCommand::Templates => client.list_resource_templates().await.map(|r| to_value(&r)),
        ReplCommand::Prompts => client.list_prompts().await.map(|r| to_value(&r)),
        ReplCommand::Ping => client.ping().await.map(|()| Value::String("pong".into())),
        ReplCommand::Call { tool, arguments } => {
            client.call_tool(&tool, arguments).await.map(|r| to_value(&r))
        }
        ReplCommand::Read { uri } => client.read_resource(&uri).await.map(|r| to_value(&r)),
        ReplCommand::Prompt { name, arguments } => {
            client.get_prompt(&name, arguments).await.map(|r| to_value(&r))
        }
        ReplCommand::Raw { method, params } => client.call_raw(&method, params).await,
    };

    match outcome {
        Ok(value) => println!("{}", pretty(&value)),
        Err(e) => eprintln!("  \x1b[31mError\x1b[0m ({}): {e}", e.code()),
    }
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completes commands, tool names after /call and prompt names after /prompt.");
    eprintln!();
}

async fn cmd_info(client: &McpClient) {
    eprintln!();
    match client.session().await {
        Some(session) => {
            if let Some(info) = &session.server.server_info {
                eprintln!("  Server:     {} v{}", info.name, info.version);
            }
            eprintln!("  Protocol:   {}", session.protocol_version);
            let caps = &session.server.capabilities;
            eprintln!(
                "  Provides:   tools={} resources={} prompts={} logging={}",
                caps.tools.is_some(),
                caps.resources.is_some(),
                caps.prompts.is_some(),
                caps.logging.is_some()
            );
        }
        None => eprintln!("  Not initialized."),
    }
    eprintln!("  Connection: {}", client.connection().state());
    eprintln!("  Pending:    {}", client.connection().pending_count());
    eprintln!();
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| Value::String(e.to_string()))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

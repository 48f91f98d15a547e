//! Purpose: `rowrelay` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs the relay or the console.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Credentials only come from flags or the environment, never from stdout.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};

mod console;
mod serve;

use rowrelay::api::{
    DEFAULT_API_URL, DEFAULT_PAGE_SIZE, Error, ErrorKind, PageSize, RelayClient, UpstreamConfig,
    to_exit_code,
};
use rowrelay::ui::Session;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    dotenvy::dotenv().ok();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    dispatch_command(cli.command)
        .map_err(add_transport_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "rowrelay",
    version,
    about = "CRUD relay and records console for an Airtable-style table",
    long_about = None,
    before_help = r#"The relay keeps the upstream credential server-side; clients only talk to it.

Mental model:
  - `serve` runs the relay in front of one upstream table
  - `ui` browses, searches, edits and deletes records through the relay
"#,
    after_help = r#"EXAMPLES
  $ AIRTABLE_TOKEN=pat... AIRTABLE_BASE_ID=app... rowrelay serve
  $ rowrelay ui --relay http://127.0.0.1:3000
  $ rowrelay health --relay http://127.0.0.1:3000

LEARN MORE
  $ rowrelay <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Run the record relay",
        long_about = r#"Serve /api/records and /health in front of one upstream table.

The upstream token is attached to every upstream call and never sent to clients."#,
        after_help = r#"EXAMPLES
  $ rowrelay serve --token pat... --base-id app...
  $ rowrelay serve --table Clientes --port 8080 --static-dir ./public
  $ rowrelay serve --check"#
    )]
    Serve(ServeArgs),
    #[command(
        about = "Interactive records console",
        after_help = r#"EXAMPLES
  $ rowrelay ui
  $ rowrelay ui --relay http://10.0.0.5:3000 --page-size 20"#
    )]
    Ui {
        #[arg(long, default_value = DEFAULT_RELAY_URL, env = "ROWRELAY_URL", help = "Relay base URL")]
        relay: String,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, help = "Records per page (1-50)")]
        page_size: u32,
    },
    #[command(about = "Check that a relay is up")]
    Health {
        #[arg(long, default_value = DEFAULT_RELAY_URL, env = "ROWRELAY_URL", help = "Relay base URL")]
        relay: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ rowrelay completion bash > ~/.local/share/bash-completion/completions/rowrelay
  $ rowrelay completion zsh > ~/.zfunc/_rowrelay
  $ rowrelay completion fish > ~/.config/fish/completions/rowrelay.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000";

#[derive(clap::Args)]
struct ServeArgs {
    #[arg(long, env = "AIRTABLE_TOKEN", hide_env_values = true, help = "Upstream API token")]
    token: Option<String>,
    #[arg(long, env = "AIRTABLE_BASE_ID", help = "Upstream base id")]
    base_id: Option<String>,
    #[arg(long, env = "AIRTABLE_TABLE_NAME", default_value = "Clientes", help = "Upstream table name")]
    table: String,
    #[arg(long, env = "HOST", default_value = "127.0.0.1", help = "Bind address")]
    host: IpAddr,
    #[arg(long, env = "PORT", default_value_t = 3000, help = "Bind port")]
    port: u16,
    #[arg(long, env = "AIRTABLE_API_URL", default_value = DEFAULT_API_URL, help = "Upstream API root")]
    api_url: String,
    #[arg(long, default_value_t = 15_000, help = "Upstream call timeout in milliseconds")]
    upstream_timeout_ms: u64,
    #[arg(long, value_hint = ValueHint::DirPath, help = "Serve static client assets from this directory")]
    static_dir: Option<PathBuf>,
    #[arg(long = "cors-origin", help = "Allowed CORS origin (repeatable; default any)")]
    cors_origins: Vec<String>,
    #[arg(long, help = "Validate configuration, print it as JSON, and exit")]
    check: bool,
}

impl ServeArgs {
    fn into_config(self) -> serve::ServeConfig {
        let upstream = UpstreamConfig::new(
            self.token.unwrap_or_default(),
            self.base_id.unwrap_or_default(),
            self.table,
        )
        .with_api_url(self.api_url)
        .with_timeout(Duration::from_millis(self.upstream_timeout_ms));
        serve::ServeConfig {
            bind: SocketAddr::new(self.host, self.port),
            upstream,
            static_dir: self.static_dir,
            cors_origins: self.cors_origins,
        }
    }
}

fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "rowrelay", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            let check = args.check;
            let config = args.into_config();
            if check {
                serve::validate_config(&config)?;
                emit_json(serve::config_json(&config));
                return Ok(RunOutcome::ok());
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::Health { relay } => {
            let client = RelayClient::new(relay)?;
            emit_json(client.health()?);
            Ok(RunOutcome::ok())
        }
        Command::Ui { relay, page_size } => {
            serve::init_tracing("warn");
            let client = RelayClient::new(relay)?;
            let mut session = Session::new(client, PageSize::new(page_size));
            let stdin = io::stdin();
            console::run_console(&mut session, stdin.lock(), io::stdout())?;
            Ok(RunOutcome::ok())
        }
    }
}

fn add_transport_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Io || err.hint().is_some() {
        return err;
    }
    err.with_hint("Check network access and that the relay address is correct.")
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::RateLimited => "rate limited".to_string(),
        ErrorKind::Upstream => "upstream error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(status) = err.status() {
        lines.push(format!(
            "{} {status}",
            colorize_label("status:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `rowrelay --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "rowrelay") else {
        return "Try `rowrelay --help`.".to_string();
    };

    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect();

    if parts.is_empty() {
        return "Try `rowrelay --help`.".to_string();
    }
    format!("Try `rowrelay {} --help`.", parts.join(" "))
}

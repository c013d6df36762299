use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use knob_schema::{KnobCommand, KnobReply, DEFAULT_SOURCE, SYSTEM_SOURCE};
use serde_json::{Map as JsonMap, Value as JsonValue};

#[derive(Parser, Debug)]
#[command(author, version, about = "Operator client for the Galactic knob server", long_about = None)]
struct Args {
    /// Address of the knob server
    #[arg(long, default_value = "127.0.0.1:41100")]
    addr: SocketAddr,

    /// Print the raw reply line instead of pretty JSON
    #[arg(long)]
    raw: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every knob-owning system
    Systems,
    /// Show current values and bounds of a system
    Values { system: String },
    /// Show documentation and example payloads of a system
    Describe { system: String },
    /// Submit a batch update (format: key=value, repeatable)
    Set {
        system: String,
        #[arg(required = true)]
        assignments: Vec<String>,
        /// Provenance tag recorded on applied knobs
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,
    },
    /// Restore every knob of a system to its default
    Reset {
        system: String,
        #[arg(long, default_value = SYSTEM_SOURCE)]
        source: String,
    },
    /// Print the JSON schema of update requests
    Schema,
    /// Ask the server to stop after logging its final state
    Shutdown,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let command = build_command(args.command)?;
    let line = serde_json::to_string(&command).context("Failed to encode request")?;

    let stream = TcpStream::connect(args.addr)
        .with_context(|| format!("Unable to connect to knob server at {}", args.addr))?;
    let mut writer = stream
        .try_clone()
        .context("Unable to clone server connection")?;
    writeln!(writer, "{line}").context("Failed to send request")?;

    let mut reply_line = String::new();
    BufReader::new(stream)
        .read_line(&mut reply_line)
        .context("Failed to read reply")?;
    if reply_line.trim().is_empty() {
        bail!("Server closed the connection without replying");
    }

    if args.raw {
        println!("{}", reply_line.trim_end());
        return Ok(());
    }

    let reply: KnobReply =
        serde_json::from_str(reply_line.trim()).context("Server reply is not valid JSON")?;
    if !reply.ok {
        let kind = reply
            .kind
            .map(|kind| format!("{kind:?}"))
            .unwrap_or_else(|| "unknown".to_string());
        bail!(
            "{} ({kind})",
            reply.error.unwrap_or_else(|| "request failed".to_string())
        );
    }

    let data = reply.data.unwrap_or(JsonValue::Null);
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

fn build_command(command: Command) -> Result<KnobCommand> {
    Ok(match command {
        Command::Systems => KnobCommand::Systems,
        Command::Values { system } => KnobCommand::Values { system },
        Command::Describe { system } => KnobCommand::Describe { system },
        Command::Set {
            system,
            assignments,
            source,
        } => KnobCommand::Update {
            system,
            knobs: parse_assignments(&assignments)?,
            source,
        },
        Command::Reset { system, source } => KnobCommand::Reset { system, source },
        Command::Schema => KnobCommand::Schema,
        Command::Shutdown => KnobCommand::Shutdown,
    })
}

/// `key=value` pairs; values stay strings except `true`/`false`, so the
/// server decides how to interpret them.
fn parse_assignments(assignments: &[String]) -> Result<JsonMap<String, JsonValue>> {
    let mut knobs = JsonMap::new();
    for assignment in assignments {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid assignment '{assignment}', expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid assignment '{assignment}', key is empty");
        }
        let value = value.trim();
        let raw = match value {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            other => JsonValue::String(other.to_string()),
        };
        knobs.insert(key.to_string(), raw);
    }
    Ok(knobs)
}

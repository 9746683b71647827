//! Command-line surface.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{Arg, Args, Command, Parser, Subcommand};

use crate::config::{DEFAULT_DSN, MatchTarget, RemovalMode, RemoverConfig};
use crate::error::ConfigError;

const LONG_ABOUT: &str = "\
Removes messages from an AMQP queue selectively. Matches the message body against a \
regular expression by default.

Only unacknowledged messages can be processed. To scan a whole queue the prefetch count \
must be greater than or equal to the queue size. Alternatively run with --continuous next \
to your normal consumer; it then removes whatever that consumer has not taken yet.";

#[derive(Debug, Parser)]
#[command(
    name = "amqp-message-remover",
    version,
    about = "Removes messages from AMQP queue selectively by regexp",
    long_about = LONG_ABOUT,
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    #[command(flatten)]
    pub remove: RemoveArgs,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Generates markdown documentation
    Doc {
        /// Directory to write the markdown files into
        #[arg(default_value = "./")]
        dir: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Queue to remove messages from
    #[arg(value_name = "QUEUE_NAME", required = true)]
    pub queue: Option<String>,

    /// Regular expression without delimiters (example: .*some-bad-value.*)
    #[arg(value_name = "REGEX", required = true)]
    pub pattern: Option<String>,

    /// AMQP URL of the broker
    #[arg(value_name = "DSN", env = "AMQP_REMOVER_DSN", default_value = DEFAULT_DSN, hide_env_values = true)]
    pub dsn: String,

    /// Prefetch count: how many messages to scan (or minimum to delete when --continuous)
    #[arg(long, required = true, value_parser = clap::value_parser!(u32).range(1..=65535))]
    pub prefetch: Option<u32>,

    /// Run alongside a regular consumer, as if the command were rerun continuously
    #[arg(long)]
    pub continuous: bool,

    /// Reject matched messages instead of acknowledging them, i.e. send them to the DLX
    #[arg(long)]
    pub nack: bool,

    /// Match headers instead of body; they are serialized to JSON before matching
    #[arg(long)]
    pub headers: bool,
}

impl RemoveArgs {
    /// Validate and turn the arguments into a run configuration.
    pub fn to_config(&self) -> Result<RemoverConfig, ConfigError> {
        let queue = self.queue.as_deref().ok_or_else(|| missing("QUEUE_NAME"))?;
        let pattern = self.pattern.as_deref().ok_or_else(|| missing("REGEX"))?;
        let prefetch = self.prefetch.ok_or_else(|| missing("--prefetch"))?;

        let config = RemoverConfig::new(self.dsn.clone(), queue, pattern, prefetch)?
            .with_continuous(self.continuous)
            .with_removal_mode(if self.nack {
                RemovalMode::Nack
            } else {
                RemovalMode::Ack
            })
            .with_match_target(if self.headers {
                MatchTarget::Headers
            } else {
                MatchTarget::Body
            });
        Ok(config)
    }
}

fn missing(key: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: "is required".to_string(),
    }
}

/// Write one markdown page per command into `dir`, named after the command
/// path (`amqp-message-remover.md`, `amqp-message-remover_doc.md`).
pub fn write_markdown_docs(cmd: &Command, dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    write_command_docs(cmd, &[], dir, &mut written)?;
    Ok(written)
}

fn write_command_docs(
    cmd: &Command,
    parents: &[String],
    dir: &Path,
    written: &mut Vec<PathBuf>,
) -> Result<(), ConfigError> {
    let mut path_names = parents.to_vec();
    path_names.push(cmd.get_name().to_string());

    let file = dir.join(format!("{}.md", path_names.join("_")));
    std::fs::write(&file, render_markdown(cmd, &path_names))?;
    written.push(file);

    for sub in cmd.get_subcommands() {
        if sub.get_name() == "help" {
            continue;
        }
        write_command_docs(sub, &path_names, dir, written)?;
    }
    Ok(())
}

/// Markdown page for a single command.
pub fn render_markdown(cmd: &Command, path_names: &[String]) -> String {
    let mut out = String::new();
    let full_name = path_names.join(" ");

    let _ = writeln!(out, "## {full_name}\n");
    if let Some(about) = cmd.get_about() {
        let _ = writeln!(out, "{about}\n");
    }
    if let Some(long) = cmd.get_long_about() {
        let _ = writeln!(out, "### Synopsis\n\n{long}\n");
    }

    let usage = cmd.clone().render_usage().to_string();
    let usage = usage.trim_start_matches("Usage: ");
    let _ = writeln!(out, "```\n{usage}\n```\n");

    let args: Vec<&Arg> = cmd.get_arguments().collect();
    if !args.is_empty() {
        let _ = writeln!(out, "### Options\n");
        for arg in args {
            let _ = writeln!(out, "* {}", describe_arg(arg));
        }
        out.push('\n');
    }

    let subs: Vec<&Command> = cmd
        .get_subcommands()
        .filter(|s| s.get_name() != "help")
        .collect();
    if !subs.is_empty() {
        let _ = writeln!(out, "### Subcommands\n");
        for sub in subs {
            let link = format!("{}_{}", path_names.join("_"), sub.get_name());
            let about = sub.get_about().map(|a| a.to_string()).unwrap_or_default();
            let _ = writeln!(out, "* [{} {}]({link}.md)\t - {about}", full_name, sub.get_name());
        }
    }

    out
}

fn describe_arg(arg: &Arg) -> String {
    let mut name = if arg.is_positional() {
        format!("`<{}>`", arg.get_id())
    } else {
        match (arg.get_short(), arg.get_long()) {
            (Some(s), Some(l)) => format!("`-{s}, --{l}`"),
            (None, Some(l)) => format!("`--{l}`"),
            (Some(s), None) => format!("`-{s}`"),
            (None, None) => format!("`{}`", arg.get_id()),
        }
    };

    if arg.is_required_set() {
        name.push_str(" (required)");
    }
    if let Some(help) = arg.get_help() {
        let _ = write!(name, ": {help}");
    }
    let defaults: Vec<String> = arg
        .get_default_values()
        .iter()
        .map(|v| v.to_string_lossy().into_owned())
        .collect();
    if !defaults.is_empty() {
        let _ = write!(name, " (default `{}`)", defaults.join(", "));
    }
    if let Some(env) = arg.get_env() {
        let _ = write!(name, " [env: {}]", env.to_string_lossy());
    }
    name
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Condition matching and alert throttling for event streams.
///
/// Replays events against alert policies, or compiles search filters into
/// storage predicates.
#[derive(Parser, Debug)]
#[command(name = "watchpost", version, about)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run events through alert policies and print alert signals as JSON lines.
    Match(MatchArgs),
    /// Compile a dynamic filter into a predicate and its PostgreSQL rendering.
    Compile(CompileArgs),
}

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// YAML file with a list of policies.
    #[arg(long, env = "WATCHPOST_POLICIES", default_value = "data/policies/examples.yml")]
    pub policies: PathBuf,

    /// JSONL file with one event per line.
    #[arg(long)]
    pub events: PathBuf,

    /// Keep throttle state in PostgreSQL (PG_* settings) instead of memory.
    #[arg(long)]
    pub postgres: bool,

    /// Throttle against the wall clock instead of each event's timestamp.
    #[arg(long)]
    pub live: bool,

    /// Print every policy outcome, not only alert signals.
    #[arg(long)]
    pub outcomes: bool,
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// JSON file with `filters` and/or `filter_groups`; `-` reads stdin.
    #[arg(long)]
    pub filter: PathBuf,

    /// Drop regex conditions, for engines without a regex operator.
    #[arg(long)]
    pub no_regex: bool,
}

//! CLI argument definitions for Stepwise.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stepwise - process checklists, template forking and calendar scheduling.
///
/// Start with `sw system init`, then `sw synthesize --owner <you>` to seed a workspace.
#[derive(Parser, Debug)]
#[command(name = "sw")]
#[command(author, version, about = "Process checklists, template forking and calendar scheduling", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Use this database file instead of <data dir>/stepwise.db
    #[arg(long = "db", global = true, env = "SW_DB")]
    pub db_path: Option<PathBuf>,

    /// Treat this date as today (YYYY-MM-DD) for statuses and windows
    #[arg(long = "as-of", global = true)]
    pub as_of: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// System administration (init, info)
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },

    /// Directory management
    Dir {
        #[command(subcommand)]
        command: DirCommands,
    },

    /// Process and template management
    Process {
        #[command(subcommand)]
        command: ProcessCommands,
    },

    /// Step management
    Step {
        #[command(subcommand)]
        command: StepCommands,
    },

    /// Substep management
    Substep {
        #[command(subcommand)]
        command: SubstepCommands,
    },

    /// Fork a template into an owner's instance (returns the existing one if present)
    Fork {
        /// Template process ID
        template_id: i64,

        /// Owner of the instance
        #[arg(long)]
        owner: String,
    },

    /// Complete open substeps under completed steps
    Reconcile {
        /// Process ID to repair
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        process_id: Option<i64>,

        /// Repair every process in the store
        #[arg(long)]
        all: bool,
    },

    /// Fill an owner's calendar with scheduled events
    Schedule {
        #[arg(long)]
        owner: String,

        /// Role tag used to weight templates (e.g. dev, design, pm)
        #[arg(long)]
        role: Option<String>,

        /// First day of the window (default: as-of minus window-days-back)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day of the window (default: as-of plus window-days-ahead)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Process IDs to schedule from (default: all templates plus own processes)
        #[arg(long = "pool", value_delimiter = ',')]
        pool: Vec<i64>,

        /// Random seed (default: config `seed`)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Event commands
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },

    /// Seed an owner's workspace: templates, instances, events, feed and reports
    Synthesize {
        #[arg(long)]
        owner: String,

        /// Role tag selecting the sample content (e.g. dev, design, pm)
        #[arg(long)]
        role: Option<String>,

        /// Random seed (default: config `seed`)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Ask the chat assistant about a process
    Assist {
        /// Process ID the question is about
        process_id: i64,

        /// Message to send
        message: String,

        /// Apply the operations the assistant suggests
        #[arg(long)]
        apply: bool,

        /// Answer locally even if an assistant endpoint is configured
        #[arg(long)]
        offline: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// System administration subcommands
#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Create the database (safe to re-run)
    Init,

    /// Show build information, storage location and store totals
    Info,
}

/// Directory subcommands
#[derive(Subcommand, Debug)]
pub enum DirCommands {
    /// Create a directory
    Create {
        /// Directory name
        name: String,

        #[arg(long)]
        owner: String,

        /// Parent directory ID
        #[arg(long)]
        parent: Option<i64>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        icon: Option<String>,
    },

    /// List an owner's directories
    List {
        #[arg(long)]
        owner: String,
    },

    /// Move a directory under another (or to the top level without --parent)
    Move {
        id: i64,

        /// New parent directory ID
        #[arg(long)]
        parent: Option<i64>,
    },

    /// Delete a directory; its processes and subdirectories move to its parent
    Delete { id: i64 },
}

/// Process subcommands
#[derive(Subcommand, Debug)]
pub enum ProcessCommands {
    /// Create a process or template
    Create {
        /// Process title
        title: String,

        #[arg(long)]
        owner: String,

        /// Create a template instead of a plain process
        #[arg(long)]
        template: bool,

        /// Directory ID
        #[arg(long)]
        dir: Option<i64>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Show a process with its steps and progress
    Show { id: i64 },

    /// List processes
    List {
        /// Filter by owner
        #[arg(long)]
        owner: Option<String>,

        /// Only templates
        #[arg(long, conflicts_with = "plain")]
        templates: bool,

        /// Only non-templates
        #[arg(long)]
        plain: bool,
    },

    /// Move a process into a directory (or out of all directories without --dir)
    Move {
        id: i64,

        /// Directory ID
        #[arg(long)]
        dir: Option<i64>,
    },

    /// Mark a template as favorite (templates only)
    Favorite {
        id: i64,

        /// Clear the favorite flag instead
        #[arg(long)]
        off: bool,
    },

    /// Delete a process with its steps
    Delete { id: i64 },
}

/// Step subcommands
#[derive(Subcommand, Debug)]
pub enum StepCommands {
    /// Append a step to a process
    Add {
        process_id: i64,
        content: String,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Complete a step and all of its substeps
    Complete { id: i64 },

    /// Reopen a step
    Uncomplete {
        id: i64,

        /// Reopen its substeps too
        #[arg(long)]
        cascade: bool,
    },

    /// Move a step to a 1-based position
    Move { id: i64, position: u32 },

    /// Delete a step
    Delete { id: i64 },
}

/// Substep subcommands
#[derive(Subcommand, Debug)]
pub enum SubstepCommands {
    /// Append a substep to a step
    Add {
        step_id: i64,
        content: String,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Complete a substep (or reopen it with --undo, which reopens its step)
    Complete {
        id: i64,

        #[arg(long)]
        undo: bool,
    },

    /// Move a substep to a 1-based position
    Move { id: i64, position: u32 },

    /// Delete a substep
    Delete { id: i64 },
}

/// Event subcommands
#[derive(Subcommand, Debug)]
pub enum EventCommands {
    /// List an owner's events
    List {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Link orphan events to processes and re-derive broken timings
    Repair {
        /// Only repair this owner's events
        #[arg(long)]
        owner: Option<String>,
    },

    /// Wire relations between an owner's generated events
    Relate {
        #[arg(long)]
        owner: String,

        /// Share of events to relate (default: config `relation-ratio`)
        #[arg(long)]
        ratio: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Re-derive generated event statuses against as-of
    Refresh {
        #[arg(long)]
        owner: String,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Get a configuration value and where it came from
    Get {
        /// Configuration key
        key: String,
    },

    /// Set a value in the workspace config.kdl
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show every configuration value with its source
    Show,
}

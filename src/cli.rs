use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "compass", about = "AI-coached task prioritization and focus sessions")]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.compass/compass.db]
    #[arg(long, env = "COMPASS_DB", global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add a task (AI-evaluated, or heuristic without an API key)
    Add {
        /// Task title
        title: String,
        /// Category (aspirational, obligatory)
        #[arg(short, long, default_value = "aspirational")]
        category: String,
    },

    /// Add many tasks at once, one per line (max 20)
    Bulk {
        /// Task lines (omit to read from stdin)
        text: Option<String>,
        /// Read task lines from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// List the task board
    List {
        /// Only this category
        #[arg(long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a task
    Rm {
        /// Task id
        id: i64,
    },

    /// Remove every task in a category
    Clear {
        /// Category to empty
        category: String,
    },

    /// Set a task's pre- or post-action note
    Note {
        /// Task id
        id: i64,
        /// Which note (pre, post)
        field: String,
        /// Note text
        text: String,
    },

    /// Quick-complete a task, skipping guide and timer
    Done {
        /// Task id
        id: i64,
    },

    /// Run an interactive focus session for a task
    Run {
        /// Task id
        id: i64,
    },

    /// Inspect and edit the completion log
    Log {
        #[command(subcommand)]
        command: LogCommand,
    },

    /// Show or update the personalization profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Manage uploaded reference documents
    Doc {
        #[command(subcommand)]
        command: DocCommand,
    },

    /// Show or update AI settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum LogCommand {
    /// List completion log entries, newest first
    List {
        /// Only this category
        #[arg(long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one entry in full
    Show {
        /// Entry index from `log list`
        index: usize,
    },

    /// Edit an entry
    Edit {
        /// Entry index from `log list`
        index: usize,
        /// Replace the post-action note
        #[arg(long)]
        note: Option<String>,
        /// Correct the actual duration (minutes)
        #[arg(long)]
        actual: Option<u32>,
    },

    /// Delete an entry
    Rm {
        /// Entry index from `log list`
        index: usize,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Print the current profile
    Show,

    /// Update profile fields
    Set {
        /// Your name
        #[arg(long)]
        name: Option<String>,
        /// Free-form profile text
        #[arg(long)]
        about: Option<String>,
        /// Custom instructions for the AI coach
        #[arg(long)]
        instructions: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DocCommand {
    /// Upload a reference document (.md or .txt)
    Add {
        /// Path to the document
        path: String,
    },

    /// Remove an uploaded document
    Rm {
        /// Document name
        name: String,
    },

    /// List uploaded documents
    List,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print current settings (API key redacted)
    Show,

    /// Update settings
    Set {
        /// Gemini API key
        #[arg(long)]
        api_key: Option<String>,
        /// Model id
        #[arg(long)]
        model: Option<String>,
        /// API base URL
        #[arg(long)]
        base_url: Option<String>,
        /// Per-call timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

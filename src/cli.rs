use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sweep", about = "Time-boxed household cleaning sessions")]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.sweep/sweep.db]
    #[arg(long, env = "SWEEP_DB", global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage zones (rooms and areas)
    Zone {
        #[command(subcommand)]
        action: ZoneAction,
    },

    /// Add a task
    Add {
        /// Zone the task belongs to (created if missing)
        zone: String,
        /// What to do
        label: String,
        /// Estimated minutes
        #[arg(short, long, default_value_t = 10)]
        duration: i64,
        /// Priority: 1/high, 2/medium, 3/low
        #[arg(short, long, default_value = "medium")]
        priority: String,
        /// Repeat every N days after completion (0 = one-shot)
        #[arg(short, long, default_value_t = 0)]
        recurrence: u32,
        /// Task that must be completed first
        #[arg(long)]
        after: Option<String>,
        /// Reference image for the task
        #[arg(long)]
        image: Option<String>,
    },

    /// Edit a task
    Edit {
        /// Task id
        id: String,
        #[arg(long)]
        zone: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(short, long)]
        duration: Option<i64>,
        #[arg(short, long)]
        priority: Option<String>,
        #[arg(short, long)]
        recurrence: Option<u32>,
        #[arg(long)]
        image: Option<String>,
        /// Remove the reference image
        #[arg(long, conflicts_with = "image")]
        no_image: bool,
    },

    /// Remove a task
    Rm {
        /// Task id
        id: String,
    },

    /// List tasks
    List {
        /// Only tasks in this zone
        #[arg(long)]
        zone: Option<String>,
        /// Flat list instead of grouping by zone
        #[arg(long)]
        flat: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show task details
    Show {
        /// Task id
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark a task completed
    Done {
        /// Task id
        id: String,
        /// Who did it
        #[arg(long)]
        by: Option<String>,
    },

    /// Return a task to pending
    Reopen {
        /// Task id
        id: String,
    },

    /// Make a task wait for another, or clear its dependency
    Depend {
        /// Task id
        id: String,
        /// Task it waits for (omit to clear)
        on: Option<String>,
    },

    /// Preview the queue a session would get
    Plan {
        /// Minutes available, or "all"
        #[arg(short, long)]
        budget: Option<String>,
        #[arg(long)]
        zone: Option<String>,
        #[arg(long)]
        level: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a cleaning session step by step
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Walk the current session in a full-screen view
    Run,

    /// Show how tidy each zone is
    Progress {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a JSON backup (stdout if no path)
    Export {
        path: Option<String>,
    },

    /// Load a JSON backup
    Import {
        path: String,
        /// Drop existing tasks first
        #[arg(long)]
        replace: bool,
    },
}

#[derive(Subcommand)]
pub enum ZoneAction {
    /// Add a zone, or set the level of an existing one
    Add {
        name: String,
        /// Floor or area grouping
        #[arg(long)]
        level: Option<String>,
    },
    /// List zones
    List,
    /// Remove an empty zone
    Rm { name: String },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Build a queue and start a session
    Start {
        /// Minutes available, or "all"
        #[arg(short, long)]
        budget: Option<String>,
        #[arg(long)]
        zone: Option<String>,
        #[arg(long)]
        level: Option<String>,
    },
    /// Show the current session
    Status,
    /// Complete the current task
    Done {
        #[arg(long)]
        by: Option<String>,
    },
    /// Skip the current task
    Skip,
    /// Swap the current task for one of similar length
    Swap,
    /// End the session early
    Finish {
        /// Record the untouched tasks as skipped
        #[arg(long)]
        skip_rest: bool,
    },
    /// Discard the session without a summary
    Cancel,
}

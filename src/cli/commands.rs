use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "annofold",
    about = concat!(
        "annofold v",
        env!("CARGO_PKG_VERSION"),
        " - fold schema annotations everywhere at once"
    ),
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run as if started in a different directory
    #[arg(short = 'C', long = "workspace-dir", global = true)]
    pub workspace_dir: Option<String>,

    /// Log each step to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a workspace (.annofold/settings.toml) in the current directory
    Init(InitArgs),
    /// Toggle annotation visibility in every open view
    Toggle,
    /// Show the current visibility and where it is stored
    Status,
    /// Print the annotation block of a file
    Locate(FileArgs),
    /// Print every annotation block of a file as folding ranges
    Ranges(FileArgs),
    /// Open a file in a new view and focus it
    Open(OpenArgs),
    /// Focus an open view
    Focus(ViewArgs),
    /// Close an open view
    Close(ViewArgs),
    /// List open views and their folds
    Views,
    /// Apply visibility whenever another process changes the focused view
    Watch(WatchArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing settings file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct FileArgs {
    /// File to scan
    pub file: String,
}

#[derive(Args)]
pub struct OpenArgs {
    /// File to open
    pub file: String,
    /// Tab group to open it in (1-based)
    #[arg(long, short, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub group: u32,
}

#[derive(Args)]
pub struct ViewArgs {
    /// View id, as shown by `annofold views`
    pub view: String,
}

#[derive(Args)]
pub struct WatchArgs {
    /// How long to wait for a session change per poll, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,
}

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally", about = concat!("tally v", env!("CARGO_PKG_VERSION"), " - hours per project, one JSON file each"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: ./tally.toml)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Data directory, overriding the config
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all projects with their total hours
    List,
    /// Show a project or sub-project and everything under it
    Show(ShowArgs),
    /// Create a new project
    Create(CreateArgs),
    /// Delete a project and its file
    Remove(RemoveArgs),
    /// Log time on a project or sub-project
    AddTime(AddTimeArgs),
    /// Add a sub-project
    AddSub(AddSubArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    /// Project uid
    pub uid: String,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Project name (default: from config)
    pub name: Option<String>,
    /// Icon identifier (default: from config)
    #[arg(long)]
    pub icon: Option<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Uid of a top-level project
    pub uid: String,
}

#[derive(Args)]
pub struct AddTimeArgs {
    /// Project or sub-project uid
    pub uid: String,
    #[arg(long, default_value_t = 0)]
    pub hours: u32,
    #[arg(long, default_value_t = 0)]
    pub minutes: u32,
}

#[derive(Args)]
pub struct AddSubArgs {
    /// Uid of the project to add under
    pub parent: String,
    /// Sub-project name
    pub name: String,
    #[arg(long, default_value = "")]
    pub icon: String,
}

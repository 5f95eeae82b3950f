use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "entity-mirror")]
#[command(about = "Entity mirror CLI - inspect and exercise the lifecycle event bridge")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to entity-mirror.toml when present)
    #[arg(short, long, global = true, env = "ENTITY_MIRROR_CONFIG")]
    pub config: Option<String>,

    /// Log level (overrides the [logging] section of the configuration)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective configuration
    Config,
    /// Run a parent/child unit of work against an in-memory registry and show what got mirrored
    Demo(DeviceArgs),
    /// Show listener group sizes before injection, after injection and after removal
    Categories(DeviceArgs),
}

#[derive(clap::Args)]
pub struct DeviceArgs {
    /// Register insert/update/delete listeners in the post-commit categories
    #[arg(long)]
    pub post_commit: bool,
    /// Mirror entity changes only, not owned-collection mutations
    #[arg(long)]
    pub no_collections: bool,
}

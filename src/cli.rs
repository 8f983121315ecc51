use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{ArgGroup, Args, Parser, Subcommand};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "alertsync")]
#[command(bin_name = "alertsync")]
#[command(version)]
#[command(about = "Reconcile alert exports with cases and durable workflow state")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'D',
        long,
        env = "ALERTSYNC_DATA_DIR",
        global = true,
        help = "Directory holding the alert export, case file and workflow document."
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        short = 'c',
        long,
        env = "ALERTSYNC_CONFIG",
        global = true,
        help = "Path to an alertsync.toml config file."
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable debug logging for this run.")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Reconcile the export against stored workflow state.")]
    Sync(SyncArgs),
    #[command(about = "List alerts with filtering.")]
    Ls(ListArgs),
    #[command(about = "Show one alert by key.")]
    Show(ShowArgs),
    #[command(about = "Update an alert's workflow status, notes or resolution time.")]
    Update(UpdateArgs),
    #[command(about = "Print the normalized form of a case identifier.")]
    Normalize(NormalizeArgs),
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[arg(short = 'j', long, help = "Render the full alert index as JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,

    #[arg(long = "case", help = "Only alerts matched to this case id.")]
    pub case_id: Option<String>,

    #[arg(short = 's', long, help = "Filter by workflow status.")]
    pub status: Option<String>,

    #[arg(
        short = 'u',
        long,
        help = "Only alerts that did not match a case (including missing identifiers)."
    )]
    pub unmatched: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(help = "Alert key.")]
    pub key: String,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("resolution")
        .args(["resolved_at", "clear_resolved"])
        .multiple(false)
))]
pub struct UpdateArgs {
    #[arg(help = "Alert key.")]
    pub key: String,

    #[arg(short = 's', long, help = "New workflow status.")]
    pub status: Option<String>,

    #[arg(short = 'n', long, help = "Resolution notes (empty string clears).")]
    pub notes: Option<String>,

    #[arg(long = "resolved-at", help = "Explicit RFC3339 resolution time.")]
    pub resolved_at: Option<String>,

    #[arg(long = "clear-resolved", help = "Record that the alert is not resolved.")]
    pub clear_resolved: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    #[arg(help = "Raw case identifier.")]
    pub value: String,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

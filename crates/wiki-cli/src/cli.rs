use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// User name assumed when `--user` is not given.
pub const ANONYMOUS: &str = "anonymous";

#[derive(Parser)]
#[command(name = "wiki", about = "Versioned wiki page store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store pages under this directory (overrides the configured backend)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Act as this user
    #[arg(short, long, global = true, default_value = ANONYMOUS)]
    pub user: String,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Save page text from a file or stdin
    Save(SaveArgs),
    /// Print a page
    Show(ShowArgs),
    /// List the retained versions of a page
    History(PageArgs),
    /// Delete a page with its history and attachments
    Delete(PageArgs),
    /// Delete one version of a page
    DeleteVersion(DeleteVersionArgs),
    /// Rename a page and rewrite links to it
    Rename(RenameArgs),
    /// List saved pages
    List(ListArgs),
    /// Try to take an edit lock on a page
    Lock(PageArgs),
    /// List saves awaiting approval
    Pending(PendingArgs),
    /// Approve a pending save
    Approve(DecisionArgs),
    /// Reject a pending save
    Reject(RejectArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct PageArgs {
    pub page: String,
}

#[derive(Args)]
pub struct SaveArgs {
    pub page: String,
    /// Read the text from this file instead of stdin
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Use this text directly
    #[arg(short, long, conflicts_with = "file")]
    pub text: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub page: String,
    /// Version to show; the latest by default
    #[arg(short = 'r', long)]
    pub version: Option<u32>,
    /// Print attributes and ACL as well as the text
    #[arg(long)]
    pub info: bool,
}

#[derive(Args)]
pub struct DeleteVersionArgs {
    pub page: String,
    pub version: u32,
}

#[derive(Args)]
pub struct RenameArgs {
    pub from: String,
    pub to: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only pages in this space
    #[arg(short, long)]
    pub space: Option<String>,
}

#[derive(Args)]
pub struct PendingArgs {
    /// Only decisions addressed to this approver
    #[arg(long)]
    pub approver: Option<String>,
}

#[derive(Args)]
pub struct DecisionArgs {
    /// Workflow id, as `#7` or `7`
    pub id: String,
}

#[derive(Args)]
pub struct RejectArgs {
    pub id: String,
    #[arg(short, long, default_value = "rejected")]
    pub reason: String,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Print only this key
    pub key: Option<String>,
}

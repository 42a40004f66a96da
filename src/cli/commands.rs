use crate::model::WorkspaceKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "netpilot",
    about = "ML workspace network connectivity diagnostics and security posture tool",
    version,
    author
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format for logs
    #[arg(long, default_value = "text", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a workspace's network connectivity and security posture
    Analyze {
        /// Workspace name
        #[arg(short, long)]
        workspace: String,

        /// Resource group containing the workspace
        #[arg(short = 'g', long)]
        resource_group: String,

        /// Subscription id. Defaults to the CLI's active subscription
        #[arg(short, long)]
        subscription: Option<String>,

        /// Workspace kind
        #[arg(short, long, value_enum, default_value = "ml-workspace")]
        kind: KindArg,

        /// Analyze from a directory of recorded control-plane responses
        /// instead of calling the cloud
        #[arg(long, value_name = "DIR")]
        offline: Option<PathBuf>,

        /// Reports directory (overrides configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also render the report as a standalone HTML page
        #[arg(long)]
        html: bool,

        /// Also bundle the report files into a .tar.gz
        #[arg(long)]
        archive: bool,

        /// Path to a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run two full analyses and report their structural differences
    Compare {
        /// First workspace name
        #[arg(long)]
        workspace_a: String,

        /// First workspace's resource group
        #[arg(long)]
        resource_group_a: String,

        /// Second workspace name
        #[arg(long)]
        workspace_b: String,

        /// Second workspace's resource group (defaults to the first's)
        #[arg(long)]
        resource_group_b: Option<String>,

        /// Subscription id shared by both workspaces
        #[arg(short, long)]
        subscription: Option<String>,

        /// Workspace kind (applies to both sides)
        #[arg(short, long, value_enum, default_value = "ml-workspace")]
        kind: KindArg,

        /// Analyze from recorded control-plane responses
        #[arg(long, value_name = "DIR")]
        offline: Option<PathBuf>,

        /// Write a Markdown comparison report to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show information about netpilot
    Info,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    /// Managed AI hub
    #[value(name = "ai-hub")]
    AiHub,
    /// Traditional ML workspace
    #[value(name = "ml-workspace")]
    MlWorkspace,
}

impl From<KindArg> for WorkspaceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::AiHub => WorkspaceKind::AiHub,
            KindArg::MlWorkspace => WorkspaceKind::MlWorkspace,
        }
    }
}

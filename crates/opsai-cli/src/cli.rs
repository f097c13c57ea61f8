use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "opsai", version, about = "Turns natural-language operations requests into tool invocations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a natural-language operations request through the orchestrator
    Query {
        /// The request text, e.g. "restart the web service on port 8080"
        text: String,

        /// Plan and narrate the run without executing any side-effecting command
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or update the persisted configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },

    /// List, inspect, and run diagnostic runbook templates
    Template {
        #[command(subcommand)]
        cmd: TemplateCommands,
    },

    /// Inspect and clear the cached analyze-command templates
    Cache {
        #[command(subcommand)]
        cmd: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current configuration document
    Show,

    /// Update the LLM endpoint configuration
    SetLlm {
        #[arg(long)]
        model: String,

        #[arg(long)]
        base_url: Option<String>,

        #[arg(long)]
        api_key: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List the known runbook templates
    List,

    /// Show one runbook template's steps
    Show { name: String },

    /// Run a runbook template's steps through the orchestrator, substituting
    /// `{placeholder}` tokens from the supplied context
    Run {
        name: String,

        #[arg(long)]
        dry_run: bool,

        /// A JSON object of placeholder substitutions, e.g. '{"service":"web"}'
        #[arg(long)]
        context: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List every cached target type
    List,

    /// Show the cached command template for one target type
    Show { target_type: String },

    /// Clear one target type's cache entry, or the whole cache
    Clear {
        target_type: Option<String>,

        /// Skip the confirmation prompt when clearing the whole cache
        #[arg(long)]
        force: bool,
    },
}

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod context;
mod host;

use cli::{CacheCommands, Cli, Commands, ConfigCommands, TemplateCommands};
use context::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init().ok();

    let cli = Cli::parse();
    let exit_code = run(cli).await?;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Query { text, dry_run } => {
            let ctx = AppContext::load()?;
            commands::query::handle_query(&ctx, &text, dry_run).await
        }

        Commands::Config { cmd } => {
            let mut ctx = AppContext::load()?;
            match cmd {
                ConfigCommands::Show => commands::config::handle_show(&ctx)?,
                ConfigCommands::SetLlm { model, base_url, api_key } => {
                    commands::config::handle_set_llm(&mut ctx, &model, base_url.as_deref(), api_key.as_deref())?
                }
            }
            Ok(0)
        }

        Commands::Template { cmd } => {
            let ctx = AppContext::load()?;
            match cmd {
                TemplateCommands::List => {
                    commands::template::handle_list(&ctx)?;
                    Ok(0)
                }
                TemplateCommands::Show { name } => {
                    commands::template::handle_show(&ctx, &name)?;
                    Ok(0)
                }
                TemplateCommands::Run { name, dry_run, context } => commands::template::handle_run(&ctx, &name, dry_run, context.as_deref()).await,
            }
        }

        Commands::Cache { cmd } => {
            let ctx = AppContext::load()?;
            match cmd {
                CacheCommands::List => commands::cache::handle_list(&ctx)?,
                CacheCommands::Show { target_type } => commands::cache::handle_show(&ctx, &target_type)?,
                CacheCommands::Clear { target_type, force } => commands::cache::handle_clear(&ctx, target_type.as_deref(), force)?,
            }
            Ok(0)
        }
    }
}

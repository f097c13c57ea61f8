use std::io::{self, Write};

use anyhow::Result;
use opsai_cache::AnalyzeTemplateCache;

use crate::context::AppContext;

fn cache(ctx: &AppContext) -> AnalyzeTemplateCache {
    AnalyzeTemplateCache::new(ctx.paths.analyze_templates_path())
}

pub fn handle_list(ctx: &AppContext) -> Result<()> {
    let templates = cache(ctx).list_all()?;
    if templates.is_empty() {
        println!("No cached templates.");
        return Ok(());
    }

    let mut target_types: Vec<&String> = templates.keys().collect();
    target_types.sort();
    for target_type in target_types {
        let template = &templates[target_type];
        println!("{target_type}: {} command(s), {} hit(s)", template.commands.len(), template.hit_count);
    }
    Ok(())
}

pub fn handle_show(ctx: &AppContext, target_type: &str) -> Result<()> {
    match cache(ctx).get(target_type)? {
        Some(template) => {
            println!("{target_type} ({} hit(s), cached {})", template.hit_count, template.created_at);
            for command in &template.commands {
                println!("  {command}");
            }
        }
        None => println!("No cached template for target type '{target_type}'."),
    }
    Ok(())
}

pub fn handle_clear(ctx: &AppContext, target_type: Option<&str>, force: bool) -> Result<()> {
    if target_type.is_none() && !force {
        print!("Clear the entire analyze-template cache? [y/N]: ");
        io::stdout().flush().ok();
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        if !matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let removed = cache(ctx).clear(target_type)?;
    println!("Removed {removed} cached template(s).");
    Ok(())
}

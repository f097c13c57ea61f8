use anyhow::Result;

use crate::context::AppContext;

pub fn handle_show(ctx: &AppContext) -> Result<()> {
    let json = serde_json::to_string_pretty(&ctx.config)?;
    println!("{json}");
    Ok(())
}

pub fn handle_set_llm(ctx: &mut AppContext, model: &str, base_url: Option<&str>, api_key: Option<&str>) -> Result<()> {
    ctx.config.llm.model = model.to_string();
    if let Some(base_url) = base_url {
        ctx.config.llm.base_url = base_url.to_string();
    }
    if let Some(api_key) = api_key {
        ctx.config.llm.api_key = api_key.to_string();
    }

    ctx.config.save(&ctx.paths)?;
    println!("Updated LLM configuration: model={}, base_url={}", ctx.config.llm.model, ctx.config.llm.base_url);
    Ok(())
}

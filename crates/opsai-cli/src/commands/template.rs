use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use opsai_orchestrator::{DiagnosticRunbook, RunbookLoader};
use opsai_policy::Mode;
use serde_json::Value;

use crate::context::AppContext;

fn runbook_dir(ctx: &AppContext) -> PathBuf {
    ctx.paths.base_dir().join("runbooks")
}

fn substitute(template: &str, context: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in context {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

fn parse_context(context: Option<&str>) -> Result<HashMap<String, String>> {
    let Some(raw) = context else {
        return Ok(HashMap::new());
    };
    let value: Value = serde_json::from_str(raw).map_err(|error| anyhow!("--context must be a JSON object: {error}"))?;
    let Value::Object(map) = value else {
        return Err(anyhow!("--context must be a JSON object"));
    };

    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, rendered)
        })
        .collect())
}

pub fn handle_list(ctx: &AppContext) -> Result<()> {
    let loader = RunbookLoader::new(runbook_dir(ctx));
    let mut runbooks = loader.list_all();
    runbooks.sort_by(|a, b| a.name.cmp(&b.name));

    if runbooks.is_empty() {
        println!("No templates found.");
        return Ok(());
    }

    for runbook in runbooks {
        println!("{} - {}", runbook.name, runbook.description);
    }
    Ok(())
}

pub fn handle_show(ctx: &AppContext, name: &str) -> Result<()> {
    let loader = RunbookLoader::new(runbook_dir(ctx));
    let runbook = loader.get(name).ok_or_else(|| anyhow!("no such template: {name}"))?;
    print_runbook(&runbook);
    Ok(())
}

fn print_runbook(runbook: &DiagnosticRunbook) {
    println!("{}", runbook.name);
    println!("{}", runbook.description);
    if !runbook.keywords.is_empty() {
        println!("keywords: {}", runbook.keywords.join(", "));
    }
    for (index, step) in runbook.steps.iter().enumerate() {
        println!("  {}. [{}] {}", index + 1, step.risk, step.description);
        println!("     {}", step.command);
    }
}

pub async fn handle_run(ctx: &AppContext, name: &str, dry_run: bool, context: Option<&str>) -> Result<i32> {
    let loader = RunbookLoader::new(runbook_dir(ctx));
    let runbook = loader.get(name).ok_or_else(|| anyhow!("no such template: {name}"))?;
    let substitutions = parse_context(context)?;

    if runbook.steps.is_empty() {
        println!("Template {name} has no steps.");
        return Ok(0);
    }

    for (index, step) in runbook.steps.iter().enumerate() {
        let instruction_text = substitute(&step.description, &substitutions);
        println!("[{}/{}] {instruction_text}", index + 1, runbook.steps.len());

        let orchestrator = ctx.build_orchestrator(Mode::Cli)?;
        let outcome = orchestrator.run(&instruction_text, dry_run).await?;
        println!("{}", outcome.summary);

        if !outcome.completed {
            println!("Stopping: step {} did not complete.", index + 1);
            return Ok(1);
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_replaces_known_placeholders() {
        let mut context = HashMap::new();
        context.insert("service".to_string(), "web".to_string());
        context.insert("port".to_string(), "8080".to_string());

        let rendered = substitute("restart {service} and check port {port}", &context);
        assert_eq!(rendered, "restart web and check port 8080");
    }

    #[test]
    fn test_substitute_leaves_unknown_placeholders() {
        let context = HashMap::new();
        let rendered = substitute("restart {service}", &context);
        assert_eq!(rendered, "restart {service}");
    }

    #[test]
    fn test_parse_context_none_is_empty() {
        let parsed = parse_context(None).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_parse_context_stringifies_non_string_values() {
        let parsed = parse_context(Some(r#"{"service":"web","retries":3}"#)).unwrap();
        assert_eq!(parsed.get("service").unwrap(), "web");
        assert_eq!(parsed.get("retries").unwrap(), "3");
    }

    #[test]
    fn test_parse_context_rejects_non_object() {
        assert!(parse_context(Some("[1,2,3]")).is_err());
    }
}

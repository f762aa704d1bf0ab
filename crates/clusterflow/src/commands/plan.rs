use crate::target::Target;
use colored::Colorize;

pub async fn handle(target: &Target, json: bool) -> anyhow::Result<()> {
    let program = super::build(target).await?;
    let plan = program.plan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    for (idx, action) in plan.actions.iter().enumerate() {
        let provider = action
            .provider
            .as_deref()
            .map(|p| format!(" via {}", p))
            .unwrap_or_default();
        println!(
            "{:>3}. {} {} ({}){}",
            idx + 1,
            action.action_type,
            action.id.cyan(),
            action.resource_type,
            provider
        );
        if !action.depends_on.is_empty() {
            println!("       after: {}", action.depends_on.join(", "));
        }
    }

    if !plan.exports.is_empty() {
        println!();
        println!("Outputs: {}", plan.exports.join(", "));
    }

    println!();
    println!("{} {}", "Plan:".bold(), plan.summary());
    Ok(())
}

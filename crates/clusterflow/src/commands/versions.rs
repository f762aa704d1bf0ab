use crate::target::Target;
use colored::Colorize;

pub async fn handle(target: &Target) -> anyhow::Result<()> {
    let config = target.load()?;
    let versions = super::resolve(&config).await?;

    if versions.is_empty() {
        println!("{}", "No snap versions needed for this cluster".yellow());
        return Ok(());
    }

    for (channel, version) in versions.iter() {
        println!("{} {}", channel.cyan(), version);
    }
    Ok(())
}

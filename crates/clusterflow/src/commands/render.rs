use crate::target::Target;
use colored::Colorize;
use std::path::Path;

pub async fn handle(target: &Target, out: &Path) -> anyhow::Result<()> {
    let program = super::build(target).await?;
    let yaml = program.to_yaml()?;

    if out == Path::new("-") {
        print!("{}", yaml);
        return Ok(());
    }

    std::fs::write(out, yaml)?;
    println!(
        "{} {} ({} resources)",
        "✓ Wrote".green().bold(),
        out.display(),
        program.resources().len()
    );
    Ok(())
}

//! Which configuration and stack a command works on

use anyhow::Context;
use clusterflow_config::{ComponentConfig, StackContext};
use std::path::PathBuf;

pub struct Target {
    pub config: Option<PathBuf>,
    pub stack: Option<String>,
    pub project: String,
    pub from_stack_file: bool,
}

impl Target {
    /// The selected stack. Never guessed from the working directory.
    pub fn stack(&self) -> anyhow::Result<StackContext> {
        let stack = self
            .stack
            .as_deref()
            .context("no stack selected: pass --stack or set CLUSTERFLOW_STACK")?;
        Ok(StackContext::new(self.project.clone(), stack))
    }

    pub fn load(&self) -> anyhow::Result<ComponentConfig> {
        if self.from_stack_file {
            let ctx = self.stack()?;
            let path = match &self.config {
                Some(path) => path.clone(),
                None => clusterflow_config::stack_file_path(&ctx.stack)?,
            };
            return Ok(clusterflow_config::load_from_stack_file(&path, &ctx)?);
        }

        let path = match &self.config {
            Some(path) => path.clone(),
            None => clusterflow_config::find_config_file()?,
        };
        Ok(clusterflow_config::load_from_path(&path)?)
    }
}

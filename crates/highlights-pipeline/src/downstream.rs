//! Downstream media stages
//!
//! Video processing and media conversion live outside this crate. Each is
//! run as an external command and counts as successful only when the
//! command exits with status 0.

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::stage::Stage;

pub const VIDEO_STAGE: &str = "process_one_video";

pub const MEDIACONVERT_STAGE: &str = "mediaconvert_process";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStage {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandStage {
    /// Build from a whitespace-separated command line; `None` if it is blank
    pub fn parse(name: impl Into<String>, command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;

        Some(Self {
            name: name.into(),
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl Stage for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(stage = %self.name, program = %self.program))]
    async fn run(&self) -> anyhow::Result<()> {
        debug!(args = ?self.args, "Starting downstream command");

        let status = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to start '{}'", self.program))?;

        if !status.success() {
            bail!("'{}' exited with {}", self.program, status);
        }

        Ok(())
    }
}

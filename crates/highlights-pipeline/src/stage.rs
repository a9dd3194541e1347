//! Sequential stage execution with bounded retry
//!
//! Each stage gets a fixed number of attempts with a fixed delay between
//! them. Consecutive stages are separated by a stabilisation wait. The first
//! stage to use up its attempts stops the whole run.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::RetryConfig;
use crate::error::StageError;

/// A retryable unit of the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first; zero is treated as one
    pub max_attempts: u32,
    pub delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.retry_count,
            delay: config.retry_delay(),
        }
    }
}

pub struct StageRunner {
    policy: RetryPolicy,
    stage_wait: Duration,
}

impl StageRunner {
    pub fn new(policy: RetryPolicy, stage_wait: Duration) -> Self {
        Self { policy, stage_wait }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(RetryPolicy::from(config), config.stage_wait())
    }

    /// Run one stage with the runner's policy. Returns the attempts used.
    pub async fn run_stage(&self, stage: &dyn Stage) -> Result<u32, StageError> {
        self.run_stage_with(stage, self.policy).await
    }

    /// Run one stage until it succeeds or `policy.max_attempts` is reached.
    #[instrument(skip_all, fields(stage = %stage.name()))]
    pub async fn run_stage_with(
        &self,
        stage: &dyn Stage,
        policy: RetryPolicy,
    ) -> Result<u32, StageError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            info!(attempt, max_attempts, "Running stage");

            match stage.run().await {
                Ok(()) => {
                    info!(attempt, "Stage completed");
                    return Ok(attempt);
                },
                Err(err) if attempt < max_attempts => {
                    warn!(
                        attempt,
                        error = %format!("{:#}", err),
                        retry_in_secs = policy.delay.as_secs_f64(),
                        "Stage failed, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                    attempt += 1;
                },
                Err(err) => {
                    return Err(StageError {
                        stage: stage.name().to_string(),
                        attempts: attempt,
                        source: err,
                    });
                },
            }
        }
    }

    /// Run `stages` in order with the runner's policy, waiting between them.
    pub async fn run_all(&self, stages: &[Box<dyn Stage>]) -> Result<(), StageError> {
        for (index, stage) in stages.iter().enumerate() {
            if index > 0 {
                info!(
                    wait_secs = self.stage_wait.as_secs_f64(),
                    next = %stage.name(),
                    "Waiting for resources to stabilize"
                );
                tokio::time::sleep(self.stage_wait).await;
            }

            self.run_stage(stage.as_ref()).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Fails `failures` times, then succeeds; records call order in `log`
    pub(crate) struct ScriptedStage {
        name: String,
        failures: u32,
        pub(crate) attempts: AtomicU32,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedStage {
        pub(crate) fn new(name: &str, failures: u32, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                failures,
                attempts: AtomicU32::new(0),
                log,
            }
        }
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self) -> anyhow::Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.log.lock().unwrap().push(self.name.clone());
            if attempt <= self.failures {
                anyhow::bail!("{} attempt {} failed", self.name, attempt);
            }
            Ok(())
        }
    }

    fn policy(max_attempts: u32, delay_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_secs(delay_secs),
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_stage_attempted_k_times() {
        let runner = StageRunner::new(policy(4, 30), Duration::from_secs(60));
        let stage = ScriptedStage::new("fetch", u32::MAX, log());

        let start = Instant::now();
        let err = runner.run_stage(&stage).await.unwrap_err();

        assert_eq!(stage.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(err.attempts, 4);
        assert_eq!(err.stage, "fetch");
        assert!(err.to_string().contains("fetch attempt 4 failed"));
        // three delays between four attempts
        assert_eq!(start.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_recovers_within_budget() {
        let runner = StageRunner::new(policy(3, 10), Duration::ZERO);
        let stage = ScriptedStage::new("fetch", 2, log());

        let start = Instant::now();
        let attempts = runner.run_stage(&stage).await.unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try_has_no_delay() {
        let runner = StageRunner::new(policy(3, 10), Duration::ZERO);
        let stage = ScriptedStage::new("fetch", 0, log());

        let start = Instant::now();
        assert_eq!(runner.run_stage(&stage).await.unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_runs_once() {
        let runner = StageRunner::new(policy(0, 10), Duration::ZERO);
        let stage = ScriptedStage::new("fetch", u32::MAX, log());

        let err = runner.run_stage(&stage).await.unwrap_err();
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stage_with_overrides_policy() {
        let runner = StageRunner::new(policy(5, 30), Duration::ZERO);
        let stage = ScriptedStage::new("video", u32::MAX, log());

        let start = Instant::now();
        let err = runner.run_stage_with(&stage, policy(2, 7)).await.unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(stage.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_waits_between_stages() {
        let calls = log();
        let runner = StageRunner::new(policy(2, 5), Duration::from_secs(60));
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ScriptedStage::new("fetch", 1, calls.clone())),
            Box::new(ScriptedStage::new("video", 0, calls.clone())),
            Box::new(ScriptedStage::new("convert", 0, calls.clone())),
        ];

        let start = Instant::now();
        runner.run_all(&stages).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["fetch", "fetch", "video", "convert"]);
        // one retry delay plus two stabilisation waits
        assert_eq!(start.elapsed(), Duration::from_secs(5 + 60 + 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_halts_on_exhausted_stage() {
        let calls = log();
        let runner = StageRunner::new(policy(2, 1), Duration::from_secs(1));
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ScriptedStage::new("fetch", 0, calls.clone())),
            Box::new(ScriptedStage::new("video", u32::MAX, calls.clone())),
            Box::new(ScriptedStage::new("convert", 0, calls.clone())),
        ];

        let err = runner.run_all(&stages).await.unwrap_err();

        assert_eq!(err.stage, "video");
        assert_eq!(*calls.lock().unwrap(), vec!["fetch", "video", "video"]);
    }
}

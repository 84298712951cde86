//! ActivityRunner - bounded, retried, liveness-checked activity invocation
//!
//! Every attempt:
//! - gets a fresh heartbeat channel and fails if the activity stays silent
//!   longer than its heartbeat timeout
//! - fails if it runs past its start-to-close timeout
//!
//! Transient failures are retried with exponential backoff until the attempt
//! budget is spent. Non-retryable failures stop immediately.

use backoff::future::retry_notify;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{parse_output, ActivityOutput, Config, ProcessContext, RetryConfig};
use crate::domain::ports::{invoke, ActivityError, ActivityKind, Heartbeat, RepairActivities};

/// Exponential retry policy for activity attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    /// Total attempts, first try included.
    pub max_attempts: u32,
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(self.backoff_coefficient)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            backoff_coefficient: config.backoff_coefficient,
            max_attempts: config.max_attempts.max(1),
        }
    }
}

/// Limits applied to one activity invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    pub start_to_close: Duration,
    pub heartbeat_timeout: Duration,
    pub retry: RetryPolicy,
}

/// Runner-wide limits, resolved per activity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySettings {
    pub start_to_close: Duration,
    pub heartbeat_timeout: Duration,
    /// Used by plan and notify.
    pub planning_heartbeat_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ActivitySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            start_to_close: Duration::from_secs(config.activities.start_to_close_secs),
            heartbeat_timeout: Duration::from_secs(config.activities.heartbeat_timeout_secs),
            planning_heartbeat_timeout: Duration::from_secs(
                config.activities.planning_heartbeat_timeout_secs,
            ),
            retry: RetryPolicy::from(&config.retry),
        }
    }

    pub fn options_for(&self, kind: ActivityKind) -> ActivityOptions {
        let heartbeat_timeout = match kind {
            ActivityKind::Plan | ActivityKind::Notify => self.planning_heartbeat_timeout,
            _ => self.heartbeat_timeout,
        };
        ActivityOptions {
            start_to_close: self.start_to_close,
            heartbeat_timeout,
            retry: self.retry.clone(),
        }
    }
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Invokes activities on behalf of one orchestrator instance.
pub struct ActivityRunner {
    activities: Arc<dyn RepairActivities>,
    settings: ActivitySettings,
}

impl ActivityRunner {
    pub fn new(activities: Arc<dyn RepairActivities>, settings: ActivitySettings) -> Self {
        Self {
            activities,
            settings,
        }
    }

    pub fn settings(&self) -> &ActivitySettings {
        &self.settings
    }

    /// Run an activity to completion, retrying transient failures.
    pub async fn run(&self, kind: ActivityKind, context: ProcessContext) -> DomainResult<Value> {
        let options = self.settings.options_for(kind);
        let attempts = AtomicU32::new(0);

        let operation = || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let context = context.clone();
            let options = &options;
            async move {
                debug!(activity = %kind, attempt, "Starting activity attempt");
                match self.attempt(kind, context, options).await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_retryable() && attempt < options.retry.max_attempts => {
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        };

        let notify = |err: ActivityError, delay: Duration| {
            warn!(
                activity = %kind,
                attempt = attempts.load(Ordering::SeqCst),
                error = %err,
                "Activity attempt failed, retrying in {:?}",
                delay
            );
        };

        retry_notify(options.retry.backoff(), operation, notify)
            .await
            .map_err(|err| {
                let attempts = attempts.load(Ordering::SeqCst);
                warn!(activity = %kind, attempts, error = %err, "Activity failed");
                DomainError::ActivityExecution {
                    activity: kind,
                    attempts,
                    message: err.to_string(),
                }
            })
    }

    /// Run an activity and parse its response into `T`.
    ///
    /// Returns the typed result together with the raw value, which is what
    /// gets stored in the context.
    pub async fn run_typed<T: ActivityOutput>(
        &self,
        context: ProcessContext,
    ) -> DomainResult<(T, Value)> {
        let raw = self.run(T::KIND, context).await?;
        let typed = parse_output::<T>(raw.clone())?;
        Ok((typed, raw))
    }

    /// A single attempt bounded by start-to-close and heartbeat timeouts.
    async fn attempt(
        &self,
        kind: ActivityKind,
        context: ProcessContext,
        options: &ActivityOptions,
    ) -> Result<Value, ActivityError> {
        let (heartbeat, mut beats) = Heartbeat::channel();
        // Held so the channel never closes while the attempt is running.
        let _monitor = heartbeat.clone();

        let work = invoke(self.activities.as_ref(), kind, context, heartbeat);
        tokio::pin!(work);
        let deadline = sleep(options.start_to_close);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                result = &mut work => return result,

                () = &mut deadline => {
                    return Err(ActivityError::transient(format!(
                        "{kind} exceeded start-to-close timeout of {:?}",
                        options.start_to_close
                    )));
                }

                beat = timeout(options.heartbeat_timeout, beats.recv()) => match beat {
                    Ok(Some(details)) => trace!(activity = %kind, details = %details, "Heartbeat"),
                    Ok(None) => {}
                    Err(_) => {
                        return Err(ActivityError::transient(format!(
                            "{kind} sent no heartbeat within {:?}",
                            options.heartbeat_timeout
                        )));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::activities::{ScriptedActivities, ScriptedResponse};
    use crate::domain::models::DetectionResult;
    use serde_json::json;

    fn fast_settings(max_attempts: u32) -> ActivitySettings {
        ActivitySettings {
            start_to_close: Duration::from_secs(300),
            heartbeat_timeout: Duration::from_secs(20),
            planning_heartbeat_timeout: Duration::from_secs(30),
            retry: RetryPolicy {
                initial_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(30),
                backoff_coefficient: 2.0,
                max_attempts,
            },
        }
    }

    #[test]
    fn test_options_per_kind() {
        let settings = ActivitySettings::default();
        assert_eq!(
            settings.options_for(ActivityKind::Plan).heartbeat_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(
            settings.options_for(ActivityKind::Detect).heartbeat_timeout,
            Duration::from_secs(20)
        );
        assert_eq!(settings.retry.max_attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let activities = Arc::new(ScriptedActivities::new());
        activities.push(ActivityKind::Detect, ScriptedResponse::transient("llm timeout"));
        activities.push(ActivityKind::Detect, ScriptedResponse::transient("llm timeout"));
        activities.push(ActivityKind::Detect, ScriptedResponse::ok(json!({"confidence_score": 0.7})));

        let runner = ActivityRunner::new(activities.clone(), fast_settings(5));
        let (detection, _raw) = runner
            .run_typed::<DetectionResult>(ProcessContext::new())
            .await
            .unwrap();

        assert!((detection.confidence_score - 0.7).abs() < f64::EPSILON);
        assert_eq!(activities.call_count(ActivityKind::Detect), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let activities = Arc::new(ScriptedActivities::new());
        for _ in 0..5 {
            activities.push(ActivityKind::Analyze, ScriptedResponse::transient("503"));
        }

        let runner = ActivityRunner::new(activities.clone(), fast_settings(3));
        let err = runner.run(ActivityKind::Analyze, ProcessContext::new()).await.unwrap_err();

        match err {
            DomainError::ActivityExecution { activity, attempts, .. } => {
                assert_eq!(activity, ActivityKind::Analyze);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(activities.call_count(ActivityKind::Analyze), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_stops_immediately() {
        let activities = Arc::new(ScriptedActivities::new());
        activities.push(ActivityKind::Plan, ScriptedResponse::non_retryable("unknown tool"));

        let runner = ActivityRunner::new(activities.clone(), fast_settings(5));
        let err = runner.run(ActivityKind::Plan, ProcessContext::new()).await.unwrap_err();

        assert!(matches!(err, DomainError::ActivityExecution { attempts: 1, .. }));
        assert_eq!(activities.call_count(ActivityKind::Plan), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_attempt_fails_heartbeat_and_retries() {
        let activities = Arc::new(ScriptedActivities::new());
        activities.push(ActivityKind::Report, ScriptedResponse::Stall);
        activities.push(ActivityKind::Report, ScriptedResponse::ok(json!({"report_summary": "ok"})));

        let runner = ActivityRunner::new(activities.clone(), fast_settings(5));
        let value = runner.run(ActivityKind::Report, ProcessContext::new()).await.unwrap();

        assert_eq!(value["report_summary"], "ok");
        assert_eq!(activities.call_count(ActivityKind::Report), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_response_is_not_retried() {
        let activities = Arc::new(ScriptedActivities::new());
        activities.push(ActivityKind::Detect, ScriptedResponse::ok(json!({"notes": "no score"})));

        let runner = ActivityRunner::new(activities.clone(), fast_settings(5));
        let err = runner
            .run_typed::<DetectionResult>(ProcessContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::MalformedResponse { .. }));
        assert_eq!(activities.call_count(ActivityKind::Detect), 1);
    }
}

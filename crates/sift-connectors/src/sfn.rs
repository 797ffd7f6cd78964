//! Step Functions adapter — the durable loop that drives the lister.
//!
//! The loop itself is external: it re-invokes the listing step with the
//! returned state until `done`. This client only starts executions and
//! reports their state; any driver that can persist the state document could
//! stand in.

use aws_sdk_sfn::error::DisplayErrorContext;
use sift_core::ListBatchState;
use tracing::warn;

use crate::error::ConnectorError;

/// Coarse execution state of the durable listing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
}

impl ExecutionState {
    /// The protocol status string for this state.
    pub fn as_status_str(self) -> &'static str {
        match self {
            ExecutionState::Running => "RUNNING",
            ExecutionState::Succeeded => "SUCCEEDED",
            ExecutionState::Failed => "FAILED",
            ExecutionState::TimedOut => "TIMED_OUT",
            ExecutionState::Aborted => "ABORTED",
        }
    }

    /// Map the protocol status string; unrecognized states are treated as
    /// "no execution found" by the caller.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "RUNNING" => Some(ExecutionState::Running),
            "SUCCEEDED" => Some(ExecutionState::Succeeded),
            "FAILED" => Some(ExecutionState::Failed),
            "TIMED_OUT" => Some(ExecutionState::TimedOut),
            "ABORTED" => Some(ExecutionState::Aborted),
            _ => None,
        }
    }
}

/// Client for the external durable-loop executor.
#[derive(Clone)]
pub struct StepFunctionsClient {
    client: aws_sdk_sfn::Client,
}

impl StepFunctionsClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_sfn::Client::new(config),
        }
    }

    /// Start the listing loop for a scan. The execution name is derived from
    /// the job id so a retried start is rejected rather than duplicated.
    /// Returns the execution identifier.
    pub async fn start_listing(
        &self,
        state_machine_arn: &str,
        state: &ListBatchState,
    ) -> Result<String, ConnectorError> {
        let input = serde_json::to_string(state)
            .map_err(|e| ConnectorError::Execution(format!("serialize input: {}", e)))?;

        let fut: std::pin::Pin<Box<dyn std::future::Future<Output = _> + Send + '_>> =
            Box::pin(
                self.client
                    .start_execution()
                    .state_machine_arn(state_machine_arn)
                    .name(format!("scan-{}", state.job_id))
                    .input(input)
                    .send(),
            );
        let response = fut.await.map_err(|e| {
            ConnectorError::Execution(format!("start: {}", DisplayErrorContext(&e)))
        })?;

        Ok(response.execution_arn().to_string())
    }

    /// Look up an execution's state. Lookup failures (expired history,
    /// missing execution) degrade to `None`; the status aggregator then
    /// reasons from the counters alone.
    pub async fn describe(&self, execution_arn: &str) -> Option<ExecutionState> {
        match self
            .client
            .describe_execution()
            .execution_arn(execution_arn)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_str().to_string();
                let state = ExecutionState::parse(&status);
                if state.is_none() {
                    warn!("Unrecognized execution status '{}'", status);
                }
                state
            }
            Err(e) => {
                warn!(
                    "Error describing execution {}: {}",
                    execution_arn,
                    DisplayErrorContext(&e)
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_states() {
        assert_eq!(ExecutionState::parse("RUNNING"), Some(ExecutionState::Running));
        assert_eq!(
            ExecutionState::parse("SUCCEEDED"),
            Some(ExecutionState::Succeeded)
        );
        assert_eq!(ExecutionState::parse("FAILED"), Some(ExecutionState::Failed));
        assert_eq!(
            ExecutionState::parse("TIMED_OUT"),
            Some(ExecutionState::TimedOut)
        );
        assert_eq!(ExecutionState::parse("ABORTED"), Some(ExecutionState::Aborted));
    }

    #[test]
    fn unknown_state_is_none() {
        assert_eq!(ExecutionState::parse("PENDING_REDRIVE"), None);
        assert_eq!(ExecutionState::parse(""), None);
    }
}

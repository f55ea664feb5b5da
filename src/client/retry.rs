//! Retry policy hook
//!
//! The pipeline does not back off on its own. Each logical request gets a fresh policy
//! from the [`RetryPolicyFactory`]; the policy sees the request before every send and
//! decides whether a failure is worth another attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::{QueryError, QueryResult};
use crate::model::QueryRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    DoNotRetry,
    RetryAfter(Duration),
}

pub trait RetryPolicy: Send {
    /// Called before every attempt, including the first
    fn on_before_send_request(&mut self, request: &mut QueryRequest);

    fn should_retry(&mut self, error: &QueryError) -> RetryDecision;
}

/// Creates one policy per logical request
pub trait RetryPolicyFactory: Send + Sync {
    fn create(&self) -> Box<dyn RetryPolicy>;
}

impl<F> RetryPolicyFactory for F
where
    F: Fn() -> Box<dyn RetryPolicy> + Send + Sync,
{
    fn create(&self) -> Box<dyn RetryPolicy> {
        self()
    }
}

/// Never retries
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn on_before_send_request(&mut self, _request: &mut QueryRequest) {}

    fn should_retry(&mut self, _error: &QueryError) -> RetryDecision {
        RetryDecision::DoNotRetry
    }
}

/// Factory for [`NoRetryPolicy`]
pub fn no_retry() -> Box<dyn RetryPolicy> {
    Box::new(NoRetryPolicy)
}

/// Runs `send` under `policy` until it succeeds or the policy gives up
///
/// `retries` is reset to -1 and incremented before every attempt, so on return it holds
/// the number of retries rather than the number of attempts.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &mut dyn RetryPolicy,
    request: &mut QueryRequest,
    retries: &mut i64,
    mut send: F,
) -> QueryResult<T>
where
    F: FnMut(QueryRequest) -> Fut,
    Fut: Future<Output = QueryResult<T>>,
{
    *retries = -1;
    loop {
        *retries += 1;
        policy.on_before_send_request(request);
        match send(request.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => match policy.should_retry(&e) {
                RetryDecision::DoNotRetry => return Err(e),
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(
                        activity_id = %request.activity_id,
                        retries = *retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{status, ServiceError};
    use crate::model::SqlQuerySpec;

    /// Retries throttled requests up to a fixed number of times
    struct ThrottleRetry {
        remaining: u32,
        sends: u32,
    }

    impl RetryPolicy for ThrottleRetry {
        fn on_before_send_request(&mut self, request: &mut QueryRequest) {
            self.sends += 1;
            request
                .headers
                .insert("x-test-attempt".into(), self.sends.to_string());
        }

        fn should_retry(&mut self, error: &QueryError) -> RetryDecision {
            if error.status_code() == status::TOO_MANY_REQUESTS && self.remaining > 0 {
                self.remaining -= 1;
                RetryDecision::RetryAfter(Duration::from_millis(1))
            } else {
                RetryDecision::DoNotRetry
            }
        }
    }

    fn request() -> QueryRequest {
        QueryRequest::new("dbs/db/colls/c", SqlQuerySpec::new("SELECT * FROM c"))
    }

    fn throttled() -> QueryError {
        ServiceError::new(status::TOO_MANY_REQUESTS, 3200, "throttled").into()
    }

    #[tokio::test]
    async fn test_success_first_attempt_has_zero_retries() {
        let mut policy = NoRetryPolicy;
        let mut request = request();
        let mut retries = 42;

        let result =
            execute_with_retry(&mut policy, &mut request, &mut retries, |_| async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(retries, 0);
    }

    #[tokio::test]
    async fn test_retries_counted_and_hook_called_each_attempt() {
        let mut policy = ThrottleRetry {
            remaining: 2,
            sends: 0,
        };
        let mut request = request();
        let mut retries = 0;
        let mut attempts = 0;

        let result = execute_with_retry(&mut policy, &mut request, &mut retries, |req| {
            attempts += 1;
            let ok = attempts == 3;
            async move {
                if ok {
                    Ok(req.header("x-test-attempt").map(str::to_string))
                } else {
                    Err(throttled())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap().as_deref(), Some("3"));
        assert_eq!(retries, 2);
        assert_eq!(policy.sends, 3);
    }

    #[tokio::test]
    async fn test_policy_gives_up() {
        let mut policy = NoRetryPolicy;
        let mut request = request();
        let mut retries = 0;

        let result: QueryResult<()> =
            execute_with_retry(&mut policy, &mut request, &mut retries, |_| async {
                Err(throttled())
            })
            .await;
        assert_eq!(result.unwrap_err().status_code(), status::TOO_MANY_REQUESTS);
        assert_eq!(retries, 0);
    }

    #[test]
    fn test_closure_factory() {
        let factory: &dyn RetryPolicyFactory = &no_retry;
        let mut policy = factory.create();
        assert_eq!(
            policy.should_retry(&throttled()),
            RetryDecision::DoNotRetry
        );
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::normalize::{normalize_all, OrganizationRecord};
use crate::overpass::{FetchFailure, OverpassTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after the n-th fully failed pass is `backoff_step * n`.
    pub backoff_step: Duration,
    /// Pause after a 504 before the next endpoint is tried.
    pub overload_pause: Duration,
}

impl RetryPolicy {
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_secs(30),
            overload_pause: Duration::from_secs(10),
        }
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    Succeeded { attempt: u32, endpoint: String },
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct CategoryFetch {
    pub records: Vec<OrganizationRecord>,
    pub status: FetchStatus,
}

impl CategoryFetch {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, FetchStatus::Succeeded { .. })
    }
}

#[derive(Clone)]
pub struct FailoverController {
    transport: Arc<dyn OverpassTransport>,
    sleeper: Arc<dyn Sleeper>,
    endpoints: Vec<String>,
    policy: RetryPolicy,
}

impl FailoverController {
    pub fn new(
        transport: Arc<dyn OverpassTransport>,
        sleeper: Arc<dyn Sleeper>,
        endpoints: Vec<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            sleeper,
            endpoints,
            policy,
        }
    }

    /// Runs `query` against the endpoints in priority order until one answers.
    /// Never fails: running out of attempts yields no records and an
    /// `Exhausted` status.
    pub async fn fetch_category(&self, city: &str, category: &str, query: &str) -> CategoryFetch {
        if self.endpoints.is_empty() {
            warn!(category, "no overpass endpoints configured");
            return CategoryFetch {
                records: Vec::new(),
                status: FetchStatus::Exhausted { attempts: 0 },
            };
        }

        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            for endpoint in &self.endpoints {
                info!(attempt, category, city, endpoint = %endpoint, "querying overpass");
                match self.transport.execute(endpoint, query).await {
                    Ok(elements) => {
                        let records = normalize_all(&elements, category, city);
                        info!(
                            category,
                            elements = elements.len(),
                            named = records.len(),
                            "overpass query succeeded"
                        );
                        return CategoryFetch {
                            records,
                            status: FetchStatus::Succeeded {
                                attempt,
                                endpoint: endpoint.clone(),
                            },
                        };
                    }
                    Err(FetchFailure::ServerOverloaded) => {
                        warn!(
                            attempt,
                            category,
                            endpoint = %endpoint,
                            "server overloaded; pausing before next endpoint"
                        );
                        self.pause(self.policy.overload_pause).await;
                    }
                    Err(err) => {
                        warn!(attempt, category, endpoint = %endpoint, error = %err, "overpass query failed");
                    }
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff_delay(attempt);
                warn!(
                    attempt,
                    category, "all endpoints failed; retrying after {:?}", delay
                );
                self.pause(delay).await;
            }
        }

        warn!(
            category,
            attempts = max_attempts,
            "giving up on category after exhausting attempts"
        );
        CategoryFetch {
            records: Vec::new(),
            status: FetchStatus::Exhausted {
                attempts: max_attempts,
            },
        }
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::normalize::RawElement;

    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) calls: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub(crate) fn calls(&self) -> Vec<Duration> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.calls.lock().push(duration);
        }
    }

    /// Fails the first `failures` calls, then answers every call with `elements`.
    pub(crate) struct ScriptedTransport {
        failures: Mutex<Vec<FetchFailure>>,
        elements: Vec<RawElement>,
        pub(crate) endpoints_called: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(mut failures: Vec<FetchFailure>, elements: Vec<RawElement>) -> Self {
            failures.reverse();
            Self {
                failures: Mutex::new(failures),
                elements,
                endpoints_called: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing_forever() -> Self {
            Self::new(vec![FetchFailure::ConnectionError("refused".into()); 1000], Vec::new())
        }
    }

    #[async_trait]
    impl OverpassTransport for ScriptedTransport {
        async fn execute(
            &self,
            endpoint: &str,
            _query: &str,
        ) -> Result<Vec<RawElement>, FetchFailure> {
            self.endpoints_called.lock().push(endpoint.to_string());
            match self.failures.lock().pop() {
                Some(failure) => Err(failure),
                None => Ok(self.elements.clone()),
            }
        }
    }

    pub(crate) fn named_point(name: &str, lat: f64, lon: f64) -> RawElement {
        RawElement {
            kind: Some("node".into()),
            id: Some(1),
            tags: HashMap::from([("name".to_string(), name.to_string())]),
            lat: Some(lat),
            lon: Some(lon),
            center: None,
        }
    }

    fn endpoints() -> Vec<String> {
        vec!["primary".into(), "mirror-1".into(), "mirror-2".into()]
    }

    fn controller(
        transport: Arc<ScriptedTransport>,
        sleeper: Arc<RecordingSleeper>,
    ) -> FailoverController {
        FailoverController::new(transport, sleeper, endpoints(), RetryPolicy::default())
    }

    fn connection_failures(count: usize) -> Vec<FetchFailure> {
        vec![FetchFailure::ConnectionError("refused".into()); count]
    }

    #[tokio::test]
    async fn first_endpoint_success_needs_no_sleep() {
        let transport = Arc::new(ScriptedTransport::new(
            Vec::new(),
            vec![named_point("Кафе", 1.0, 2.0)],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());

        let fetch = controller(transport.clone(), sleeper.clone())
            .fetch_category("Тест", "кафе", "q")
            .await;

        assert_eq!(fetch.records.len(), 1);
        assert_eq!(
            fetch.status,
            FetchStatus::Succeeded {
                attempt: 1,
                endpoint: "primary".into()
            }
        );
        assert!(sleeper.calls().is_empty());
        assert_eq!(transport.endpoints_called.lock().len(), 1);
    }

    #[tokio::test]
    async fn fails_over_to_mirror_within_attempt() {
        let transport = Arc::new(ScriptedTransport::new(
            connection_failures(2),
            vec![named_point("Кафе", 1.0, 2.0)],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());

        let fetch = controller(transport.clone(), sleeper.clone())
            .fetch_category("Тест", "кафе", "q")
            .await;

        assert_eq!(
            fetch.status,
            FetchStatus::Succeeded {
                attempt: 1,
                endpoint: "mirror-2".into()
            }
        );
        assert!(sleeper.calls().is_empty());
        assert_eq!(
            *transport.endpoints_called.lock(),
            vec!["primary", "mirror-1", "mirror-2"]
        );
    }

    #[tokio::test]
    async fn backs_off_linearly_between_failed_passes() {
        // Two full passes fail, the third attempt succeeds on the primary.
        let transport = Arc::new(ScriptedTransport::new(
            connection_failures(6),
            vec![named_point("Кафе", 1.0, 2.0)],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());

        let fetch = controller(transport.clone(), sleeper.clone())
            .fetch_category("Тест", "кафе", "q")
            .await;

        assert!(fetch.succeeded());
        assert_eq!(
            fetch.status,
            FetchStatus::Succeeded {
                attempt: 3,
                endpoint: "primary".into()
            }
        );
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_secs(30), Duration::from_secs(60)]
        );
        assert_eq!(transport.endpoints_called.lock().len(), 7);
    }

    #[tokio::test]
    async fn exhaustion_returns_empty_result() {
        let transport = Arc::new(ScriptedTransport::failing_forever());
        let sleeper = Arc::new(RecordingSleeper::default());

        let fetch = controller(transport.clone(), sleeper.clone())
            .fetch_category("Тест", "кафе", "q")
            .await;

        assert!(fetch.records.is_empty());
        assert_eq!(fetch.status, FetchStatus::Exhausted { attempts: 5 });
        assert_eq!(
            sleeper.calls(),
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(90),
                Duration::from_secs(120),
            ]
        );
        assert_eq!(transport.endpoints_called.lock().len(), 15);
    }

    #[tokio::test]
    async fn pauses_after_overloaded_server() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![
                FetchFailure::ServerOverloaded,
                FetchFailure::HttpError { status: 500 },
            ],
            vec![named_point("Кафе", 1.0, 2.0)],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());

        let fetch = controller(transport, sleeper.clone())
            .fetch_category("Тест", "кафе", "q")
            .await;

        assert!(fetch.succeeded());
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(10)]);
    }

    #[test]
    fn huge_backoff_step_saturates() {
        let policy = RetryPolicy {
            backoff_step: Duration::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(2), Duration::MAX);
        assert_eq!(RetryPolicy::default().backoff_delay(4), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn empty_endpoint_list_exhausts_without_sleeping() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new(), Vec::new()));
        let sleeper = Arc::new(RecordingSleeper::default());
        let controller =
            FailoverController::new(transport, sleeper.clone(), Vec::new(), RetryPolicy::default());

        let fetch = controller.fetch_category("Тест", "кафе", "q").await;
        assert_eq!(fetch.status, FetchStatus::Exhausted { attempts: 0 });
        assert!(sleeper.calls().is_empty());
    }
}

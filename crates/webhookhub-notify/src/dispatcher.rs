use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use webhookhub_types::models::{ChannelPrefs, NotificationRecord};

use crate::{Backend, NotifyError};
use crate::backends::{DiscordBackend, PushoverBackend, SmtpBackend};
use crate::config::NotifyConfig;

/// Upper bound on a single backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Backends always listed in the status table, configured or not.
pub const KNOWN_BACKENDS: [&str; 3] = ["pushover", "discord", "smtp"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Delivered,
    Skipped,
    Failed { kind: &'static str, error: String },
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendOutcome {
    pub backend: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub record_id: i64,
    pub outcomes: Vec<BackendOutcome>,
}

impl DispatchReport {
    pub fn outcome(&self, backend: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.backend == backend)
            .map(|o| &o.outcome)
    }

    /// Value for the record's `pushover_sent` column: `None` when Pushover
    /// is not registered or skipped the record.
    pub fn pushover_sent(&self) -> Option<bool> {
        match self.outcome("pushover")? {
            Outcome::Delivered => Some(true),
            Outcome::Skipped => None,
            Outcome::Failed { .. } | Outcome::TimedOut => Some(false),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendStatus {
    pub configured: bool,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_outcome: Option<Outcome>,
}

/// Cheap to clone; every clone shares the backends and the status table.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    backends: Vec<Arc<dyn Backend>>,
    timeout: Duration,
    status: RwLock<HashMap<&'static str, BackendStatus>>,
}

impl Dispatcher {
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        Self::with_timeout(backends, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(backends: Vec<Arc<dyn Backend>>, timeout: Duration) -> Self {
        let status = backends
            .iter()
            .map(|b| {
                (
                    b.name(),
                    BackendStatus {
                        configured: true,
                        ..Default::default()
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(DispatcherInner {
                backends,
                timeout,
                status: RwLock::new(status),
            }),
        }
    }

    /// Registers one backend per complete config section. An SMTP section
    /// whose transport cannot be built is logged and left disabled.
    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut backends: Vec<Arc<dyn Backend>> = Vec::new();

        if let Some(cfg) = &config.pushover {
            backends.push(Arc::new(PushoverBackend::new(cfg.clone())));
        }
        if let Some(cfg) = &config.discord {
            backends.push(Arc::new(DiscordBackend::new(cfg.clone())));
        }
        if let Some(cfg) = &config.smtp {
            match SmtpBackend::new(cfg.clone()) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => warn!("SMTP backend disabled: {}", e),
            }
        }

        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        info!("Notification backends enabled: {:?}", names);

        Self::new(backends)
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.inner.backends.iter().map(|b| b.name()).collect()
    }

    /// Runs every backend on its own task and waits for all of them.
    /// Failures, timeouts and panics are logged and reported, never returned.
    pub async fn dispatch(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> DispatchReport {
        let timeout = self.inner.timeout;
        let shared = Arc::new((record.clone(), prefs.clone()));

        let attempts = self.inner.backends.iter().map(|backend| {
            let name = backend.name();
            let backend = backend.clone();
            let shared = shared.clone();
            let task = tokio::spawn(async move {
                let (record, prefs) = &*shared;
                attempt(backend.as_ref(), record, prefs, timeout).await
            });
            async move {
                task.await.unwrap_or_else(|e| {
                    let err = NotifyError::unavailable(name, format!("backend task failed: {e}"));
                    warn!("Webhook {} not delivered: {}", record.id, err);
                    BackendOutcome {
                        backend: name,
                        outcome: Outcome::Failed {
                            kind: err.kind(),
                            error: err.to_string(),
                        },
                        elapsed_ms: 0,
                    }
                })
            }
        });
        let outcomes = join_all(attempts).await;

        self.record_status(&outcomes).await;

        DispatchReport {
            record_id: record.id,
            outcomes,
        }
    }

    /// Status of the known backends plus any other registered ones.
    pub async fn status(&self) -> BTreeMap<&'static str, BackendStatus> {
        let table = self.inner.status.read().await;
        let mut report: BTreeMap<&'static str, BackendStatus> = KNOWN_BACKENDS
            .iter()
            .map(|name| (*name, BackendStatus::default()))
            .collect();
        for (name, status) in table.iter() {
            report.insert(*name, status.clone());
        }
        report
    }

    async fn record_status(&self, outcomes: &[BackendOutcome]) {
        let now = Utc::now();
        let mut table = self.inner.status.write().await;
        for o in outcomes {
            if o.outcome == Outcome::Skipped {
                continue;
            }
            let entry = table.entry(o.backend).or_insert_with(|| BackendStatus {
                configured: true,
                ..Default::default()
            });
            entry.last_attempt = Some(now);
            if o.outcome == Outcome::Delivered {
                entry.last_success = Some(now);
            }
            entry.last_outcome = Some(o.outcome.clone());
        }
    }
}

async fn attempt(
    backend: &dyn Backend,
    record: &NotificationRecord,
    prefs: &ChannelPrefs,
    timeout: Duration,
) -> BackendOutcome {
    let name = backend.name();
    if !backend.accepts(record, prefs) {
        debug!("{} skipped webhook {}", name, record.id);
        return BackendOutcome {
            backend: name,
            outcome: Outcome::Skipped,
            elapsed_ms: 0,
        };
    }

    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, backend.send(record, prefs)).await {
        Ok(Ok(())) => {
            info!("{} delivered webhook {}", name, record.id);
            Outcome::Delivered
        }
        Ok(Err(e)) => {
            warn!("Webhook {} not delivered: {}", record.id, e);
            Outcome::Failed {
                kind: e.kind(),
                error: e.to_string(),
            }
        }
        Err(_) => {
            warn!("{} timed out after {:?} on webhook {}", name, timeout, record.id);
            Outcome::TimedOut
        }
    };

    BackendOutcome {
        backend: name,
        outcome,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use webhookhub_types::models::Priority;

    use super::*;
    use crate::fixtures::{prefs, record};

    enum Behavior {
        Deliver,
        Reject,
        Hang,
        Panic,
    }

    struct FakeBackend {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
        push_only: bool,
    }

    impl FakeBackend {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
                push_only: false,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn dyn_backend(backend: &Arc<FakeBackend>) -> Arc<dyn Backend> {
        backend.clone()
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn accepts(&self, record: &NotificationRecord, _prefs: &ChannelPrefs) -> bool {
            !self.push_only || record.push_enabled
        }

        async fn send(&self, _record: &NotificationRecord, _prefs: &ChannelPrefs) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Deliver => Ok(()),
                Behavior::Reject => Err(NotifyError::rejected(self.name, "status=400")),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
                Behavior::Panic => panic!("{} exploded", self.name),
            }
        }
    }

    #[tokio::test]
    async fn every_backend_is_called_once() {
        let a = FakeBackend::new("pushover", Behavior::Deliver);
        let b = FakeBackend::new("discord", Behavior::Deliver);
        let dispatcher = Dispatcher::new(vec![dyn_backend(&a), dyn_backend(&b)]);

        let report = dispatcher.dispatch(&record(Priority::Normal), &prefs()).await;

        assert_eq!(report.record_id, 42);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcome("pushover"), Some(&Outcome::Delivered));
        assert_eq!(report.outcome("discord"), Some(&Outcome::Delivered));
        assert_eq!(report.pushover_sent(), Some(true));
        assert_eq!((a.calls(), b.calls()), (1, 1));
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_the_others() {
        let failing = FakeBackend::new("discord", Behavior::Reject);
        let healthy = FakeBackend::new("smtp", Behavior::Deliver);
        let dispatcher = Dispatcher::new(vec![dyn_backend(&failing), dyn_backend(&healthy)]);

        let report = dispatcher.dispatch(&record(Priority::High), &prefs()).await;

        assert!(matches!(
            report.outcome("discord"),
            Some(Outcome::Failed { kind: "rejected", .. })
        ));
        assert_eq!(report.outcome("smtp"), Some(&Outcome::Delivered));
        assert_eq!(report.pushover_sent(), None);
    }

    #[tokio::test]
    async fn a_panicking_backend_is_reported_as_failed() {
        let broken = FakeBackend::new("discord", Behavior::Panic);
        let healthy = FakeBackend::new("pushover", Behavior::Deliver);
        let dispatcher = Dispatcher::new(vec![dyn_backend(&broken), dyn_backend(&healthy)]);

        let report = dispatcher.dispatch(&record(Priority::Normal), &prefs()).await;

        assert!(matches!(
            report.outcome("discord"),
            Some(Outcome::Failed { kind: "unavailable", .. })
        ));
        assert_eq!(report.outcome("pushover"), Some(&Outcome::Delivered));
        assert_eq!(report.pushover_sent(), Some(true));
        assert_eq!(healthy.calls(), 1);

        let status = dispatcher.status().await;
        assert!(matches!(status["discord"].last_outcome, Some(Outcome::Failed { .. })));
    }

    #[tokio::test]
    async fn slow_backends_time_out() {
        let slow = FakeBackend::new("pushover", Behavior::Hang);
        let fast = FakeBackend::new("discord", Behavior::Deliver);
        let dispatcher =
            Dispatcher::with_timeout(vec![dyn_backend(&slow), dyn_backend(&fast)], Duration::from_millis(50));

        let report = dispatcher.dispatch(&record(Priority::Critical), &prefs()).await;

        assert_eq!(report.outcome("pushover"), Some(&Outcome::TimedOut));
        assert_eq!(report.outcome("discord"), Some(&Outcome::Delivered));
        assert_eq!(report.pushover_sent(), Some(false));
    }

    #[tokio::test]
    async fn declined_records_are_skipped_without_a_call() {
        let push = Arc::new(FakeBackend {
            name: "pushover",
            behavior: Behavior::Deliver,
            calls: AtomicUsize::new(0),
            push_only: true,
        });
        let dispatcher = Dispatcher::new(vec![dyn_backend(&push)]);

        let mut rec = record(Priority::Normal);
        rec.push_enabled = false;
        let report = dispatcher.dispatch(&rec, &prefs()).await;

        assert_eq!(report.outcome("pushover"), Some(&Outcome::Skipped));
        assert_eq!(report.pushover_sent(), None);
        assert_eq!(push.calls(), 0);
    }

    #[tokio::test]
    async fn status_tracks_last_outcome() {
        let discord = FakeBackend::new("discord", Behavior::Reject);
        let dispatcher = Dispatcher::new(vec![dyn_backend(&discord)]);

        let before = dispatcher.status().await;
        assert!(before["discord"].configured);
        assert!(!before["pushover"].configured);
        assert!(before["discord"].last_attempt.is_none());

        dispatcher.dispatch(&record(Priority::Low), &prefs()).await;

        let after = dispatcher.status().await;
        let discord = &after["discord"];
        assert!(discord.last_attempt.is_some());
        assert!(discord.last_success.is_none());
        assert!(matches!(discord.last_outcome, Some(Outcome::Failed { .. })));
        assert_eq!(after.len(), KNOWN_BACKENDS.len());
    }

    #[tokio::test]
    async fn no_backends_means_empty_report() {
        let dispatcher = Dispatcher::from_config(&NotifyConfig::default());
        assert!(dispatcher.backend_names().is_empty());

        let report = dispatcher.dispatch(&record(Priority::Normal), &prefs()).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.pushover_sent(), None);
    }

    #[test]
    fn outcome_serializes_with_backend_name() {
        let outcome = BackendOutcome {
            backend: "smtp",
            outcome: Outcome::Failed {
                kind: "unavailable",
                error: "smtp: backend unavailable: refused".into(),
            },
            elapsed_ms: 3,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["backend"], "smtp");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["kind"], "unavailable");
    }
}

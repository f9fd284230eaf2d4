//! Session pool: fans a batch of virtual users out over one shared transport.
//!
//! The [`SessionPool`] owns the transport every session draws connections from and
//! launches one Tokio task per session. Tasks are spawned up front, so all sessions
//! of a batch are in flight at once and the shared transport's caps are the only
//! thing that paces them.
//!
//! # High-level flow
//! 1. Derive a fresh [`SessionIdentity`] for each index of the batch.
//! 2. Spawn one task per identity. Each task runs a [`Workflow`] to a terminal state
//!    and reports a verdict plus its own elapsed time.
//! 3. Collect task results in completion order through a `FuturesUnordered`,
//!    converting each into a [`SessionOutcome`].
//! 4. Once every task has finished, stamp the batch's start/end time.
//!
//! # Failure isolation
//! A session can end badly in two ways: its workflow returns a [`SessionError`]
//! (login refused, no work, a rejected submission, a transport error), or its task
//! panics. Both become a failed outcome for that session only. Other tasks are never
//! cancelled, and the batch always yields exactly one outcome per launched session.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::{stream::FuturesUnordered, StreamExt};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    config::{ConfigError, Endpoints, IdentityPlan, SimulationConfig},
    diagnostics::{Event, Sink},
    session::{SessionError, SessionIdentity, Step, Workflow},
    transport::{HttpTransport, Transport},
    Error,
};

/// Category of a failed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Authenticate,
    Discover,
    Submit,
    Confirm,
    /// The session task panicked before producing a verdict.
    Panicked,
}

impl From<Step> for FailureKind {
    fn from(step: Step) -> Self {
        match step {
            Step::Authenticate => FailureKind::Authenticate,
            Step::Discover => FailureKind::Discover,
            Step::Submit => FailureKind::Submit,
            Step::Confirm => FailureKind::Confirm,
        }
    }
}

/// Terminal verdict of one session. Produced once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub index: usize,
    pub username: String,
    pub elapsed: Duration,
    /// `None` when the session completed.
    pub failure: Option<FailureKind>,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Everything a finished batch produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// One entry per launched session, in completion order.
    pub outcomes: Vec<SessionOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall-clock time of the whole batch.
    pub elapsed: Duration,
}

/// Runs batches of sessions against one shared transport.
pub struct SessionPool<T: Transport + 'static> {
    transport: Arc<T>,
    endpoints: Arc<Endpoints>,
    identities: IdentityPlan,
    sink: Arc<dyn Sink>,
}

impl SessionPool<HttpTransport> {
    /// Build the shared HTTP transport described by `config`.
    pub fn connect(config: &SimulationConfig, sink: Arc<dyn Sink>) -> Result<Self, Error> {
        config.validate()?;
        let transport =
            HttpTransport::new(&config.base_url, &config.limits, config.verbose, sink.clone())?;
        Ok(Self::new(
            transport,
            config.endpoints.clone(),
            config.identities.clone(),
            sink,
        ))
    }
}

impl<T: Transport + 'static> SessionPool<T> {
    pub fn new(
        transport: T,
        endpoints: Endpoints,
        identities: IdentityPlan,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            transport: Arc::new(transport),
            endpoints: Arc::new(endpoints),
            identities,
            sink,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run `sessions` concurrent sessions and wait for all of them.
    ///
    /// Fails before launching anything when the batch's identities cannot all be
    /// derived.
    pub async fn run(&self, sessions: usize) -> Result<RunResult, ConfigError> {
        self.identities.check(sessions)?;
        tracing::info!("Launching {sessions} concurrent sessions...");
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut pending: FuturesUnordered<_> = (0..sessions)
            .filter_map(|n| self.identities.identity(n))
            .map(|identity| self.launch(identity))
            .collect();

        let mut outcomes = Vec::with_capacity(sessions);
        while let Some(outcome) = pending.next().await {
            outcomes.push(outcome);
        }

        let elapsed = clock.elapsed();
        tracing::info!(
            "All {} sessions finished in {:.2}s",
            outcomes.len(),
            elapsed.as_secs_f64()
        );
        Ok(RunResult {
            outcomes,
            started_at,
            finished_at: Utc::now(),
            elapsed,
        })
    }

    /// Run a single session to completion.
    pub async fn run_session(&self, identity: SessionIdentity) -> SessionOutcome {
        self.launch(identity).await
    }

    /// Spawn the session task immediately; the returned future only collects it.
    fn launch(
        &self,
        identity: SessionIdentity,
    ) -> impl std::future::Future<Output = SessionOutcome> + Send + 'static {
        let index = identity.index;
        let username = identity.username.clone();
        let launched = Instant::now();

        let handle = {
            let transport = self.transport.clone();
            let endpoints = self.endpoints.clone();
            let sink = self.sink.clone();
            tokio::spawn(async move {
                sink.record(Event::SessionStarted {
                    username: identity.username.clone(),
                });
                let start = Instant::now();
                let mut rng = StdRng::from_entropy();
                let verdict = Workflow::new(&*transport, &endpoints, &*sink)
                    .run(&identity, &mut rng)
                    .await
                    .map(|_| ());
                (verdict, start.elapsed())
            })
        };

        let sink = self.sink.clone();
        async move {
            let (failure, elapsed) = match handle.await {
                Ok((verdict, elapsed)) => {
                    let failure = verdict
                        .err()
                        .map(|e: SessionError| FailureKind::from(e.step()));
                    (failure, elapsed)
                }
                Err(e) => {
                    // a panicking session must not take the batch down with it
                    sink.record(Event::SessionFaulted {
                        username: username.clone(),
                        error: e.to_string(),
                    });
                    (Some(FailureKind::Panicked), launched.elapsed())
                }
            };

            sink.record(Event::SessionFinished {
                username: username.clone(),
                success: failure.is_none(),
                elapsed,
            });
            SessionOutcome {
                index,
                username,
                elapsed,
                failure,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::RecordingSink,
        testing::{Fault, FakeBackend},
    };

    fn pool(backend: FakeBackend) -> (SessionPool<FakeBackend>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let pool = SessionPool::new(
            backend,
            Endpoints::default(),
            IdentityPlan::default(),
            sink.clone(),
        );
        (pool, sink)
    }

    #[tokio::test]
    async fn yields_one_outcome_per_session() {
        for k in [0, 1, 7, 50] {
            let (pool, _) = pool(FakeBackend::new(2));
            let result = pool.run(k).await.unwrap();

            assert_eq!(result.outcomes.len(), k);
            assert!(result.outcomes.iter().all(SessionOutcome::is_success));
            assert!(result.finished_at >= result.started_at);

            let mut indices: Vec<_> = result.outcomes.iter().map(|o| o.index).collect();
            indices.sort_unstable();
            assert_eq!(indices, (1..=k).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn one_failing_submission_leaves_other_sessions_untouched() {
        let backend = FakeBackend::new(3).with_fault("test0002", Fault::SubmitStatus { item: 1 });
        let (pool, _) = pool(backend);
        let result = pool.run(3).await.unwrap();

        let mut verdicts: Vec<_> = result
            .outcomes
            .iter()
            .map(|o| (o.username.as_str(), o.failure))
            .collect();
        verdicts.sort();
        assert_eq!(
            verdicts,
            [
                ("test0001", None),
                ("test0002", Some(FailureKind::Submit)),
                ("test0003", None),
            ]
        );

        // the healthy sessions still did all their work
        for user in ["test0001", "test0003"] {
            assert_eq!(pool.transport().calls_for(user).len(), 2 + 3 * 2);
        }
        assert_eq!(pool.transport().calls_for("test0002").len(), 2 + 3);
    }

    #[tokio::test]
    async fn rejected_logins_make_no_further_calls() {
        let mut backend = FakeBackend::new(2);
        for n in 1..=5 {
            backend = backend.with_fault(&format!("test{n:04}"), Fault::LoginStatus(503));
        }
        let (pool, _) = pool(backend);
        let result = pool.run(5).await.unwrap();

        assert_eq!(result.outcomes.len(), 5);
        assert!(result
            .outcomes
            .iter()
            .all(|o| o.failure == Some(FailureKind::Authenticate)));
        let calls = pool.transport().calls();
        assert_eq!(calls.len(), 5);
        assert!(calls.iter().all(|c| c.step == Step::Authenticate));
    }

    #[tokio::test]
    async fn panicking_session_becomes_a_failed_outcome() {
        let backend = FakeBackend::new(2).with_fault("test0003", Fault::Panic(Step::Submit));
        let (pool, sink) = pool(backend);
        let result = pool.run(4).await.unwrap();

        assert_eq!(result.outcomes.len(), 4);
        let panicked: Vec<_> = result
            .outcomes
            .iter()
            .filter(|o| o.failure == Some(FailureKind::Panicked))
            .map(|o| o.username.as_str())
            .collect();
        assert_eq!(panicked, ["test0003"]);
        assert_eq!(result.outcomes.iter().filter(|o| o.is_success()).count(), 3);

        assert!(sink
            .events_for("test0003")
            .iter()
            .any(|e| matches!(e, Event::SessionFaulted { .. })));
    }

    #[tokio::test]
    async fn sessions_run_concurrently() {
        let latency = Duration::from_millis(40);
        let k = 20;
        let (pool, _) = pool(FakeBackend::new(1).with_latency(latency));
        let result = pool.run(k).await.unwrap();

        let serial: Duration = result.outcomes.iter().map(|o| o.elapsed).sum();
        // four calls per session
        assert!(result.outcomes.iter().all(|o| o.elapsed >= latency * 4));
        assert!(
            result.elapsed * 4 < serial,
            "batch took {:?}, sessions summed to {:?}",
            result.elapsed,
            serial
        );
    }

    #[tokio::test]
    async fn every_session_logs_start_and_finish() {
        let backend = FakeBackend::new(1).with_fault("test0002", Fault::NoTask);
        let (pool, sink) = pool(backend);
        pool.run(2).await.unwrap();

        for (user, success) in [("test0001", true), ("test0002", false)] {
            let events = sink.events_for(user);
            assert!(matches!(
                events.first(),
                Some(Event::SessionStarted { .. })
            ));
            match events.last() {
                Some(Event::SessionFinished { success: s, .. }) => assert_eq!(*s, success),
                other => panic!("unexpected last event for {user}: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn overflowing_identities_launch_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let pool = SessionPool::new(
            FakeBackend::new(1),
            Endpoints::default(),
            IdentityPlan::builder().first_index(usize::MAX).build(),
            sink.clone(),
        );

        assert!(matches!(
            pool.run(2).await,
            Err(ConfigError::IndexOverflow { sessions: 2, .. })
        ));
        assert!(pool.transport().calls().is_empty());
        assert!(sink.events().is_empty());

        let result = pool.run(1).await.unwrap();
        assert_eq!(result.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn single_session_run() {
        let (pool, _) = pool(FakeBackend::new(2));
        let outcome = pool
            .run_session(SessionIdentity::new(18, "test0018", "123456"))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.index, 18);
        assert_eq!(pool.transport().calls_for("test0018").len(), 6);
    }
}

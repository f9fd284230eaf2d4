//! The per-user state machine.
//!
//! ```text
//! Unauthenticated ─authenticate─▶ Authenticated ─discover─▶ WorkDiscovered
//!        │                              │                        │
//!        ▼                              ▼                        ▼
//!      Failed ◀──────────────────── Failed ◀──── for each item: submit ─▶ confirm
//!                                                                │
//!                                                                ▼
//!                                                            Completed
//! ```
//!
//! Every transition is gated on the previous one succeeding. The first failing
//! step ends the session: there are no retries, failed items are not skipped and
//! items already submitted are left as they are on the backend.

use std::fmt;

use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{
    answers::{generate_answers, EmptyGroup},
    context::{Authenticated, SessionContext},
    identity::SessionIdentity,
    model::{Answer, Batch, Confirmation, Credentials, Discovery, LoginResult, Submission, WorkItem},
};
use crate::{
    config::Endpoints,
    diagnostics::{Event, Sink},
    transport::{Exchange, Reply, Transport, TransportError},
};

/// The network step a session was performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    Authenticate,
    Discover,
    Submit,
    Confirm,
}

impl Step {
    pub fn label(self) -> &'static str {
        match self {
            Step::Authenticate => "login",
            Step::Discover => "discover",
            Step::Submit => "submit",
            Step::Confirm => "confirm",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a session ended in the failed state.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("login rejected (status {status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("no work discovered (status {status}): {reason}")]
    Discovery { status: u16, reason: String },

    #[error("submission of item {item} rejected (status {status})")]
    Submission { item: String, status: u16 },

    #[error("confirmation of item {item} failed (status {status})")]
    Confirmation { item: String, status: u16 },

    #[error(transparent)]
    EmptyGroup(#[from] EmptyGroup),

    #[error("{step} payload could not be processed: {source}")]
    Malformed {
        step: Step,
        #[source]
        source: serde_json::Error,
    },

    #[error("{step} failed: {source}")]
    Transport {
        step: Step,
        #[source]
        source: TransportError,
    },
}

impl SessionError {
    /// The step the session was on when it failed.
    pub fn step(&self) -> Step {
        match self {
            SessionError::Authentication { .. } => Step::Authenticate,
            SessionError::Discovery { .. } => Step::Discover,
            SessionError::Submission { .. } | SessionError::EmptyGroup(_) => Step::Submit,
            SessionError::Confirmation { .. } => Step::Confirm,
            SessionError::Malformed { step, .. } | SessionError::Transport { step, .. } => *step,
        }
    }
}

/// One virtual user's run through the backend, borrowing the shared transport.
pub struct Workflow<'a, T: Transport + ?Sized> {
    transport: &'a T,
    endpoints: &'a Endpoints,
    sink: &'a dyn Sink,
}

impl<'a, T: Transport + ?Sized> Workflow<'a, T> {
    pub fn new(transport: &'a T, endpoints: &'a Endpoints, sink: &'a dyn Sink) -> Self {
        Self {
            transport,
            endpoints,
            sink,
        }
    }

    /// Drive the session to a terminal state.
    ///
    /// `Ok` is the completed state and carries the context the session finished
    /// with. `Err` is the failed state and names the step that failed.
    pub async fn run<R: Rng + Send + ?Sized>(
        &self,
        identity: &SessionIdentity,
        rng: &mut R,
    ) -> Result<SessionContext, SessionError> {
        let user = identity.username.as_str();

        let auth = self.authenticate(identity).await;
        let auth = self.observe(user, Step::Authenticate, auth, |a| {
            format!("user id {}", a.user_id)
        })?;

        let ctx = self.discover(auth).await;
        let ctx = self.observe(user, Step::Discover, ctx, |c| {
            format!("batch {}, {} item(s)", c.batch_id(), c.items().len())
        })?;

        let total = ctx.items().len();
        for (i, item) in ctx.items().iter().enumerate() {
            let progress = |_: &()| format!("[{}/{}] {}", i + 1, total, item.name);

            let submitted = match generate_answers(item, rng) {
                Ok(answers) => self.submit(&ctx, item, &answers).await,
                Err(e) => Err(e.into()),
            };
            self.observe(user, Step::Submit, submitted, progress)?;

            let confirmed = self.confirm(&ctx, item).await;
            self.observe(user, Step::Confirm, confirmed, progress)?;
        }

        Ok(ctx)
    }

    /// Submit credentials and capture the user identifier and bearer token.
    pub async fn authenticate(
        &self,
        identity: &SessionIdentity,
    ) -> Result<Authenticated, SessionError> {
        let step = Step::Authenticate;
        let body = encode(
            step,
            &Credentials {
                account: &identity.username,
                password: &identity.password,
            },
        )?;
        let reply = self
            .send(step, Exchange::post(step.label(), &self.endpoints.login, body))
            .await?;

        if !reply.is_success() {
            return Err(SessionError::Authentication {
                status: reply.status,
                message: "non-success status".into(),
            });
        }
        if !reply.success_flag() {
            let message = reply
                .body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(SessionError::Authentication {
                status: reply.status,
                message,
            });
        }

        let result: LoginResult =
            decode(step, reply.body.get("result").cloned().unwrap_or(Value::Null))?;
        Ok(Authenticated::new(result.student_info.id, result.token))
    }

    /// Ask for assigned work and keep the first batch offered.
    pub async fn discover(&self, auth: Authenticated) -> Result<SessionContext, SessionError> {
        let step = Step::Discover;
        let path = format!("{}/{}", self.endpoints.discover, auth.user_id);
        let exchange = Exchange::get(step.label(), path)
            .bearer(&auth.token)
            .map_err(|source| SessionError::Transport { step, source })?;
        let reply = self.send(step, exchange).await?;

        let status = reply.status;
        let no_work = |reason: &str| SessionError::Discovery {
            status,
            reason: reason.into(),
        };
        if !reply.is_success() {
            return Err(no_work("non-success status"));
        }

        let discovery: Discovery = decode(step, reply.body)?;
        if !discovery.success || !discovery.is_have_task {
            return Err(no_work("no task assigned"));
        }
        // Later batches are ignored, and never decoded.
        let batch = discovery
            .result
            .and_then(|batches| batches.into_iter().next())
            .ok_or_else(|| no_work("empty batch list"))?;
        let batch: Batch = decode(step, batch)?;

        Ok(auth.assign(batch))
    }

    /// Submit the answers for one item.
    pub async fn submit(
        &self,
        ctx: &SessionContext,
        item: &WorkItem,
        answers: &[Answer],
    ) -> Result<(), SessionError> {
        let step = Step::Submit;
        let body = encode(
            step,
            &Submission::new(
                ctx.batch_id(),
                ctx.creator_id(),
                &item.id,
                ctx.user_id(),
                answers,
            ),
        )?;
        let exchange = Exchange::post(step.label(), &self.endpoints.submit, body)
            .header(CONTENT_TYPE, "application/json")
            .and_then(|e| e.bearer(ctx.token()))
            .map_err(|source| SessionError::Transport { step, source })?;
        let reply = self.send(step, exchange).await?;

        if reply.is_success() && reply.success_flag() {
            Ok(())
        } else {
            Err(SessionError::Submission {
                item: item.id.clone(),
                status: reply.status,
            })
        }
    }

    /// Fetch the report for an item that was just submitted.
    pub async fn confirm(&self, ctx: &SessionContext, item: &WorkItem) -> Result<(), SessionError> {
        let step = Step::Confirm;
        let body = encode(
            step,
            &Confirmation {
                task_id: ctx.batch_id(),
                stu_id: ctx.user_id(),
                scale_id: &item.id,
            },
        )?;
        let exchange = Exchange::post(step.label(), &self.endpoints.confirm, body)
            .bearer(ctx.token())
            .map_err(|source| SessionError::Transport { step, source })?;
        let reply = self.send(step, exchange).await?;

        if reply.is_success() {
            Ok(())
        } else {
            Err(SessionError::Confirmation {
                item: item.id.clone(),
                status: reply.status,
            })
        }
    }

    async fn send(&self, step: Step, exchange: Exchange) -> Result<Reply, SessionError> {
        self.transport
            .request(exchange)
            .await
            .map_err(|source| SessionError::Transport { step, source })
    }

    fn observe<V>(
        &self,
        username: &str,
        step: Step,
        result: Result<V, SessionError>,
        detail: impl FnOnce(&V) -> String,
    ) -> Result<V, SessionError> {
        let event = match &result {
            Ok(v) => Event::StepSucceeded {
                username: username.to_string(),
                step,
                detail: detail(v),
            },
            Err(e) => Event::StepFailed {
                username: username.to_string(),
                step,
                reason: e.to_string(),
            },
        };
        self.sink.record(event);
        result
    }
}

fn encode<S: Serialize>(step: Step, payload: &S) -> Result<Value, SessionError> {
    serde_json::to_value(payload).map_err(|source| SessionError::Malformed { step, source })
}

fn decode<D: DeserializeOwned>(step: Step, value: Value) -> Result<D, SessionError> {
    serde_json::from_value(value).map_err(|source| SessionError::Malformed { step, source })
}

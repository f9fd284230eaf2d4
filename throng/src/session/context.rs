use super::model::{Batch, WorkItem};

/// Identity established by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub user_id: String,
    pub token: String,
}

impl Authenticated {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }

    /// Attach the discovered batch, producing the context the item loop runs on.
    pub fn assign(self, batch: Batch) -> SessionContext {
        SessionContext {
            auth: self,
            batch_id: batch.evaluation.id,
            creator_id: batch.evaluation.create_by,
            items: batch.items,
        }
    }
}

/// State of one session once its work has been discovered.
///
/// Owned by exactly one workflow and never shared; each step consumes or borrows
/// it, nothing mutates it in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    auth: Authenticated,
    batch_id: String,
    creator_id: String,
    items: Vec<WorkItem>,
}

impl SessionContext {
    pub fn user_id(&self) -> &str {
        &self.auth.user_id
    }

    pub fn token(&self) -> &str {
        &self.auth.token
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn creator_id(&self) -> &str {
        &self.creator_id
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }
}

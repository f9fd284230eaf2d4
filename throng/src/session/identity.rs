use crate::config::IdentityPlan;

/// Synthetic credentials of one virtual user. Lives for one workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub index: usize,
    pub username: String,
    pub password: String,
}

impl SessionIdentity {
    pub fn new(index: usize, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            index,
            username: username.into(),
            password: password.into(),
        }
    }
}

impl IdentityPlan {
    /// Credentials for the `n`-th session of a batch (zero based), or `None` when
    /// the index would overflow.
    ///
    /// The username is the prefix followed by the zero-padded index, so the first
    /// session of the default plan logs in as `test0001`.
    pub fn identity(&self, n: usize) -> Option<SessionIdentity> {
        let index = self.first_index.checked_add(n)?;
        Some(SessionIdentity::new(
            index,
            format!("{}{index:04}", self.prefix),
            self.password.clone(),
        ))
    }
}

//! One virtual user's workflow: identity, wire model, context and the state machine.
pub mod answers;
pub mod context;
pub mod identity;
pub mod model;
pub mod workflow;

pub use answers::{generate_answers, EmptyGroup};
pub use context::{Authenticated, SessionContext};
pub use identity::SessionIdentity;
pub use model::{Answer, AnswerOption, Batch, OptionGroup, WorkItem};
pub use workflow::{SessionError, Step, Workflow};

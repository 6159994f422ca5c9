pub mod activity;
pub mod clock;
pub mod error;
pub mod ids;
pub mod opportunity;
pub mod status;
pub mod user;

pub use activity::{CallNote, EventKind, Expense, NewCallNote, NewExpense, OpportunityEvent};
pub use clock::MonotonicClock;
pub use error::CoreError;
pub use ids::*;
pub use opportunity::{Opportunity, OpportunityDraft, OpportunityPatch};
pub use status::{Status, StatusSet};
pub use user::{Principal, Role, User};

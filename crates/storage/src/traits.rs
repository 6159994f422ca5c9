use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use dealflow_core::{
    CallNote, Expense, NewCallNote, NewExpense, Opportunity, OpportunityDraft, OpportunityEvent,
    OpportunityPatch, Principal, Status, User, ids::*,
};

use crate::error::StorageError;

/// Narrows `list_opportunities` beyond what the access policy already allows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpportunityFilter {
    pub owner_id: Option<UserId>,
    pub status: Option<Status>,
}

impl OpportunityFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn owned_by(owner_id: UserId) -> Self {
        Self {
            owner_id: Some(owner_id),
            status: None,
        }
    }
}

/// Half-open `[start, end)` interval of UTC time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Whole days covered, for date-typed columns.
    pub fn date_bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.start.date_naive(), self.end.date_naive())
    }
}

/// The store of record for opportunity rows.
///
/// Every call carries the acting principal. Implementations enforce the
/// access policy: admins reach all rows, submitters only rows they own.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Visible rows, most recently created first.
    async fn list_opportunities(
        &self,
        principal: &Principal,
        filter: &OpportunityFilter,
    ) -> Result<Vec<Opportunity>, StorageError>;

    async fn get_opportunity(
        &self,
        principal: &Principal,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, StorageError>;

    async fn insert_opportunity(
        &self,
        principal: &Principal,
        draft: &OpportunityDraft,
    ) -> Result<Opportunity, StorageError>;

    /// Applies the patch and refreshes `updated_at`.
    async fn update_opportunity(
        &self,
        principal: &Principal,
        id: OpportunityId,
        patch: &OpportunityPatch,
    ) -> Result<Opportunity, StorageError>;

    /// History entries in `range`, oldest first.
    async fn list_events(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<OpportunityEvent>, StorageError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError>;
}

/// Call notes and expenses. Submitters see only what they authored or own.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn insert_call_note(
        &self,
        principal: &Principal,
        note: &NewCallNote,
    ) -> Result<CallNote, StorageError>;

    async fn list_call_notes(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<CallNote>, StorageError>;

    async fn insert_expense(
        &self,
        principal: &Principal,
        expense: &NewExpense,
    ) -> Result<Expense, StorageError>;

    /// Expenses whose `incurred_on` falls within the days of `range`.
    async fn list_expenses(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<Expense>, StorageError>;
}

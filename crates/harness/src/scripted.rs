use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use dealflow_core::{
    CallNote, Expense, NewCallNote, NewExpense, Opportunity, OpportunityDraft, OpportunityEvent,
    OpportunityId, OpportunityPatch, Principal, Status, StatusSet, User, UserId,
};
use dealflow_storage::{
    ActivityStore, OpportunityFilter, RecordStore, SqliteStore, StorageError, TimeRange, UserStore,
};

/// One store call as the scripted store saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListOpportunities,
    GetOpportunity(OpportunityId),
    InsertOpportunity { name: String },
    UpdateOpportunity { id: OpportunityId, status: Option<Status> },
    ListEvents,
    InsertCallNote,
    ListCallNotes,
    InsertExpense,
    ListExpenses,
}

impl Call {
    fn target_status(&self) -> Option<&Status> {
        match self {
            Self::UpdateOpportunity { status, .. } => status.as_ref(),
            _ => None,
        }
    }
}

/// Releases one held store call. Dropping the gate releases it too.
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

struct Script {
    fail_next: usize,
    fail_all: bool,
    fail_updates_to: Vec<Status>,
    held_updates: Vec<(Status, oneshot::Receiver<()>)>,
    delay: Option<Duration>,
    failure: fn(&str) -> StorageError,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail_next: 0,
            fail_all: false,
            fail_updates_to: Vec::new(),
            held_updates: Vec::new(),
            delay: None,
            failure: |op| StorageError::Unavailable(format!("scripted failure in {op}")),
        }
    }
}

/// What a call does before it reaches the backing store.
struct Plan {
    fail: Option<StorageError>,
    hold: Option<oneshot::Receiver<()>>,
    delay: Option<Duration>,
}

/// A [`RecordStore`] over an in-memory [`SqliteStore`] whose failures,
/// latency and completion order are set by the test.
///
/// Failure decisions are made when a call starts, so a held call that was
/// scripted to fail still fails once released. A failed call never reaches
/// the backing store.
pub struct ScriptedStore {
    inner: SqliteStore,
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedStore {
    pub fn new(statuses: StatusSet) -> Result<Self, StorageError> {
        Ok(Self {
            inner: SqliteStore::open_in_memory(statuses)?,
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// The backing store; calls made on it bypass the script and the log.
    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    /// Fails the next `n` calls of any kind.
    pub fn fail_next(&self, n: usize) {
        self.script.lock().fail_next = n;
    }

    pub fn fail_all(&self, on: bool) {
        self.script.lock().fail_all = on;
    }

    /// Fails every update that sets `status`.
    pub fn fail_updates_to(&self, status: &Status) {
        self.script.lock().fail_updates_to.push(status.clone());
    }

    /// Holds the next update that sets `status` until the returned gate is
    /// released.
    pub fn hold_update_to(&self, status: &Status) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.script.lock().held_updates.push((status.clone(), rx));
        Gate(tx)
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.script.lock().delay = delay;
    }

    /// Error produced by scripted failures; `Unavailable` by default.
    pub fn fail_with(&self, failure: fn(&str) -> StorageError) {
        self.script.lock().failure = failure;
    }

    /// Clears every scripted behaviour. Held calls are released.
    pub fn reset(&self) {
        *self.script.lock() = Script::default();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn update_calls(&self) -> Vec<(OpportunityId, Option<Status>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::UpdateOpportunity { id, status } => Some((*id, status.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn plan(&self, call: Call, op: &str) -> Plan {
        let mut script = self.script.lock();
        let target = call.target_status();

        let scripted_fail = if script.fail_next > 0 {
            script.fail_next -= 1;
            true
        } else {
            script.fail_all || target.is_some_and(|s| script.fail_updates_to.contains(s))
        };
        let hold = target.and_then(|s| {
            let pos = script.held_updates.iter().position(|(held, _)| held == s)?;
            Some(script.held_updates.remove(pos).1)
        });
        let plan = Plan {
            fail: scripted_fail.then(|| (script.failure)(op)),
            hold,
            delay: script.delay,
        };
        drop(script);

        self.calls.lock().push(call);
        plan
    }

    /// Waits out the plan, returning the scripted failure if there is one.
    async fn pace(plan: Plan) -> Result<(), StorageError> {
        if let Some(delay) = plan.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hold) = plan.hold {
            let _ = hold.await;
        }
        match plan.fail {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn list_opportunities(
        &self,
        principal: &Principal,
        filter: &OpportunityFilter,
    ) -> Result<Vec<Opportunity>, StorageError> {
        Self::pace(self.plan(Call::ListOpportunities, "list_opportunities")).await?;
        self.inner.list_opportunities(principal, filter).await
    }

    async fn get_opportunity(
        &self,
        principal: &Principal,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, StorageError> {
        Self::pace(self.plan(Call::GetOpportunity(id), "get_opportunity")).await?;
        self.inner.get_opportunity(principal, id).await
    }

    async fn insert_opportunity(
        &self,
        principal: &Principal,
        draft: &OpportunityDraft,
    ) -> Result<Opportunity, StorageError> {
        let call = Call::InsertOpportunity {
            name: draft.name.clone(),
        };
        Self::pace(self.plan(call, "insert_opportunity")).await?;
        self.inner.insert_opportunity(principal, draft).await
    }

    async fn update_opportunity(
        &self,
        principal: &Principal,
        id: OpportunityId,
        patch: &OpportunityPatch,
    ) -> Result<Opportunity, StorageError> {
        let call = Call::UpdateOpportunity {
            id,
            status: patch.status.clone(),
        };
        Self::pace(self.plan(call, "update_opportunity")).await?;
        self.inner.update_opportunity(principal, id, patch).await
    }

    async fn list_events(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<OpportunityEvent>, StorageError> {
        Self::pace(self.plan(Call::ListEvents, "list_events")).await?;
        self.inner.list_events(principal, range).await
    }
}

#[async_trait]
impl ActivityStore for ScriptedStore {
    async fn insert_call_note(
        &self,
        principal: &Principal,
        note: &NewCallNote,
    ) -> Result<CallNote, StorageError> {
        Self::pace(self.plan(Call::InsertCallNote, "insert_call_note")).await?;
        self.inner.insert_call_note(principal, note).await
    }

    async fn list_call_notes(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<CallNote>, StorageError> {
        Self::pace(self.plan(Call::ListCallNotes, "list_call_notes")).await?;
        self.inner.list_call_notes(principal, range).await
    }

    async fn insert_expense(
        &self,
        principal: &Principal,
        expense: &NewExpense,
    ) -> Result<Expense, StorageError> {
        Self::pace(self.plan(Call::InsertExpense, "insert_expense")).await?;
        self.inner.insert_expense(principal, expense).await
    }

    async fn list_expenses(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<Expense>, StorageError> {
        Self::pace(self.plan(Call::ListExpenses, "list_expenses")).await?;
        self.inner.list_expenses(principal, range).await
    }
}

/// User rows are fixture data; these calls are not scripted.
#[async_trait]
impl UserStore for ScriptedStore {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        self.inner.upsert_user(user).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        self.inner.get_user(id).await
    }
}

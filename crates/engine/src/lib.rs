pub mod board;
pub mod config;
pub mod error;
pub mod ledger;
pub mod liveness;
pub mod notify;
pub mod reports;

pub use board::{Board, Column, Rank};
pub use config::{LogConfig, PipelineConfig, StoreConfig};
pub use error::{ConfigError, PipelineError};
pub use ledger::{PendingLedger, Resolution};
pub use liveness::Liveness;
pub use notify::{NoticeKind, Notifier, SessionProvider, TracingNotifier};
pub use reports::{ActivityReport, Period, PipelineSummary, StatusTotals};

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use dealflow_core::{
    OpId, Opportunity, OpportunityDraft, OpportunityId, OpportunityPatch, Principal, Status,
    StatusSet,
};
use dealflow_storage::{OpportunityFilter, RecordStore};

use crate::ledger::{PendingEntry, PriorState};

const GENERIC_SYNC_ERROR: &str = "The board is out of date. Refresh and try again.";

struct PipelineState {
    board: Board,
    ledger: PendingLedger,
}

struct Shared {
    store: Arc<dyn RecordStore>,
    session: Arc<dyn SessionProvider>,
    notifier: Arc<dyn Notifier>,
    statuses: StatusSet,
    liveness: Liveness,
    state: Mutex<PipelineState>,
}

impl Shared {
    /// Converts a failure into its single user-visible notice.
    fn report(&self, err: &PipelineError, context: &str) {
        let message = match err {
            PipelineError::NotFound(_) => {
                error!(error = %err, "{context}: local board out of sync");
                GENERIC_SYNC_ERROR.to_string()
            }
            other => {
                warn!(error = %other, code = other.code(), "{context}");
                format!("{context}: {other}")
            }
        };
        self.notifier.notify(NoticeKind::Error, &message);
    }

    fn principal_for_write(&self, context: &str) -> Result<Principal, PipelineError> {
        self.session.current_user().ok_or_else(|| {
            let err = PipelineError::unauthenticated_persist();
            self.report(&err, context);
            err
        })
    }
}

/// Result of settling an in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// The store accepted the change; carries the stored record.
    Confirmed(Opportunity),
    /// The view was detached before the store answered; nothing was applied.
    Discarded,
}

enum Request {
    Move { to: Status },
    Update { patch: OpportunityPatch },
    /// `from == to`; there is nothing to persist.
    Noop { card: Opportunity },
}

/// An operation whose optimistic half has already been applied to the board.
/// Awaiting [`PendingOp::settle`] performs the store round trip.
#[must_use = "a pending operation does nothing until settled"]
pub struct PendingOp {
    shared: Arc<Shared>,
    op_id: OpId,
    opportunity_id: OpportunityId,
    principal: Principal,
    label: String,
    request: Request,
    liveness: Liveness,
}

impl PendingOp {
    pub fn op_id(&self) -> OpId {
        self.op_id
    }

    pub fn opportunity_id(&self) -> OpportunityId {
        self.opportunity_id
    }

    pub async fn settle(self) -> Result<Settled, PipelineError> {
        let patch = match &self.request {
            Request::Noop { card } => {
                if !self.liveness.is_alive() {
                    return Ok(Settled::Discarded);
                }
                self.shared.notifier.notify(
                    NoticeKind::Success,
                    &format!("\"{}\" is already in {}", self.label, card.status),
                );
                return Ok(Settled::Confirmed(card.clone()));
            }
            Request::Move { to } => OpportunityPatch::status(to.clone()),
            Request::Update { patch } => patch.clone(),
        };

        let result = self
            .shared
            .store
            .update_opportunity(&self.principal, self.opportunity_id, &patch)
            .await;

        if !self.liveness.is_alive() {
            debug!(
                opportunity_id = %self.opportunity_id,
                op_id = %self.op_id,
                ok = result.is_ok(),
                "view detached; discarding settlement"
            );
            return Ok(Settled::Discarded);
        }

        match result {
            Ok(record) => {
                {
                    let mut state = self.shared.state.lock();
                    if state.ledger.confirm(self.opportunity_id, self.op_id) == Resolution::Current {
                        apply_confirmed(&mut state.board, record.clone());
                    }
                }
                let message = match &self.request {
                    Request::Move { to } => format!("Moved \"{}\" to {to}", self.label),
                    _ => format!("Saved \"{}\"", self.label),
                };
                info!(opportunity_id = %self.opportunity_id, op_id = %self.op_id, status = %record.status, "change confirmed");
                self.shared.notifier.notify(NoticeKind::Success, &message);
                Ok(Settled::Confirmed(record))
            }
            Err(store_err) => {
                {
                    let mut state = self.shared.state.lock();
                    if let Resolution::Restore(prior) =
                        state.ledger.fail(self.opportunity_id, self.op_id)
                    {
                        restore(&mut state.board, prior);
                    }
                }
                let err = PipelineError::persist(&store_err);
                let context = match &self.request {
                    Request::Move { to } => format!("Could not move \"{}\" to {to}", self.label),
                    _ => format!("Could not save \"{}\"", self.label),
                };
                self.shared.report(&err, &context);
                Err(err)
            }
        }
    }
}

/// Replaces the card with the stored record, keeping its slot and never
/// letting `updated_at` go backwards.
fn apply_confirmed(board: &mut Board, mut record: Opportunity) {
    let Some((status, _)) = board.position(record.id) else {
        return;
    };
    if let Some(local) = board.get(record.id) {
        record.updated_at = record.updated_at.max(local.updated_at);
    }
    if status == record.status {
        board.replace_in_place(record);
        return;
    }
    // The store disagrees with the optimistic status; the store wins.
    board.take(record.id);
    if let Err(card) = board.push_back(record) {
        warn!(opportunity_id = %card.id, status = %card.status, "stored status has no column");
    }
}

fn put_back(board: &mut Board, card: Opportunity, rank: Rank) {
    if let Err(card) = board.insert_ranked(card, rank) {
        warn!(opportunity_id = %card.id, status = %card.status, "card lost its column");
    }
}

fn restore(board: &mut Board, prior: PriorState) {
    board.take(prior.record.id);
    put_back(board, prior.record, prior.rank);
}

/// The kanban pipeline: a local, status-grouped view of opportunities whose
/// moves and edits apply optimistically and reconcile against a [`RecordStore`].
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        session: Arc<dyn SessionProvider>,
        notifier: Arc<dyn Notifier>,
        statuses: StatusSet,
    ) -> Self {
        let board = Board::new(&statuses);
        Self {
            shared: Arc::new(Shared {
                store,
                session,
                notifier,
                statuses,
                liveness: Liveness::new(),
                state: Mutex::new(PipelineState {
                    board,
                    ledger: PendingLedger::new(),
                }),
            }),
        }
    }

    pub fn statuses(&self) -> &StatusSet {
        &self.shared.statuses
    }

    /// Snapshot of the current local view.
    pub fn board(&self) -> Board {
        self.shared.state.lock().board.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().ledger.len()
    }

    /// Marks the view as gone. Operations still in flight settle without
    /// touching the board or notifying.
    pub fn detach(&self) {
        self.shared.liveness.revoke();
    }

    pub fn is_attached(&self) -> bool {
        self.shared.liveness.is_alive()
    }

    /// Fetches every visible opportunity and regroups the board. On failure
    /// the previous board is kept.
    pub async fn load(&self) -> Result<Board, PipelineError> {
        const CONTEXT: &str = "Could not load opportunities";
        let Some(principal) = self.shared.session.current_user() else {
            let err = PipelineError::unauthenticated_fetch();
            self.shared.report(&err, CONTEXT);
            return Err(err);
        };

        let records = match self
            .shared
            .store
            .list_opportunities(&principal, &OpportunityFilter::all())
            .await
        {
            Ok(records) => records,
            Err(store_err) => {
                let err = PipelineError::fetch(&store_err);
                if self.shared.liveness.is_alive() {
                    self.shared.report(&err, CONTEXT);
                }
                return Err(err);
            }
        };

        let (board, rejected) = Board::from_records(&self.shared.statuses, records);
        for record in &rejected {
            warn!(opportunity_id = %record.id, status = %record.status, "skipping opportunity with unknown status");
        }
        if !self.shared.liveness.is_alive() {
            debug!("view detached; discarding load");
            return Ok(board);
        }

        let mut state = self.shared.state.lock();
        state.board = board.clone();
        state.ledger.clear();
        info!(cards = board.len(), user_id = %principal.user_id, "board loaded");
        Ok(board)
    }

    /// Applies a move to the board immediately and returns the pending
    /// persistence step.
    pub fn begin_move(
        &self,
        id: OpportunityId,
        from: &Status,
        to: &Status,
    ) -> Result<PendingOp, PipelineError> {
        const CONTEXT: &str = "Could not move opportunity";
        if let Err(e) = self.shared.statuses.check_transition(from, to) {
            let err = PipelineError::from(e);
            self.shared.report(&err, CONTEXT);
            return Err(err);
        }
        let principal = self.shared.principal_for_write(CONTEXT)?;

        let mut state = self.shared.state.lock();
        let (mut card, rank) = match state.board.take(id) {
            Some((card, rank)) if &card.status == from => (card, rank),
            other => {
                if let Some((card, rank)) = other {
                    put_back(&mut state.board, card, rank);
                }
                drop(state);
                let err = PipelineError::NotFound(format!("{id} in {from}"));
                self.shared.report(&err, CONTEXT);
                return Err(err);
            }
        };

        let op_id = OpId::new();
        if from == to {
            put_back(&mut state.board, card.clone(), rank);
            drop(state);
            let label = card.name.clone();
            return Ok(self.pending_op(op_id, id, principal, label, Request::Noop { card }));
        }

        let prior = PriorState {
            record: card.clone(),
            rank,
        };
        card.status = to.clone();
        let label = card.name.clone();
        // `to` is a member, so its column exists.
        let _ = state.board.push_back(card);
        state.ledger.push(id, PendingEntry { op_id, prior });
        drop(state);

        debug!(opportunity_id = %id, op_id = %op_id, from = %from, to = %to, "move applied locally");
        Ok(self.pending_op(
            op_id,
            id,
            principal,
            label,
            Request::Move { to: to.clone() },
        ))
    }

    /// Moves a card between columns and waits for the store's answer.
    pub async fn move_opportunity(
        &self,
        id: OpportunityId,
        from: &Status,
        to: &Status,
    ) -> Result<Settled, PipelineError> {
        self.begin_move(id, from, to)?.settle().await
    }

    /// Validates, inserts, and on success places the new card at the head of
    /// its column.
    pub async fn create(&self, draft: OpportunityDraft) -> Result<Opportunity, PipelineError> {
        const CONTEXT: &str = "Could not create opportunity";
        if let Err(e) = draft.validate(&self.shared.statuses) {
            let err = PipelineError::from(e);
            self.shared.report(&err, CONTEXT);
            return Err(err);
        }
        let principal = self.shared.principal_for_write(CONTEXT)?;

        let result = self.shared.store.insert_opportunity(&principal, &draft).await;
        if !self.shared.liveness.is_alive() {
            debug!(ok = result.is_ok(), "view detached; discarding create");
            return result.map_err(|e| PipelineError::persist(&e));
        }

        match result {
            Ok(record) => {
                if let Err(card) = self.shared.state.lock().board.push_front(record.clone()) {
                    warn!(opportunity_id = %card.id, status = %card.status, "created card has no column");
                }
                info!(opportunity_id = %record.id, status = %record.status, "opportunity created");
                self.shared
                    .notifier
                    .notify(NoticeKind::Success, &format!("Created \"{}\"", record.name));
                Ok(record)
            }
            Err(store_err) => {
                let err = PipelineError::persist(&store_err);
                self.shared.report(&err, CONTEXT);
                Err(err)
            }
        }
    }

    /// Applies an edit in place immediately and returns the pending
    /// persistence step. A status change moves the card to the tail of its
    /// new column.
    pub fn begin_update(
        &self,
        id: OpportunityId,
        patch: OpportunityPatch,
    ) -> Result<PendingOp, PipelineError> {
        const CONTEXT: &str = "Could not save opportunity";
        if let Err(e) = patch.validate(&self.shared.statuses) {
            let err = PipelineError::from(e);
            self.shared.report(&err, CONTEXT);
            return Err(err);
        }

        let principal = self.shared.principal_for_write(CONTEXT)?;

        let mut state = self.shared.state.lock();
        let Some((mut card, rank)) = state.board.take(id) else {
            drop(state);
            let err = PipelineError::NotFound(id.to_string());
            self.shared.report(&err, CONTEXT);
            return Err(err);
        };
        let prior = PriorState {
            record: card.clone(),
            rank,
        };
        let status_changed = patch.status.as_ref().is_some_and(|s| s != &card.status);
        patch.apply_to(&mut card);
        let label = card.name.clone();
        let placed = if status_changed {
            state.board.push_back(card)
        } else {
            state.board.insert_ranked(card, rank)
        };
        if placed.is_err() {
            warn!(opportunity_id = %id, "edited card has no column");
        }

        let op_id = OpId::new();
        state.ledger.push(id, PendingEntry { op_id, prior });
        drop(state);

        debug!(opportunity_id = %id, op_id = %op_id, fields = ?patch.changed_fields(), "edit applied locally");
        Ok(self.pending_op(op_id, id, principal, label, Request::Update { patch }))
    }

    /// Edits a card and waits for the store's answer.
    pub async fn update(
        &self,
        id: OpportunityId,
        patch: OpportunityPatch,
    ) -> Result<Settled, PipelineError> {
        self.begin_update(id, patch)?.settle().await
    }

    fn pending_op(
        &self,
        op_id: OpId,
        opportunity_id: OpportunityId,
        principal: Principal,
        label: String,
        request: Request,
    ) -> PendingOp {
        PendingOp {
            shared: Arc::clone(&self.shared),
            op_id,
            opportunity_id,
            principal,
            label,
            request,
            liveness: self.shared.liveness.clone(),
        }
    }
}

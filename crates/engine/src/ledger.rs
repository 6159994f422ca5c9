use std::collections::HashMap;

use dealflow_core::{OpId, Opportunity, OpportunityId};

use crate::board::Rank;

/// State a pending operation restores if it fails: the card as it was and
/// the rank it held in its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorState {
    pub record: Opportunity,
    pub rank: Rank,
}

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub op_id: OpId,
    pub prior: PriorState,
}

/// What settling an operation means for the local board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The operation is the newest one on its card; apply the store's answer.
    Current,
    /// The newest operation failed; put the card back.
    Restore(PriorState),
    /// A later operation owns the card's state; leave the board alone.
    Superseded,
}

/// In-flight operations, per card in issue order.
///
/// Each entry carries its own prior state, so an earlier failure that lands
/// after a later operation never rewinds the card past that operation.
#[derive(Debug, Default)]
pub struct PendingLedger {
    by_card: HashMap<OpportunityId, Vec<PendingEntry>>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, opportunity_id: OpportunityId, entry: PendingEntry) {
        self.by_card.entry(opportunity_id).or_default().push(entry);
    }

    pub fn pending_for(&self, opportunity_id: OpportunityId) -> usize {
        self.by_card.get(&opportunity_id).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.by_card.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_card.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_card.clear();
    }

    /// A confirmed operation supersedes every earlier entry on its card.
    pub fn confirm(&mut self, opportunity_id: OpportunityId, op_id: OpId) -> Resolution {
        let Some(entries) = self.by_card.get_mut(&opportunity_id) else {
            return Resolution::Superseded;
        };
        let Some(pos) = entries.iter().position(|e| e.op_id == op_id) else {
            return Resolution::Superseded;
        };
        let newest = pos + 1 == entries.len();
        entries.drain(..=pos);
        if entries.is_empty() {
            self.by_card.remove(&opportunity_id);
        }
        if newest {
            Resolution::Current
        } else {
            Resolution::Superseded
        }
    }

    /// A failed operation restores its prior state only if nothing newer is
    /// pending; otherwise its prior state passes to its successor.
    pub fn fail(&mut self, opportunity_id: OpportunityId, op_id: OpId) -> Resolution {
        let Some(entries) = self.by_card.get_mut(&opportunity_id) else {
            return Resolution::Superseded;
        };
        let Some(pos) = entries.iter().position(|e| e.op_id == op_id) else {
            return Resolution::Superseded;
        };
        let failed = entries.remove(pos);
        let resolution = match entries.get_mut(pos) {
            Some(successor) => {
                successor.prior = failed.prior;
                Resolution::Superseded
            }
            None => Resolution::Restore(failed.prior),
        };
        if entries.is_empty() {
            self.by_card.remove(&opportunity_id);
        }
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dealflow_core::{Status, UserId};

    fn record(id: OpportunityId, status: &str) -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id,
            name: "Loader".into(),
            company: "Acme".into(),
            contact_name: None,
            description: None,
            status: Status::new(status),
            value_cents: None,
            owner_id: UserId::new(),
            requested_machine: None,
            requested_attachments: None,
            trade_in: None,
            expected_close: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn entry(id: OpportunityId, status: &str, rank: Rank) -> PendingEntry {
        PendingEntry {
            op_id: OpId::new(),
            prior: PriorState {
                record: record(id, status),
                rank,
            },
        }
    }

    #[test]
    fn single_failure_restores() {
        let id = OpportunityId::new();
        let mut ledger = PendingLedger::new();
        let e = entry(id, "new", 2);
        let op = e.op_id;
        let prior = e.prior.clone();
        ledger.push(id, e);

        assert_eq!(ledger.fail(id, op), Resolution::Restore(prior));
        assert!(ledger.is_empty());
    }

    #[test]
    fn earlier_failure_hands_prior_to_successor() {
        let id = OpportunityId::new();
        let mut ledger = PendingLedger::new();
        let first = entry(id, "new", 0);
        let second = entry(id, "contacted", 3);
        let (op1, op2) = (first.op_id, second.op_id);
        let original = first.prior.clone();
        ledger.push(id, first);
        ledger.push(id, second);

        assert_eq!(ledger.fail(id, op1), Resolution::Superseded);
        assert_eq!(ledger.pending_for(id), 1);
        // The successor now rewinds all the way to the original placement.
        assert_eq!(ledger.fail(id, op2), Resolution::Restore(original));
    }

    #[test]
    fn later_success_supersedes_earlier_failure() {
        let id = OpportunityId::new();
        let mut ledger = PendingLedger::new();
        let first = entry(id, "new", 0);
        let second = entry(id, "contacted", 0);
        let (op1, op2) = (first.op_id, second.op_id);
        ledger.push(id, first);
        ledger.push(id, second);

        assert_eq!(ledger.confirm(id, op2), Resolution::Current);
        assert_eq!(ledger.fail(id, op1), Resolution::Superseded);
        assert!(ledger.is_empty());
    }

    #[test]
    fn earlier_success_with_later_pending_is_superseded() {
        let id = OpportunityId::new();
        let mut ledger = PendingLedger::new();
        let first = entry(id, "new", 0);
        let second = entry(id, "contacted", 0);
        let (op1, op2) = (first.op_id, second.op_id);
        let successor_prior = second.prior.clone();
        ledger.push(id, first);
        ledger.push(id, second);

        assert_eq!(ledger.confirm(id, op1), Resolution::Superseded);
        assert_eq!(ledger.fail(id, op2), Resolution::Restore(successor_prior));
    }

    #[test]
    fn unknown_ops_are_superseded() {
        let mut ledger = PendingLedger::new();
        let id = OpportunityId::new();
        assert_eq!(ledger.confirm(id, OpId::new()), Resolution::Superseded);
        assert_eq!(ledger.fail(id, OpId::new()), Resolution::Superseded);
    }

    #[test]
    fn cards_are_tracked_independently() {
        let a = OpportunityId::new();
        let b = OpportunityId::new();
        let mut ledger = PendingLedger::new();
        let ea = entry(a, "new", 0);
        let eb = entry(b, "won", 1);
        let op_b = eb.op_id;
        ledger.push(a, ea);
        ledger.push(b, eb);

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.confirm(b, op_b), Resolution::Current);
        assert_eq!(ledger.pending_for(a), 1);
        assert_eq!(ledger.pending_for(b), 0);
    }
}

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, Weekday};

use dealflow_core::{CoreError, EventKind, Principal, Status, UserId};
use dealflow_storage::{ActivityStore, RecordStore, TimeRange};

use crate::board::Board;
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTotals {
    pub status: Status,
    pub count: usize,
    /// Sum over cards that carry a value; cards without one count as zero.
    pub value_cents: i128,
}

/// Per-column totals of a board, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub columns: Vec<StatusTotals>,
}

impl PipelineSummary {
    pub fn from_board(board: &Board) -> Self {
        let columns = board
            .columns()
            .iter()
            .map(|column| StatusTotals {
                status: column.status.clone(),
                count: column.cards.len(),
                value_cents: column
                    .cards
                    .iter()
                    .filter_map(|c| c.value_cents)
                    .map(i128::from)
                    .sum(),
            })
            .collect();
        Self { columns }
    }

    pub fn total_count(&self) -> usize {
        self.columns.iter().map(|c| c.count).sum()
    }

    pub fn total_value_cents(&self) -> i128 {
        self.columns.iter().map(|c| c.value_cents).sum()
    }

    pub fn get(&self, status: &Status) -> Option<&StatusTotals> {
        self.columns.iter().find(|c| &c.status == status)
    }
}

/// A reporting window, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day(NaiveDate),
    /// ISO 8601 week, Monday through Sunday.
    IsoWeek { year: i32, week: u32 },
}

impl Period {
    pub fn containing_week(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self::IsoWeek {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn range(&self) -> Result<TimeRange, CoreError> {
        let (first, days) = match *self {
            Self::Day(date) => (date, 1),
            Self::IsoWeek { year, week } => {
                let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(
                    || CoreError::InvalidData(format!("no ISO week {week} in {year}")),
                )?;
                (monday, 7)
            }
        };
        let last = first
            .checked_add_days(Days::new(days))
            .ok_or_else(|| CoreError::InvalidData(format!("period after {first} out of range")))?;
        Ok(TimeRange::new(
            first.and_time(chrono::NaiveTime::MIN).and_utc(),
            last.and_time(chrono::NaiveTime::MIN).and_utc(),
        ))
    }
}

/// Activity visible to one principal over a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityReport {
    pub period: Period,
    pub range: TimeRange,
    pub call_notes_by_author: BTreeMap<UserId, usize>,
    pub expenses_by_category: BTreeMap<String, i128>,
    pub expenses_by_owner: BTreeMap<UserId, i128>,
    /// Status changes, keyed by the status moved into.
    pub moves_into: BTreeMap<Status, usize>,
    pub created: usize,
    pub total_expense_cents: i128,
}

impl ActivityReport {
    pub async fn build<S>(
        store: &S,
        principal: &Principal,
        period: Period,
    ) -> Result<Self, PipelineError>
    where
        S: RecordStore + ActivityStore + ?Sized,
    {
        let range = period.range()?;
        let notes = store
            .list_call_notes(principal, &range)
            .await
            .map_err(|e| PipelineError::fetch(&e))?;
        let expenses = store
            .list_expenses(principal, &range)
            .await
            .map_err(|e| PipelineError::fetch(&e))?;
        let events = store
            .list_events(principal, &range)
            .await
            .map_err(|e| PipelineError::fetch(&e))?;

        let mut report = Self {
            period,
            range,
            call_notes_by_author: BTreeMap::new(),
            expenses_by_category: BTreeMap::new(),
            expenses_by_owner: BTreeMap::new(),
            moves_into: BTreeMap::new(),
            created: 0,
            total_expense_cents: 0,
        };

        for note in &notes {
            *report.call_notes_by_author.entry(note.author_id).or_default() += 1;
        }
        for expense in &expenses {
            let amount = i128::from(expense.amount_cents);
            *report
                .expenses_by_category
                .entry(expense.category.clone())
                .or_default() += amount;
            *report.expenses_by_owner.entry(expense.owner_id).or_default() += amount;
            report.total_expense_cents += amount;
        }
        for event in &events {
            match (event.kind, &event.to_status) {
                (EventKind::Created, _) => report.created += 1,
                (EventKind::StatusChanged, Some(to)) => {
                    *report.moves_into.entry(to.clone()).or_default() += 1;
                }
                _ => {}
            }
        }

        tracing::debug!(
            user_id = %principal.user_id,
            notes = notes.len(),
            expenses = expenses.len(),
            events = events.len(),
            "activity report built"
        );
        Ok(report)
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{CallNoteId, ExpenseId, OpportunityId, UserId};
use crate::status::Status;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallNote {
    pub id: CallNoteId,
    pub opportunity_id: OpportunityId,
    pub author_id: UserId,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCallNote {
    pub opportunity_id: OpportunityId,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
}

impl NewCallNote {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.summary.trim().is_empty() {
            return Err(CoreError::MissingField("summary"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub owner_id: UserId,
    pub opportunity_id: Option<OpportunityId>,
    pub category: String,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub incurred_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub opportunity_id: Option<OpportunityId>,
    pub category: String,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub incurred_on: NaiveDate,
}

impl NewExpense {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.category.trim().is_empty() {
            return Err(CoreError::MissingField("category"));
        }
        if self.amount_cents < 0 {
            return Err(CoreError::InvalidData(format!(
                "expense amount must not be negative: {}",
                self.amount_cents
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    StatusChanged,
    Edited,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::StatusChanged => "status_changed",
            Self::Edited => "edited",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "created" => Ok(Self::Created),
            "status_changed" => Ok(Self::StatusChanged),
            "edited" => Ok(Self::Edited),
            _ => Err(CoreError::InvalidData(format!("unknown event kind: {s}"))),
        }
    }
}

/// One entry of an opportunity's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityEvent {
    pub opportunity_id: OpportunityId,
    pub actor_id: UserId,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub from_status: Option<Status>,
    pub to_status: Option<Status>,
    pub changed_fields: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expense_validation() {
        let mut expense = NewExpense {
            opportunity_id: None,
            category: "travel".into(),
            amount_cents: 4_250,
            description: None,
            incurred_on: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        };
        assert!(expense.validate().is_ok());

        expense.amount_cents = -1;
        assert!(matches!(expense.validate(), Err(CoreError::InvalidData(_))));

        expense.amount_cents = 10;
        expense.category = " ".into();
        assert_eq!(expense.validate(), Err(CoreError::MissingField("category")));
    }

    #[test]
    fn blank_call_note_rejected() {
        let note = NewCallNote {
            opportunity_id: OpportunityId::new(),
            summary: "\n".into(),
            occurred_at: Utc::now(),
        };
        assert_eq!(note.validate(), Err(CoreError::MissingField("summary")));
    }
}

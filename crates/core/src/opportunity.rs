use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{OpportunityId, UserId};
use crate::status::{Status, StatusSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub name: String,
    pub company: String,
    pub contact_name: Option<String>,
    pub description: Option<String>,
    pub status: Status,
    /// Minor currency units.
    pub value_cents: Option<i64>,
    pub owner_id: UserId,
    pub requested_machine: Option<String>,
    pub requested_attachments: Option<String>,
    pub trade_in: Option<String>,
    pub expected_close: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn require_text(value: &str, field: &'static str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Fields submitted to create an opportunity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityDraft {
    pub name: String,
    pub company: String,
    pub status: Option<Status>,
    /// Defaults to the creating user.
    pub owner_id: Option<UserId>,
    pub contact_name: Option<String>,
    pub description: Option<String>,
    pub value_cents: Option<i64>,
    pub requested_machine: Option<String>,
    pub requested_attachments: Option<String>,
    pub trade_in: Option<String>,
    pub expected_close: Option<NaiveDate>,
}

impl OpportunityDraft {
    pub fn new(name: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            company: company.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_value_cents(mut self, value_cents: i64) -> Self {
        self.value_cents = Some(value_cents);
        self
    }

    /// Checks required fields and returns the status the record will start in.
    pub fn validate(&self, statuses: &StatusSet) -> Result<Status, CoreError> {
        require_text(&self.name, "name")?;
        require_text(&self.company, "company")?;
        match &self.status {
            Some(status) => {
                statuses.require(status)?;
                Ok(status.clone())
            }
            None => Ok(statuses.initial().clone()),
        }
    }
}

/// A partial edit. `None` leaves a field alone; for nullable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpportunityPatch {
    pub name: Option<String>,
    pub company: Option<String>,
    pub status: Option<Status>,
    pub contact_name: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub value_cents: Option<Option<i64>>,
    pub requested_machine: Option<Option<String>>,
    pub requested_attachments: Option<Option<String>>,
    pub trade_in: Option<Option<String>>,
    pub expected_close: Option<Option<NaiveDate>>,
}

impl OpportunityPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn validate(&self, statuses: &StatusSet) -> Result<(), CoreError> {
        if let Some(name) = &self.name {
            require_text(name, "name")?;
        }
        if let Some(company) = &self.company {
            require_text(company, "company")?;
        }
        if let Some(status) = &self.status {
            statuses.require(status)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.company.is_some() {
            fields.push("company");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        if self.contact_name.is_some() {
            fields.push("contact_name");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.value_cents.is_some() {
            fields.push("value_cents");
        }
        if self.requested_machine.is_some() {
            fields.push("requested_machine");
        }
        if self.requested_attachments.is_some() {
            fields.push("requested_attachments");
        }
        if self.trade_in.is_some() {
            fields.push("trade_in");
        }
        if self.expected_close.is_some() {
            fields.push("expected_close");
        }
        fields
    }

    /// Applies the edit in place. Does not touch `updated_at`.
    pub fn apply_to(&self, record: &mut Opportunity) {
        if let Some(name) = &self.name {
            record.name = name.trim().to_string();
        }
        if let Some(company) = &self.company {
            record.company = company.trim().to_string();
        }
        if let Some(status) = &self.status {
            record.status = status.clone();
        }
        if let Some(v) = &self.contact_name {
            record.contact_name = v.clone();
        }
        if let Some(v) = &self.description {
            record.description = v.clone();
        }
        if let Some(v) = self.value_cents {
            record.value_cents = v;
        }
        if let Some(v) = &self.requested_machine {
            record.requested_machine = v.clone();
        }
        if let Some(v) = &self.requested_attachments {
            record.requested_attachments = v.clone();
        }
        if let Some(v) = &self.trade_in {
            record.trade_in = v.clone();
        }
        if let Some(v) = self.expected_close {
            record.expected_close = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: OpportunityId::new(),
            name: "Excavator fleet".into(),
            company: "Acme Quarry".into(),
            contact_name: Some("Dana".into()),
            description: None,
            status: Status::new("new"),
            value_cents: Some(12_500_000),
            owner_id: UserId::new(),
            requested_machine: None,
            requested_attachments: None,
            trade_in: Some("old loader".into()),
            expected_close: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn draft_defaults_to_initial_status() {
        let statuses = StatusSet::default();
        let draft = OpportunityDraft::new("Loader", "Acme");
        assert_eq!(draft.validate(&statuses).unwrap(), Status::new("new"));
    }

    #[test]
    fn draft_requires_name_and_company() {
        let statuses = StatusSet::default();
        assert_eq!(
            OpportunityDraft::new("  ", "Acme").validate(&statuses),
            Err(CoreError::MissingField("name"))
        );
        assert_eq!(
            OpportunityDraft::new("Loader", "").validate(&statuses),
            Err(CoreError::MissingField("company"))
        );
    }

    #[test]
    fn draft_rejects_unknown_status() {
        let statuses = StatusSet::default();
        let draft = OpportunityDraft::new("Loader", "Acme").with_status(Status::new("archived"));
        assert_eq!(
            draft.validate(&statuses),
            Err(CoreError::UnknownStatus("archived".into()))
        );
    }

    #[test]
    fn patch_sets_and_clears_fields() {
        let mut record = sample();
        let patch = OpportunityPatch {
            name: Some("Two excavators".into()),
            contact_name: Some(None),
            value_cents: Some(Some(99)),
            ..OpportunityPatch::default()
        };
        patch.apply_to(&mut record);

        assert_eq!(record.name, "Two excavators");
        assert_eq!(record.contact_name, None);
        assert_eq!(record.value_cents, Some(99));
        assert_eq!(record.trade_in.as_deref(), Some("old loader"));
        assert_eq!(patch.changed_fields(), vec!["name", "contact_name", "value_cents"]);
    }

    #[test]
    fn patch_trims_name_and_company() {
        let mut record = sample();
        let patch = OpportunityPatch {
            name: Some("  Wheel loader ".into()),
            company: Some("Acme Rentals\n".into()),
            ..OpportunityPatch::default()
        };
        patch.apply_to(&mut record);
        assert_eq!(record.name, "Wheel loader");
        assert_eq!(record.company, "Acme Rentals");
    }

    #[test]
    fn patch_validation() {
        let statuses = StatusSet::default();
        assert!(OpportunityPatch::default().is_empty());
        assert!(OpportunityPatch::status(Status::new("won")).validate(&statuses).is_ok());
        let blank = OpportunityPatch {
            company: Some(String::new()),
            ..OpportunityPatch::default()
        };
        assert_eq!(blank.validate(&statuses), Err(CoreError::MissingField("company")));
    }
}

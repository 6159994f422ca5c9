use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const DEFAULT_STATUSES: [&str; 6] = ["new", "contacted", "qualified", "proposal", "won", "lost"];

/// A pipeline stage label. Membership is checked against a [`StatusSet`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(String);

impl Status {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({})", self.0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The ordered, deployment-defined set of statuses. Order is column order.
///
/// Transitions are flat: any member may move to any other member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet {
    statuses: Vec<Status>,
}

impl StatusSet {
    pub fn new<I, S>(labels: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut statuses: Vec<Status> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() {
                return Err(CoreError::InvalidStatusSet("blank status label".into()));
            }
            if label.chars().any(|c| c.is_uppercase() || c.is_whitespace()) {
                return Err(CoreError::InvalidStatusSet(format!(
                    "status label must be lowercase without spaces: {label}"
                )));
            }
            if statuses.iter().any(|s| s.as_str() == label) {
                return Err(CoreError::InvalidStatusSet(format!("duplicate status: {label}")));
            }
            statuses.push(Status::new(label));
        }
        if statuses.is_empty() {
            return Err(CoreError::InvalidStatusSet("at least one status is required".into()));
        }
        Ok(Self { statuses })
    }

    /// The status given to records created without one.
    pub fn initial(&self) -> &Status {
        &self.statuses[0]
    }

    pub fn contains(&self, status: &Status) -> bool {
        self.position(status).is_some()
    }

    pub fn position(&self, status: &Status) -> Option<usize> {
        self.statuses.iter().position(|s| s == status)
    }

    pub fn parse(&self, label: &str) -> Result<Status, CoreError> {
        self.statuses
            .iter()
            .find(|s| s.as_str() == label)
            .cloned()
            .ok_or_else(|| CoreError::UnknownStatus(label.to_string()))
    }

    pub fn require(&self, status: &Status) -> Result<(), CoreError> {
        if self.contains(status) {
            Ok(())
        } else {
            Err(CoreError::UnknownStatus(status.as_str().to_string()))
        }
    }

    /// Both ends must be members; no pair of members is forbidden.
    pub fn check_transition(&self, from: &Status, to: &Status) -> Result<(), CoreError> {
        self.require(from)?;
        self.require(to)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Status> {
        self.statuses.iter()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl Default for StatusSet {
    fn default() -> Self {
        Self {
            statuses: DEFAULT_STATUSES.iter().map(|s| Status::new(*s)).collect(),
        }
    }
}

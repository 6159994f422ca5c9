use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use dealflow_core::{
    CallNote, EventKind, Expense, MonotonicClock, NewCallNote, NewExpense, Opportunity,
    OpportunityDraft, OpportunityEvent, OpportunityPatch, Principal, Role, Status, StatusSet, User,
    clock::from_millis, ids::*,
};

use crate::error::StorageError;
use crate::traits::{ActivityStore, OpportunityFilter, RecordStore, TimeRange, UserStore};

const OPPORTUNITY_COLUMNS: &str = "opportunity_id, name, company, contact_name, description, status, value_cents, owner_id, requested_machine, requested_attachments, trade_in, expected_close, created_at, updated_at";

fn to_timestamp(ms: i64, label: &str) -> Result<DateTime<Utc>, StorageError> {
    from_millis(ms).ok_or_else(|| StorageError::Serialization(format!("invalid {label}: {ms}")))
}

fn to_date(s: &str, label: &str) -> Result<NaiveDate, StorageError> {
    s.parse::<NaiveDate>()
        .map_err(|e| StorageError::Serialization(format!("invalid {label} {s:?}: {e}")))
}

/// Maps SQLite constraint failures (foreign keys, checks) onto `ConstraintViolation`.
fn constraint_error(err: rusqlite::Error, context: &str) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(code, msg)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let detail = msg.unwrap_or_else(|| code.to_string());
            StorageError::ConstraintViolation(format!("{context}: {detail}"))
        }
        other => StorageError::Sqlite(other),
    }
}

/// SQLite-backed store of record. One connection, serialized behind a mutex
/// that is never held across an await.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Mutex<MonotonicClock>,
    statuses: StatusSet,
}

impl SqliteStore {
    pub fn open(path: &str, statuses: StatusSet) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self::with_connection(conn, statuses))
    }

    pub fn open_in_memory(statuses: StatusSet) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self::with_connection(conn, statuses))
    }

    fn with_connection(conn: Connection, statuses: StatusSet) -> Self {
        Self {
            conn: Mutex::new(conn),
            clock: Mutex::new(MonotonicClock::new()),
            statuses,
        }
    }

    pub fn statuses(&self) -> &StatusSet {
        &self.statuses
    }

    pub fn schema_version(&self) -> Result<i32, StorageError> {
        crate::schema::schema_version(&self.conn.lock())
    }

    fn list_opportunities_sync(
        &self,
        principal: &Principal,
        filter: &OpportunityFilter,
    ) -> Result<Vec<Opportunity>, StorageError> {
        let owner = if principal.is_admin() {
            filter.owner_id
        } else {
            match filter.owner_id {
                Some(owner) if owner != principal.user_id => return Ok(Vec::new()),
                _ => Some(principal.user_id),
            }
        };

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities
             WHERE (?1 IS NULL OR owner_id = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    owner.map(|o| o.to_string()),
                    filter.status.as_ref().map(|s| s.as_str().to_string()),
                ],
                OpportunityRow::read,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(OpportunityRow::into_record).collect()
    }

    fn get_opportunity_sync(
        &self,
        principal: &Principal,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, StorageError> {
        let conn = self.conn.lock();
        match select_opportunity(&conn, id)? {
            Some(record) if !principal.can_access(record.owner_id) => Err(
                StorageError::AccessDenied(format!("opportunity {id} is not visible to this user")),
            ),
            other => Ok(other),
        }
    }

    fn insert_opportunity_sync(
        &self,
        principal: &Principal,
        draft: &OpportunityDraft,
    ) -> Result<Opportunity, StorageError> {
        let status = draft.validate(&self.statuses)?;
        let owner_id = match draft.owner_id {
            Some(owner) if owner != principal.user_id && !principal.is_admin() => {
                return Err(StorageError::AccessDenied(
                    "only admins may assign another owner".into(),
                ));
            }
            Some(owner) => owner,
            None => principal.user_id,
        };
        let now = self.clock.lock().tick();
        let record = Opportunity {
            id: OpportunityId::new(),
            name: draft.name.trim().to_string(),
            company: draft.company.trim().to_string(),
            contact_name: draft.contact_name.clone(),
            description: draft.description.clone(),
            status: status.clone(),
            value_cents: draft.value_cents,
            owner_id,
            requested_machine: draft.requested_machine.clone(),
            requested_attachments: draft.requested_attachments.clone(),
            trade_in: draft.trade_in.clone(),
            expected_close: draft.expected_close,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO opportunities ({OPPORTUNITY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            rusqlite::params![
                record.id.to_string(),
                record.name,
                record.company,
                record.contact_name,
                record.description,
                record.status.as_str(),
                record.value_cents,
                record.owner_id.to_string(),
                record.requested_machine,
                record.requested_attachments,
                record.trade_in,
                record.expected_close.map(|d| d.to_string()),
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
            ],
        )
        .map_err(|e| constraint_error(e, "insert opportunity"))?;
        insert_event(
            &tx,
            &OpportunityEvent {
                opportunity_id: record.id,
                actor_id: principal.user_id,
                at: now,
                kind: EventKind::Created,
                from_status: None,
                to_status: Some(status),
                changed_fields: Vec::new(),
            },
        )?;
        tx.commit()?;

        debug!(opportunity_id = %record.id, status = %record.status, "opportunity inserted");
        Ok(record)
    }

    fn update_opportunity_sync(
        &self,
        principal: &Principal,
        id: OpportunityId,
        patch: &OpportunityPatch,
    ) -> Result<Opportunity, StorageError> {
        patch.validate(&self.statuses)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut record = select_opportunity(&tx, id)?
            .ok_or_else(|| StorageError::NotFound(format!("opportunity {id}")))?;
        if !principal.can_access(record.owner_id) {
            return Err(StorageError::AccessDenied(format!(
                "opportunity {id} is owned by another user"
            )));
        }

        let from_status = record.status.clone();
        patch.apply_to(&mut record);
        record.updated_at = self.clock.lock().tick_after(record.updated_at);

        tx.execute(
            "UPDATE opportunities SET name = ?1, company = ?2, contact_name = ?3, description = ?4,
                 status = ?5, value_cents = ?6, requested_machine = ?7, requested_attachments = ?8,
                 trade_in = ?9, expected_close = ?10, updated_at = ?11
             WHERE opportunity_id = ?12",
            rusqlite::params![
                record.name,
                record.company,
                record.contact_name,
                record.description,
                record.status.as_str(),
                record.value_cents,
                record.requested_machine,
                record.requested_attachments,
                record.trade_in,
                record.expected_close.map(|d| d.to_string()),
                record.updated_at.timestamp_millis(),
                id.to_string(),
            ],
        )
        .map_err(|e| constraint_error(e, "update opportunity"))?;

        let status_changed = record.status != from_status;
        insert_event(
            &tx,
            &OpportunityEvent {
                opportunity_id: id,
                actor_id: principal.user_id,
                at: record.updated_at,
                kind: if status_changed {
                    EventKind::StatusChanged
                } else {
                    EventKind::Edited
                },
                from_status: status_changed.then_some(from_status),
                to_status: status_changed.then(|| record.status.clone()),
                changed_fields: patch.changed_fields().iter().map(|f| f.to_string()).collect(),
            },
        )?;
        tx.commit()?;

        debug!(opportunity_id = %id, status = %record.status, "opportunity updated");
        Ok(record)
    }

    fn list_events_sync(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<OpportunityEvent>, StorageError> {
        let owner = (!principal.is_admin()).then(|| principal.user_id.to_string());
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT e.opportunity_id, e.actor_id, e.at, e.kind, e.from_status, e.to_status, e.changed_fields
             FROM opportunity_events e
             JOIN opportunities o ON o.opportunity_id = e.opportunity_id
             WHERE e.at >= ?1 AND e.at < ?2 AND (?3 IS NULL OR o.owner_id = ?3)
             ORDER BY e.at, e.rowid",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    range.start.timestamp_millis(),
                    range.end.timestamp_millis(),
                    owner,
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut events = Vec::with_capacity(rows.len());
        for (opportunity_id, actor_id, at, kind, from_status, to_status, changed) in rows {
            let changed_fields: Vec<String> = rmp_serde::from_slice(&changed)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            events.push(OpportunityEvent {
                opportunity_id: OpportunityId::parse(&opportunity_id)?,
                actor_id: UserId::parse(&actor_id)?,
                at: to_timestamp(at, "event time")?,
                kind: EventKind::parse(&kind)?,
                from_status: from_status.map(Status::new),
                to_status: to_status.map(Status::new),
                changed_fields,
            });
        }
        Ok(events)
    }

    fn upsert_user_sync(&self, user: &User) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (user_id, email, role, display_name) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET email = excluded.email, role = excluded.role, display_name = excluded.display_name",
            rusqlite::params![
                user.id.to_string(),
                user.email,
                user.role.as_str(),
                user.display_name,
            ],
        )
        .map_err(|e| constraint_error(e, "upsert user"))?;
        Ok(())
    }

    fn get_user_sync(&self, id: UserId) -> Result<Option<User>, StorageError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT email, role, display_name FROM users WHERE user_id = ?1",
                rusqlite::params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((email, role, display_name)) => Ok(Some(User {
                id,
                email,
                role: Role::parse(&role)?,
                display_name,
            })),
            None => Ok(None),
        }
    }

    /// Fails unless the opportunity exists and the principal may reach it.
    fn require_accessible(
        conn: &Connection,
        principal: &Principal,
        id: OpportunityId,
    ) -> Result<(), StorageError> {
        let owner: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM opportunities WHERE opportunity_id = ?1",
                rusqlite::params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let owner = owner.ok_or_else(|| StorageError::NotFound(format!("opportunity {id}")))?;
        if !principal.can_access(UserId::parse(&owner)?) {
            return Err(StorageError::AccessDenied(format!(
                "opportunity {id} is owned by another user"
            )));
        }
        Ok(())
    }

    fn insert_call_note_sync(
        &self,
        principal: &Principal,
        note: &NewCallNote,
    ) -> Result<CallNote, StorageError> {
        note.validate()?;
        let created_at = self.clock.lock().tick();
        let record = CallNote {
            id: CallNoteId::new(),
            opportunity_id: note.opportunity_id,
            author_id: principal.user_id,
            summary: note.summary.trim().to_string(),
            occurred_at: note.occurred_at,
            created_at,
        };

        let conn = self.conn.lock();
        Self::require_accessible(&conn, principal, note.opportunity_id)?;
        conn.execute(
            "INSERT INTO call_notes (call_note_id, opportunity_id, author_id, summary, occurred_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.id.to_string(),
                record.opportunity_id.to_string(),
                record.author_id.to_string(),
                record.summary,
                record.occurred_at.timestamp_millis(),
                record.created_at.timestamp_millis(),
            ],
        )
        .map_err(|e| constraint_error(e, "insert call note"))?;
        Ok(record)
    }

    fn list_call_notes_sync(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<CallNote>, StorageError> {
        let author = (!principal.is_admin()).then(|| principal.user_id.to_string());
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT call_note_id, opportunity_id, author_id, summary, occurred_at, created_at
             FROM call_notes
             WHERE occurred_at >= ?1 AND occurred_at < ?2 AND (?3 IS NULL OR author_id = ?3)
             ORDER BY occurred_at, rowid",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    range.start.timestamp_millis(),
                    range.end.timestamp_millis(),
                    author,
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, opportunity_id, author_id, summary, occurred_at, created_at)|
                 -> Result<CallNote, StorageError> {
                Ok(CallNote {
                    id: CallNoteId::parse(&id)?,
                    opportunity_id: OpportunityId::parse(&opportunity_id)?,
                    author_id: UserId::parse(&author_id)?,
                    summary,
                    occurred_at: to_timestamp(occurred_at, "occurred_at")?,
                    created_at: to_timestamp(created_at, "created_at")?,
                })
            })
            .collect()
    }

    fn insert_expense_sync(
        &self,
        principal: &Principal,
        expense: &NewExpense,
    ) -> Result<Expense, StorageError> {
        expense.validate()?;
        let created_at = self.clock.lock().tick();
        let record = Expense {
            id: ExpenseId::new(),
            owner_id: principal.user_id,
            opportunity_id: expense.opportunity_id,
            category: expense.category.trim().to_string(),
            amount_cents: expense.amount_cents,
            description: expense.description.clone(),
            incurred_on: expense.incurred_on,
            created_at,
        };

        let conn = self.conn.lock();
        if let Some(opportunity_id) = expense.opportunity_id {
            Self::require_accessible(&conn, principal, opportunity_id)?;
        }
        conn.execute(
            "INSERT INTO expenses (expense_id, owner_id, opportunity_id, category, amount_cents, description, incurred_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                record.id.to_string(),
                record.owner_id.to_string(),
                record.opportunity_id.map(|id| id.to_string()),
                record.category,
                record.amount_cents,
                record.description,
                record.incurred_on.to_string(),
                record.created_at.timestamp_millis(),
            ],
        )
        .map_err(|e| constraint_error(e, "insert expense"))?;
        Ok(record)
    }

    fn list_expenses_sync(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<Expense>, StorageError> {
        let owner = (!principal.is_admin()).then(|| principal.user_id.to_string());
        let (start, end) = range.date_bounds();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT expense_id, owner_id, opportunity_id, category, amount_cents, description, incurred_on, created_at
             FROM expenses
             WHERE incurred_on >= ?1 AND incurred_on < ?2 AND (?3 IS NULL OR owner_id = ?3)
             ORDER BY incurred_on, rowid",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![start.to_string(), end.to_string(), owner],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut expenses = Vec::with_capacity(rows.len());
        for (id, owner_id, opportunity_id, category, amount_cents, description, incurred_on, created_at) in rows {
            expenses.push(Expense {
                id: ExpenseId::parse(&id)?,
                owner_id: UserId::parse(&owner_id)?,
                opportunity_id: opportunity_id.as_deref().map(OpportunityId::parse).transpose()?,
                category,
                amount_cents,
                description,
                incurred_on: to_date(&incurred_on, "incurred_on")?,
                created_at: to_timestamp(created_at, "created_at")?,
            });
        }
        Ok(expenses)
    }
}

/// Raw column values of one `opportunities` row.
struct OpportunityRow {
    id: String,
    name: String,
    company: String,
    contact_name: Option<String>,
    description: Option<String>,
    status: String,
    value_cents: Option<i64>,
    owner_id: String,
    requested_machine: Option<String>,
    requested_attachments: Option<String>,
    trade_in: Option<String>,
    expected_close: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl OpportunityRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            company: row.get(2)?,
            contact_name: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            value_cents: row.get(6)?,
            owner_id: row.get(7)?,
            requested_machine: row.get(8)?,
            requested_attachments: row.get(9)?,
            trade_in: row.get(10)?,
            expected_close: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    /// Status labels are passed through as stored; callers decide what to do
    /// with labels their status set no longer knows.
    fn into_record(self) -> Result<Opportunity, StorageError> {
        Ok(Opportunity {
            id: OpportunityId::parse(&self.id)?,
            name: self.name,
            company: self.company,
            contact_name: self.contact_name,
            description: self.description,
            status: Status::new(self.status),
            value_cents: self.value_cents,
            owner_id: UserId::parse(&self.owner_id)?,
            requested_machine: self.requested_machine,
            requested_attachments: self.requested_attachments,
            trade_in: self.trade_in,
            expected_close: self
                .expected_close
                .as_deref()
                .map(|d| to_date(d, "expected_close"))
                .transpose()?,
            created_at: to_timestamp(self.created_at, "created_at")?,
            updated_at: to_timestamp(self.updated_at, "updated_at")?,
        })
    }
}

fn select_opportunity(
    conn: &Connection,
    id: OpportunityId,
) -> Result<Option<Opportunity>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {OPPORTUNITY_COLUMNS} FROM opportunities WHERE opportunity_id = ?1"),
            rusqlite::params![id.to_string()],
            OpportunityRow::read,
        )
        .optional()?;
    row.map(OpportunityRow::into_record).transpose()
}

fn insert_event(conn: &Connection, event: &OpportunityEvent) -> Result<(), StorageError> {
    let changed = rmp_serde::to_vec(&event.changed_fields)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO opportunity_events (opportunity_id, actor_id, at, kind, from_status, to_status, changed_fields)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            event.opportunity_id.to_string(),
            event.actor_id.to_string(),
            event.at.timestamp_millis(),
            event.kind.as_str(),
            event.from_status.as_ref().map(|s| s.as_str().to_string()),
            event.to_status.as_ref().map(|s| s.as_str().to_string()),
            changed,
        ],
    )
    .map_err(|e| constraint_error(e, "insert event"))?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_opportunities(
        &self,
        principal: &Principal,
        filter: &OpportunityFilter,
    ) -> Result<Vec<Opportunity>, StorageError> {
        self.list_opportunities_sync(principal, filter)
    }

    async fn get_opportunity(
        &self,
        principal: &Principal,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, StorageError> {
        self.get_opportunity_sync(principal, id)
    }

    async fn insert_opportunity(
        &self,
        principal: &Principal,
        draft: &OpportunityDraft,
    ) -> Result<Opportunity, StorageError> {
        self.insert_opportunity_sync(principal, draft)
    }

    async fn update_opportunity(
        &self,
        principal: &Principal,
        id: OpportunityId,
        patch: &OpportunityPatch,
    ) -> Result<Opportunity, StorageError> {
        self.update_opportunity_sync(principal, id, patch)
    }

    async fn list_events(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<OpportunityEvent>, StorageError> {
        self.list_events_sync(principal, range)
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        self.upsert_user_sync(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        self.get_user_sync(id)
    }
}

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn insert_call_note(
        &self,
        principal: &Principal,
        note: &NewCallNote,
    ) -> Result<CallNote, StorageError> {
        self.insert_call_note_sync(principal, note)
    }

    async fn list_call_notes(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<CallNote>, StorageError> {
        self.list_call_notes_sync(principal, range)
    }

    async fn insert_expense(
        &self,
        principal: &Principal,
        expense: &NewExpense,
    ) -> Result<Expense, StorageError> {
        self.insert_expense_sync(principal, expense)
    }

    async fn list_expenses(
        &self,
        principal: &Principal,
        range: &TimeRange,
    ) -> Result<Vec<Expense>, StorageError> {
        self.list_expenses_sync(principal, range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store_with_users() -> (SqliteStore, User, User, User) {
        let store = SqliteStore::open_in_memory(StatusSet::default()).unwrap();
        let admin = User::new("ops@example.com", Role::Admin, "Ops");
        let alice = User::new("alice@example.com", Role::Submitter, "Alice");
        let bob = User::new("bob@example.com", Role::Submitter, "Bob");
        for user in [&admin, &alice, &bob] {
            store.upsert_user_sync(user).unwrap();
        }
        (store, admin, alice, bob)
    }

    fn wide_range() -> TimeRange {
        let now = Utc::now();
        TimeRange::new(now - Duration::days(1), now + Duration::days(1))
    }

    #[test]
    fn schema_is_versioned() {
        let (store, ..) = store_with_users();
        assert_eq!(store.schema_version().unwrap(), crate::schema::SCHEMA_VERSION);
    }

    #[test]
    fn insert_defaults_status_and_owner() {
        let (store, _, alice, _) = store_with_users();
        let record = store
            .insert_opportunity_sync(&alice.principal(), &OpportunityDraft::new(" Loader ", "Acme"))
            .unwrap();
        assert_eq!(record.status, Status::new("new"));
        assert_eq!(record.owner_id, alice.id);
        assert_eq!(record.name, "Loader");
        assert_eq!(record.created_at, record.updated_at);

        let fetched = store.get_opportunity_sync(&alice.principal(), record.id).unwrap();
        assert_eq!(fetched, Some(record));
    }

    #[test]
    fn submitters_only_list_their_rows() {
        let (store, admin, alice, bob) = store_with_users();
        store
            .insert_opportunity_sync(&alice.principal(), &OpportunityDraft::new("A1", "Acme"))
            .unwrap();
        store
            .insert_opportunity_sync(&alice.principal(), &OpportunityDraft::new("A2", "Acme"))
            .unwrap();
        store
            .insert_opportunity_sync(&bob.principal(), &OpportunityDraft::new("B1", "Bolt"))
            .unwrap();

        let all = store
            .list_opportunities_sync(&admin.principal(), &OpportunityFilter::all())
            .unwrap();
        assert_eq!(all.len(), 3);

        let mine = store
            .list_opportunities_sync(&alice.principal(), &OpportunityFilter::all())
            .unwrap();
        let names: Vec<&str> = mine.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["A2", "A1"]);

        let peeking = store
            .list_opportunities_sync(&alice.principal(), &OpportunityFilter::owned_by(bob.id))
            .unwrap();
        assert!(peeking.is_empty());
    }

    #[test]
    fn status_filter() {
        let (store, admin, alice, _) = store_with_users();
        store
            .insert_opportunity_sync(
                &alice.principal(),
                &OpportunityDraft::new("Won deal", "Acme").with_status(Status::new("won")),
            )
            .unwrap();
        store
            .insert_opportunity_sync(&alice.principal(), &OpportunityDraft::new("Fresh", "Acme"))
            .unwrap();

        let filter = OpportunityFilter {
            owner_id: None,
            status: Some(Status::new("won")),
        };
        let won = store.list_opportunities_sync(&admin.principal(), &filter).unwrap();
        assert_eq!(won.len(), 1);
        assert_eq!(won[0].name, "Won deal");
    }

    #[test]
    fn update_refreshes_updated_at_and_records_event() {
        let (store, admin, alice, _) = store_with_users();
        let record = store
            .insert_opportunity_sync(&alice.principal(), &OpportunityDraft::new("Loader", "Acme"))
            .unwrap();

        let updated = store
            .update_opportunity_sync(
                &alice.principal(),
                record.id,
                &OpportunityPatch::status(Status::new("qualified")),
            )
            .unwrap();
        assert_eq!(updated.status, Status::new("qualified"));
        assert!(updated.updated_at >= record.updated_at);

        let events = store.list_events_sync(&admin.principal(), &wide_range()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Created);
        assert_eq!(events[1].kind, EventKind::StatusChanged);
        assert_eq!(events[1].from_status, Some(Status::new("new")));
        assert_eq!(events[1].to_status, Some(Status::new("qualified")));
        assert_eq!(events[1].changed_fields, vec!["status".to_string()]);
    }

    #[test]
    fn insert_and_update_trim_text_alike() {
        let (store, _, alice, _) = store_with_users();
        let inserted = store
            .insert_opportunity_sync(&alice.principal(), &OpportunityDraft::new(" Loader ", " Acme "))
            .unwrap();
        let patch = OpportunityPatch {
            name: Some(" Loader ".into()),
            company: Some("  Acme\t".into()),
            ..OpportunityPatch::default()
        };
        let updated = store
            .update_opportunity_sync(&alice.principal(), inserted.id, &patch)
            .unwrap();
        assert_eq!((updated.name.as_str(), updated.company.as_str()), ("Loader", "Acme"));
        let fetched = store
            .get_opportunity_sync(&alice.principal(), inserted.id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.name, inserted.name);
        assert_eq!(fetched.company, inserted.company);
    }

    #[test]
    fn submitter_cannot_update_foreign_row() {
        let (store, _, alice, bob) = store_with_users();
        let record = store
            .insert_opportunity_sync(&bob.principal(), &OpportunityDraft::new("B1", "Bolt"))
            .unwrap();
        let err = store
            .update_opportunity_sync(
                &alice.principal(),
                record.id,
                &OpportunityPatch::status(Status::new("won")),
            )
            .unwrap_err();
        assert_eq!(err.code(), "access_denied");
    }

    #[test]
    fn update_missing_row_is_not_found() {
        let (store, admin, ..) = store_with_users();
        let err = store
            .update_opportunity_sync(
                &admin.principal(),
                OpportunityId::new(),
                &OpportunityPatch::status(Status::new("won")),
            )
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn unknown_status_and_owner_rejected() {
        let (store, admin, alice, _) = store_with_users();
        let err = store
            .insert_opportunity_sync(
                &alice.principal(),
                &OpportunityDraft::new("Loader", "Acme").with_status(Status::new("archived")),
            )
            .unwrap_err();
        assert_eq!(err.code(), "invalid_data");

        let orphan = OpportunityDraft {
            owner_id: Some(UserId::new()),
            ..OpportunityDraft::new("Loader", "Acme")
        };
        let err = store.insert_opportunity_sync(&admin.principal(), &orphan).unwrap_err();
        assert_eq!(err.code(), "constraint_violation");

        let err = store.insert_opportunity_sync(&alice.principal(), &orphan).unwrap_err();
        assert_eq!(err.code(), "access_denied");
    }

    #[test]
    fn call_notes_and_expenses_follow_ownership() {
        let (store, admin, alice, bob) = store_with_users();
        let deal = store
            .insert_opportunity_sync(&alice.principal(), &OpportunityDraft::new("Loader", "Acme"))
            .unwrap();

        store
            .insert_call_note_sync(
                &alice.principal(),
                &NewCallNote {
                    opportunity_id: deal.id,
                    summary: "Walked the yard".into(),
                    occurred_at: Utc::now(),
                },
            )
            .unwrap();
        let err = store
            .insert_call_note_sync(
                &bob.principal(),
                &NewCallNote {
                    opportunity_id: deal.id,
                    summary: "Sneaky".into(),
                    occurred_at: Utc::now(),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "access_denied");

        let today = Utc::now().date_naive();
        store
            .insert_expense_sync(
                &alice.principal(),
                &NewExpense {
                    opportunity_id: Some(deal.id),
                    category: "fuel".into(),
                    amount_cents: 6_400,
                    description: None,
                    incurred_on: today,
                },
            )
            .unwrap();

        let range = wide_range();
        assert_eq!(store.list_call_notes_sync(&admin.principal(), &range).unwrap().len(), 1);
        assert!(store.list_call_notes_sync(&bob.principal(), &range).unwrap().is_empty());
        let expenses = store.list_expenses_sync(&alice.principal(), &range).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount_cents, 6_400);
        assert!(store.list_expenses_sync(&bob.principal(), &range).unwrap().is_empty());
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dealflow.db");
        let path = path.to_str().unwrap();
        let alice = User::new("alice@example.com", Role::Submitter, "Alice");

        let id = {
            let store = SqliteStore::open(path, StatusSet::default()).unwrap();
            store.upsert_user_sync(&alice).unwrap();
            store
                .insert_opportunity_sync(&alice.principal(), &OpportunityDraft::new("Loader", "Acme"))
                .unwrap()
                .id
        };

        let reopened = SqliteStore::open(path, StatusSet::default()).unwrap();
        assert_eq!(reopened.get_user_sync(alice.id).unwrap(), Some(alice.clone()));
        let record = reopened.get_opportunity_sync(&alice.principal(), id).unwrap();
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn trait_object_roundtrip() {
        let (store, _, alice, _) = store_with_users();
        let store: &dyn RecordStore = &store;
        let record = store
            .insert_opportunity(&alice.principal(), &OpportunityDraft::new("Loader", "Acme"))
            .await
            .unwrap();
        let listed = store
            .list_opportunities(&alice.principal(), &OpportunityFilter::all())
            .await
            .unwrap();
        assert_eq!(listed, vec![record]);
    }
}

use std::sync::Arc;

use dealflow_core::{Opportunity, OpportunityDraft, Role, Status, StatusSet, User};
use dealflow_engine::Pipeline;
use dealflow_storage::{RecordStore, StorageError, UserStore};

use crate::fixtures::{RecordingNotifier, StaticSession, init_test_tracing};
use crate::scripted::ScriptedStore;

/// One admin, one submitter and a pipeline over a scripted store, signed in
/// as the admin.
pub struct TestWorld {
    pub store: Arc<ScriptedStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub session: Arc<StaticSession>,
    pub admin: User,
    pub submitter: User,
    pub pipeline: Pipeline,
}

impl TestWorld {
    pub async fn new() -> Result<Self, StorageError> {
        Self::with_statuses(StatusSet::default()).await
    }

    pub async fn with_statuses(statuses: StatusSet) -> Result<Self, StorageError> {
        init_test_tracing();
        let store = Arc::new(ScriptedStore::new(statuses.clone())?);
        let admin = User::new("admin@dealflow.test", Role::Admin, "Ada Admin");
        let submitter = User::new("rep@dealflow.test", Role::Submitter, "Sam Submitter");
        store.upsert_user(&admin).await?;
        store.upsert_user(&submitter).await?;

        let notifier = Arc::new(RecordingNotifier::new());
        let session = Arc::new(StaticSession::signed_in(admin.principal()));
        let pipeline = Pipeline::new(
            store.clone(),
            session.clone(),
            notifier.clone(),
            statuses,
        );
        Ok(Self {
            store,
            notifier,
            session,
            admin,
            submitter,
            pipeline,
        })
    }

    /// Opens a second view over the same store and session.
    pub fn another_pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.store.clone(),
            self.session.clone(),
            self.notifier.clone(),
            self.pipeline.statuses().clone(),
        )
    }

    pub fn sign_in(&self, user: &User) {
        self.session.set(Some(user.principal()));
    }

    pub fn sign_out(&self) {
        self.session.set(None);
    }

    pub fn status(&self, label: &str) -> Status {
        Status::new(label)
    }

    /// Writes a record straight to the backing store, outside the script and
    /// the call log.
    pub async fn seed(
        &self,
        owner: &User,
        name: &str,
        status: &str,
    ) -> Result<Opportunity, StorageError> {
        let draft = OpportunityDraft::new(name, "Acme Equipment").with_status(Status::new(status));
        self.store
            .inner()
            .insert_opportunity(&owner.principal(), &draft)
            .await
    }

    /// Seeds the given records and loads the pipeline, then clears the call
    /// log and the notices.
    pub async fn seeded(
        &self,
        records: &[(&User, &str, &str)],
    ) -> Result<Vec<Opportunity>, Box<dyn std::error::Error>> {
        let mut seeded = Vec::with_capacity(records.len());
        for (owner, name, status) in records {
            seeded.push(self.seed(owner, name, status).await?);
        }
        self.pipeline.load().await?;
        self.store.clear_calls();
        self.notifier.clear();
        Ok(seeded)
    }
}

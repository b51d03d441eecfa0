//! Sync adapter for activities.
//!
//! Activities hang off a (subject, term) pair and optionally a parent
//! activity; all three references must resolve to server identities
//! before the row can be pushed. The weight-sum rule lives server-side
//! and surfaces here as a rejection.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use gradebook_api::{
    Activity, ActivityDto, ActivityPayload, ApiError, ApiResult, EntityRef, Mirrored,
    RemoteBackend, ServerId, Subject, SyncState, Term,
};

use super::push::{drain_pending, RemoteMutator};
use super::{scope_encodings, SyncAdapter};
use crate::error::{EngineError, EngineResult};
use crate::storage::{MirrorStore, MutationKind};
use crate::sync::connectivity::ConnectivityMonitor;
use crate::sync::report::{EntityPull, EntityPush};

pub struct ActivitiesAdapter {
    store: Arc<MirrorStore>,
    remote: Arc<dyn RemoteBackend>,
    net: Arc<ConnectivityMonitor>,
}

fn activity_payload(activity: &Activity) -> Option<ActivityPayload> {
    let subject = activity.subject.server_id()?;
    let term = activity.term.server_id()?;
    let parent_id = match activity.parent {
        Some(parent) => Some(parent.server_id()?.0),
        None => None,
    };
    Some(ActivityPayload {
        name: activity.name.clone(),
        description: activity.description.clone(),
        weight: activity.weight,
        subject_id: subject.0,
        term_id: term.0,
        parent_id,
        averaged: activity.averaged,
        date: activity.date,
    })
}

impl ActivitiesAdapter {
    pub fn new(
        store: Arc<MirrorStore>,
        remote: Arc<dyn RemoteBackend>,
        net: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self { store, remote, net }
    }

    /// Merged list of activities for one (subject, term) scope.
    pub async fn list(
        &self,
        subject: EntityRef,
        term: EntityRef,
    ) -> EngineResult<Vec<Mirrored<Activity>>> {
        let subject_row = self.store.get_by_ref::<Subject>(subject).await?;
        let term_row = self.store.get_by_ref::<Term>(term).await?;

        let remote_scope = subject_row
            .as_ref()
            .and_then(|r| r.server_id)
            .or(subject.server_id())
            .zip(term_row.as_ref().and_then(|r| r.server_id).or(term.server_id()));

        if self.net.network_present() {
            if let Some((subject_id, term_id)) = remote_scope {
                match self.remote.list_activities(subject_id, term_id).await {
                    Ok(dtos) => {
                        self.net.note_success();
                        let rows = dtos.into_iter().map(ActivityDto::into_pair).collect();
                        self.store.upsert_from_remote::<Activity>(rows, false).await?;
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "activity refresh failed, serving mirror");
                    }
                }
            }
        }

        let filters = [
            ("subject_ref", scope_encodings(subject_row.as_ref(), subject)),
            ("term_ref", scope_encodings(term_row.as_ref(), term)),
        ];
        Ok(self.store.list_live_matching::<Activity>(&filters).await?)
    }

    pub async fn create(&self, activity: Activity) -> EngineResult<Mirrored<Activity>> {
        if self.net.network_present() {
            if let Some(payload) = activity_payload(&activity) {
                match self.remote.create_activity(&payload).await {
                    Ok(dto) => {
                        self.net.note_success();
                        let (id, entity) = dto.into_pair();
                        return Ok(self.store.write_through(id, entity).await?);
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "activity create failed, recording locally");
                    }
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(None, activity, MutationKind::Create)
            .await?)
    }

    pub async fn update(
        &self,
        target: EntityRef,
        activity: Activity,
    ) -> EngineResult<Mirrored<Activity>> {
        if self.net.network_present() {
            if let (Some(id), Some(payload)) = (target.server_id(), activity_payload(&activity)) {
                match self.remote.update_activity(id, &payload).await {
                    Ok(()) => {
                        self.net.note_success();
                        return Ok(self.store.write_through(id, activity).await?);
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "activity update failed, recording locally");
                    }
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(Some(target), activity, MutationKind::Update)
            .await?)
    }

    pub async fn delete(&self, target: EntityRef) -> EngineResult<()> {
        let row = self.store.get_by_ref::<Activity>(target).await?;
        let server_id = row.as_ref().and_then(|r| r.server_id).or(target.server_id());

        if self.net.network_present() {
            if let Some(id) = server_id {
                match self.remote.delete_activity(id).await {
                    Ok(()) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Activity>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.status() == Some(404) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Activity>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "activity delete failed, recording locally");
                    }
                }
            }
        }

        match row {
            Some(row) => {
                self.store
                    .record_local_mutation(
                        Some(EntityRef::Local(row.local_id)),
                        row.entity,
                        MutationKind::Delete,
                    )
                    .await?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteMutator<Activity> for ActivitiesAdapter {
    fn entity_name(&self) -> &'static str {
        "activities"
    }

    fn push_ready(&self, row: &Mirrored<Activity>) -> Result<(), String> {
        if row.state == SyncState::PendingDelete {
            return Ok(());
        }
        if row.entity.subject.is_local() {
            return Err(format!("subject {} has no server identity yet", row.entity.subject));
        }
        if row.entity.term.is_local() {
            return Err(format!("term {} has no server identity yet", row.entity.term));
        }
        if let Some(parent) = row.entity.parent {
            if parent.is_local() {
                return Err(format!("parent activity {parent} has no server identity yet"));
            }
        }
        Ok(())
    }

    async fn push_create(&self, row: &Mirrored<Activity>) -> ApiResult<ServerId> {
        let payload = activity_payload(&row.entity)
            .ok_or_else(|| ApiError::Transport("activity references unresolved".to_string()))?;
        let dto = self.remote.create_activity(&payload).await?;
        Ok(ServerId(dto.id))
    }

    async fn push_update(&self, id: ServerId, row: &Mirrored<Activity>) -> ApiResult<()> {
        let payload = activity_payload(&row.entity)
            .ok_or_else(|| ApiError::Transport("activity references unresolved".to_string()))?;
        self.remote.update_activity(id, &payload).await
    }

    async fn push_delete(&self, id: ServerId) -> ApiResult<()> {
        self.remote.delete_activity(id).await
    }
}

#[async_trait]
impl SyncAdapter for ActivitiesAdapter {
    fn entity_name(&self) -> &'static str {
        "activities"
    }

    async fn push_pending(&self) -> EntityPush {
        drain_pending::<Activity, _>(&self.store, &self.net, self).await
    }

    /// Pulled per (subject, active term) scope. Inactive terms keep their
    /// mirrored rows and refresh on demand through `list`.
    async fn pull(&self) -> EntityPull {
        let mut report = EntityPull::new("activities");

        let subjects = match self.store.list_live::<Subject>().await {
            Ok(rows) => rows,
            Err(err) => {
                report.fail(err);
                return report;
            }
        };
        let terms = match self.store.list_live::<Term>().await {
            Ok(rows) => rows,
            Err(err) => {
                report.fail(err);
                return report;
            }
        };

        for subject in &subjects {
            let Some(subject_id) = subject.server_id else {
                continue;
            };
            for term in terms.iter().filter(|t| t.entity.active) {
                let Some(term_id) = term.server_id else {
                    continue;
                };
                match self.remote.list_activities(subject_id, term_id).await {
                    Ok(dtos) => {
                        self.net.note_success();
                        let rows = dtos.into_iter().map(ActivityDto::into_pair).collect();
                        match self.store.upsert_from_remote::<Activity>(rows, false).await {
                            Ok(summary) => report.absorb(&summary),
                            Err(err) => report.fail(err),
                        }
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        report.fail(err);
                    }
                }
            }
        }
        report
    }
}

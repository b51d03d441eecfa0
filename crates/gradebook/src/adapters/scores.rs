//! Sync adapter for scores.
//!
//! A score's logical key is the (student, activity) pair: the backend
//! POST upserts on it, so both create and update pushes go through the
//! same endpoint. Pulls use the bulk export instead of one list call per
//! activity.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use gradebook_api::{
    Activity, ApiError, ApiResult, EntityRef, Mirrored, RemoteBackend, Score, ScoreDto,
    ScorePayload, ServerId, Student, SyncState,
};

use super::push::{drain_pending, RemoteMutator};
use super::SyncAdapter;
use crate::error::{EngineError, EngineResult};
use crate::storage::{MirrorStore, MutationKind};
use crate::sync::connectivity::ConnectivityMonitor;
use crate::sync::report::{EntityPull, EntityPush};

pub struct ScoresAdapter {
    store: Arc<MirrorStore>,
    remote: Arc<dyn RemoteBackend>,
    net: Arc<ConnectivityMonitor>,
}

fn score_payload(score: &Score) -> Option<ScorePayload> {
    let student = score.student.server_id()?;
    let activity = score.activity.server_id()?;
    Some(ScorePayload {
        student_id: student.0,
        activity_id: activity.0,
        value: score.value,
        remark: score.remark.clone().unwrap_or_default(),
    })
}

impl ScoresAdapter {
    pub fn new(
        store: Arc<MirrorStore>,
        remote: Arc<dyn RemoteBackend>,
        net: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self { store, remote, net }
    }

    /// Record a score. The operation always completes from the caller's
    /// point of view unless the server rejects the payload outright.
    pub async fn save(&self, score: Score) -> EngineResult<Mirrored<Score>> {
        if self.net.network_present() {
            if let Some(payload) = score_payload(&score) {
                match self.remote.save_score(&payload).await {
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
                        warn!(error = %err, "score save failed, recording locally");
                    }
                }
            }
        }
        // The store folds this into an existing row for the same
        // (student, activity) pair, escalating its state.
        Ok(self
            .store
            .record_local_mutation(None, score, MutationKind::Create)
            .await?)
    }

    /// Refresh the mirror with the server's scores for one activity.
    /// Serving the merged view is the projection's job.
    pub async fn refresh_for_activity(&self, activity: EntityRef) -> EngineResult<()> {
        if !self.net.network_present() {
            return Ok(());
        }
        let Some(id) = self.resolve_activity(activity).await? else {
            return Ok(());
        };
        match self.remote.scores_for_activity(id).await {
            Ok(dtos) => {
                self.net.note_success();
                let rows = dtos.into_iter().map(ScoreDto::into_pair).collect();
                self.store.upsert_from_remote::<Score>(rows, false).await?;
            }
            Err(err) => {
                self.net.note_error(&err);
                warn!(error = %err, "score refresh failed, serving mirror");
            }
        }
        Ok(())
    }

    /// Refresh the mirror with the server's scores for one student.
    pub async fn refresh_for_student(&self, student: EntityRef) -> EngineResult<()> {
        if !self.net.network_present() {
            return Ok(());
        }
        let row = self.store.get_by_ref::<Student>(student).await?;
        let Some(id) = row.and_then(|r| r.server_id).or(student.server_id()) else {
            return Ok(());
        };
        match self.remote.scores_for_student(id).await {
            Ok(dtos) => {
                self.net.note_success();
                let rows = dtos.into_iter().map(ScoreDto::into_pair).collect();
                self.store.upsert_from_remote::<Score>(rows, false).await?;
            }
            Err(err) => {
                self.net.note_error(&err);
                warn!(error = %err, "score refresh failed, serving mirror");
            }
        }
        Ok(())
    }

    async fn resolve_activity(&self, activity: EntityRef) -> EngineResult<Option<ServerId>> {
        let row = self.store.get_by_ref::<Activity>(activity).await?;
        Ok(row.and_then(|r| r.server_id).or(activity.server_id()))
    }
}

#[async_trait]
impl RemoteMutator<Score> for ScoresAdapter {
    fn entity_name(&self) -> &'static str {
        "scores"
    }

    fn push_ready(&self, row: &Mirrored<Score>) -> Result<(), String> {
        if row.state == SyncState::PendingDelete {
            return Ok(());
        }
        if row.entity.student.is_local() {
            return Err(format!(
                "student {} has no server identity yet",
                row.entity.student
            ));
        }
        if row.entity.activity.is_local() {
            return Err(format!(
                "activity {} has no server identity yet",
                row.entity.activity
            ));
        }
        Ok(())
    }

    async fn push_create(&self, row: &Mirrored<Score>) -> ApiResult<ServerId> {
        let payload = score_payload(&row.entity)
            .ok_or_else(|| ApiError::Transport("score references unresolved".to_string()))?;
        let dto = self.remote.save_score(&payload).await?;
        Ok(ServerId(dto.id))
    }

    async fn push_update(&self, _id: ServerId, row: &Mirrored<Score>) -> ApiResult<()> {
        // Same upsert endpoint as create; the pair is the identity.
        let payload = score_payload(&row.entity)
            .ok_or_else(|| ApiError::Transport("score references unresolved".to_string()))?;
        self.remote.save_score(&payload).await.map(|_| ())
    }

    async fn push_delete(&self, _id: ServerId) -> ApiResult<()> {
        // The backend exposes no score deletion; the engine never records
        // one, so a tombstone here means the mirror was tampered with.
        Err(ApiError::Rejected {
            status: 405,
            message: "score deletion is not supported by the backend".to_string(),
        })
    }
}

#[async_trait]
impl SyncAdapter for ScoresAdapter {
    fn entity_name(&self) -> &'static str {
        "scores"
    }

    async fn push_pending(&self) -> EntityPush {
        drain_pending::<Score, _>(&self.store, &self.net, self).await
    }

    /// Bulk export of all scores, avoiding one list call per activity for
    /// the highest-volume dependent entity.
    async fn pull(&self) -> EntityPull {
        let mut report = EntityPull::new("scores");
        match self.remote.export_all_scores().await {
            Ok(dtos) => {
                self.net.note_success();
                let rows = dtos.into_iter().map(ScoreDto::into_pair).collect();
                match self.store.upsert_from_remote::<Score>(rows, false).await {
                    Ok(summary) => report.absorb(&summary),
                    Err(err) => report.fail(err),
                }
            }
            Err(err) => {
                self.net.note_error(&err);
                report.fail(err);
            }
        }
        report
    }
}

//! Sync adapter for students.
//!
//! Students are the first dependent entity: their group reference must
//! resolve to a server identity before any remote call can mention them,
//! so rows created under a still-local group are deferred until the
//! group's push assigns one.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use gradebook_api::{
    ApiError, ApiResult, EntityRef, Group, Mirrored, ParentIdDto, RemoteBackend, ServerId, Student,
    StudentDto, StudentPayload, SyncState,
};

use super::push::{drain_pending, RemoteMutator};
use super::{scope_encodings, SyncAdapter};
use crate::error::{EngineError, EngineResult};
use crate::storage::{MirrorStore, MutationKind};
use crate::sync::connectivity::ConnectivityMonitor;
use crate::sync::report::{EntityPull, EntityPush};

pub struct StudentsAdapter {
    store: Arc<MirrorStore>,
    remote: Arc<dyn RemoteBackend>,
    net: Arc<ConnectivityMonitor>,
}

fn student_payload(student: &Student) -> Option<StudentPayload> {
    let group = student.group.server_id()?;
    Some(StudentPayload {
        first_name: student.first_name.clone(),
        last_name: student.last_name.clone(),
        email: student.email.clone(),
        group: ParentIdDto::from(group),
    })
}

impl StudentsAdapter {
    pub fn new(
        store: Arc<MirrorStore>,
        remote: Arc<dyn RemoteBackend>,
        net: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self { store, remote, net }
    }

    /// Merged roster of one group.
    pub async fn list(&self, group: EntityRef) -> EngineResult<Vec<Mirrored<Student>>> {
        let group_row = self.store.get_by_ref::<Group>(group).await?;
        let server_id = group_row
            .as_ref()
            .and_then(|r| r.server_id)
            .or(group.server_id());

        if self.net.network_present() {
            if let Some(id) = server_id {
                match self.remote.students_in_group(id).await {
                    Ok(dtos) => {
                        self.net.note_success();
                        let rows = dtos.into_iter().map(StudentDto::into_pair).collect();
                        self.store.upsert_from_remote::<Student>(rows, false).await?;
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "student refresh failed, serving mirror");
                    }
                }
            }
        }

        let encodings = scope_encodings(group_row.as_ref(), group);
        Ok(self
            .store
            .list_live_matching::<Student>(&[("group_ref", encodings)])
            .await?)
    }

    pub async fn create(&self, student: Student) -> EngineResult<Mirrored<Student>> {
        if self.net.network_present() {
            if let Some(payload) = student_payload(&student) {
                match self.remote.create_student(&payload).await {
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
                        warn!(error = %err, "student create failed, recording locally");
                    }
                }
            }
            // A still-local group cannot be named remotely; the row waits
            // in the mirror until the group's push resolves it.
        }
        Ok(self
            .store
            .record_local_mutation(None, student, MutationKind::Create)
            .await?)
    }

    pub async fn update(&self, target: EntityRef, student: Student) -> EngineResult<Mirrored<Student>> {
        if self.net.network_present() {
            if let (Some(id), Some(payload)) = (target.server_id(), student_payload(&student)) {
                match self.remote.update_student(id, &payload).await {
                    Ok(()) => {
                        self.net.note_success();
                        return Ok(self.store.write_through(id, student).await?);
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "student update failed, recording locally");
                    }
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(Some(target), student, MutationKind::Update)
            .await?)
    }

    pub async fn delete(&self, target: EntityRef) -> EngineResult<()> {
        let row = self.store.get_by_ref::<Student>(target).await?;
        let server_id = row.as_ref().and_then(|r| r.server_id).or(target.server_id());

        if self.net.network_present() {
            if let Some(id) = server_id {
                match self.remote.delete_student(id).await {
                    Ok(()) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Student>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.status() == Some(404) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Student>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "student delete failed, recording locally");
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
impl RemoteMutator<Student> for StudentsAdapter {
    fn entity_name(&self) -> &'static str {
        "students"
    }

    fn push_ready(&self, row: &Mirrored<Student>) -> Result<(), String> {
        if row.state == SyncState::PendingDelete || !row.entity.group.is_local() {
            Ok(())
        } else {
            Err(format!(
                "group {} has no server identity yet",
                row.entity.group
            ))
        }
    }

    async fn push_create(&self, row: &Mirrored<Student>) -> ApiResult<ServerId> {
        let payload = student_payload(&row.entity)
            .ok_or_else(|| ApiError::Transport("group reference unresolved".to_string()))?;
        let dto = self.remote.create_student(&payload).await?;
        Ok(ServerId(dto.id))
    }

    async fn push_update(&self, id: ServerId, row: &Mirrored<Student>) -> ApiResult<()> {
        let payload = student_payload(&row.entity)
            .ok_or_else(|| ApiError::Transport("group reference unresolved".to_string()))?;
        self.remote.update_student(id, &payload).await
    }

    async fn push_delete(&self, id: ServerId) -> ApiResult<()> {
        self.remote.delete_student(id).await
    }
}

#[async_trait]
impl SyncAdapter for StudentsAdapter {
    fn entity_name(&self) -> &'static str {
        "students"
    }

    async fn push_pending(&self) -> EntityPush {
        drain_pending::<Student, _>(&self.store, &self.net, self).await
    }

    /// Students are pulled per mirrored group, parents having landed
    /// earlier in the same cycle.
    async fn pull(&self) -> EntityPull {
        let mut report = EntityPull::new("students");

        let groups = match self.store.list_live::<Group>().await {
            Ok(groups) => groups,
            Err(err) => {
                report.fail(err);
                return report;
            }
        };

        for group in groups {
            let Some(id) = group.server_id else {
                continue;
            };
            match self.remote.students_in_group(id).await {
                Ok(dtos) => {
                    self.net.note_success();
                    let rows = dtos.into_iter().map(StudentDto::into_pair).collect();
                    match self.store.upsert_from_remote::<Student>(rows, false).await {
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
        report
    }
}

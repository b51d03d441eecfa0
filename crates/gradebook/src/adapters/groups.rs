//! Sync adapter for class groups.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use gradebook_api::{
    ApiResult, EntityRef, Group, GroupDto, GroupPayload, Mirrored, RemoteBackend, ServerId,
};

use super::push::{drain_pending, RemoteMutator};
use super::SyncAdapter;
use crate::error::{EngineError, EngineResult};
use crate::storage::{MirrorStore, MutationKind};
use crate::sync::connectivity::ConnectivityMonitor;
use crate::sync::report::{EntityPull, EntityPush};

pub struct GroupsAdapter {
    store: Arc<MirrorStore>,
    remote: Arc<dyn RemoteBackend>,
    net: Arc<ConnectivityMonitor>,
}

impl GroupsAdapter {
    pub fn new(
        store: Arc<MirrorStore>,
        remote: Arc<dyn RemoteBackend>,
        net: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self { store, remote, net }
    }

    /// Merged view of all groups: remote refresh first when online, the
    /// mirror always has the last word so pending edits stay visible.
    pub async fn list(&self) -> EngineResult<Vec<Mirrored<Group>>> {
        if self.net.network_present() {
            match self.remote.list_groups().await {
                Ok(dtos) => {
                    self.net.note_success();
                    let rows = dtos.into_iter().map(GroupDto::into_pair).collect();
                    self.store.upsert_from_remote(rows, true).await?;
                }
                Err(err) => {
                    self.net.note_error(&err);
                    warn!(error = %err, "group refresh failed, serving mirror");
                }
            }
        }
        Ok(self.store.list_live::<Group>().await?)
    }

    pub async fn create(&self, group: Group) -> EngineResult<Mirrored<Group>> {
        if self.net.network_present() {
            match self.remote.create_group(&GroupPayload::from(&group)).await {
                Ok(dto) => {
                    self.net.note_success();
                    let (id, entity) = dto.into_pair();
                    return Ok(self.store.write_through(id, entity).await?);
                }
                Err(err) if err.is_rejection() => return Err(EngineError::Rejected(err.to_string())),
                Err(err) => {
                    self.net.note_error(&err);
                    warn!(error = %err, "group create failed, recording locally");
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(None, group, MutationKind::Create)
            .await?)
    }

    pub async fn update(&self, target: EntityRef, group: Group) -> EngineResult<Mirrored<Group>> {
        if self.net.network_present() {
            if let Some(id) = target.server_id() {
                match self.remote.update_group(id, &GroupPayload::from(&group)).await {
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
                        warn!(error = %err, "group update failed, recording locally");
                    }
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(Some(target), group, MutationKind::Update)
            .await?)
    }

    pub async fn delete(&self, target: EntityRef) -> EngineResult<()> {
        let row = self.store.get_by_ref::<Group>(target).await?;
        let server_id = row.as_ref().and_then(|r| r.server_id).or(target.server_id());

        if self.net.network_present() {
            if let Some(id) = server_id {
                match self.remote.delete_group(id).await {
                    Ok(()) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Group>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.status() == Some(404) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Group>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "group delete failed, recording locally");
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
            // Nothing mirrored under that reference: nothing to delete.
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteMutator<Group> for GroupsAdapter {
    fn entity_name(&self) -> &'static str {
        "groups"
    }

    async fn push_create(&self, row: &Mirrored<Group>) -> ApiResult<ServerId> {
        let dto = self
            .remote
            .create_group(&GroupPayload::from(&row.entity))
            .await?;
        Ok(ServerId(dto.id))
    }

    async fn push_update(&self, id: ServerId, row: &Mirrored<Group>) -> ApiResult<()> {
        self.remote
            .update_group(id, &GroupPayload::from(&row.entity))
            .await
            .map(|_| ())
    }

    async fn push_delete(&self, id: ServerId) -> ApiResult<()> {
        self.remote.delete_group(id).await
    }
}

#[async_trait]
impl SyncAdapter for GroupsAdapter {
    fn entity_name(&self) -> &'static str {
        "groups"
    }

    async fn push_pending(&self) -> EntityPush {
        drain_pending::<Group, _>(&self.store, &self.net, self).await
    }

    async fn pull(&self) -> EntityPull {
        let mut report = EntityPull::new("groups");
        match self.remote.list_groups().await {
            Ok(dtos) => {
                self.net.note_success();
                let rows = dtos.into_iter().map(GroupDto::into_pair).collect();
                match self.store.upsert_from_remote::<Group>(rows, true).await {
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

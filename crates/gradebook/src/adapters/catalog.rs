//! Sync adapters for the catalog collections: subjects and terms.
//!
//! Catalogs are small, parentless, and pulled as full authoritative
//! lists, so their pulls prune synced rows the server no longer returns.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use gradebook_api::{
    ApiResult, EntityRef, Mirrored, RemoteBackend, ServerId, Subject, SubjectDto, SubjectPayload,
    Term, TermDto, TermPayload,
};

use super::push::{drain_pending, RemoteMutator};
use super::SyncAdapter;
use crate::error::{EngineError, EngineResult};
use crate::storage::{MirrorStore, MutationKind};
use crate::sync::connectivity::ConnectivityMonitor;
use crate::sync::report::{EntityPull, EntityPush};

pub struct SubjectsAdapter {
    store: Arc<MirrorStore>,
    remote: Arc<dyn RemoteBackend>,
    net: Arc<ConnectivityMonitor>,
}

impl SubjectsAdapter {
    pub fn new(
        store: Arc<MirrorStore>,
        remote: Arc<dyn RemoteBackend>,
        net: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self { store, remote, net }
    }

    pub async fn list(&self) -> EngineResult<Vec<Mirrored<Subject>>> {
        if self.net.network_present() {
            match self.remote.list_subjects().await {
                Ok(dtos) => {
                    self.net.note_success();
                    let rows = dtos.into_iter().map(SubjectDto::into_pair).collect();
                    self.store.upsert_from_remote::<Subject>(rows, true).await?;
                }
                Err(err) => {
                    self.net.note_error(&err);
                    warn!(error = %err, "subject refresh failed, serving mirror");
                }
            }
        }
        Ok(self.store.list_live::<Subject>().await?)
    }

    pub async fn create(&self, subject: Subject) -> EngineResult<Mirrored<Subject>> {
        if self.net.network_present() {
            match self.remote.create_subject(&SubjectPayload::from(&subject)).await {
                Ok(dto) => {
                    self.net.note_success();
                    let (id, entity) = dto.into_pair();
                    return Ok(self.store.write_through(id, entity).await?);
                }
                Err(err) if err.is_rejection() => return Err(EngineError::Rejected(err.to_string())),
                Err(err) => {
                    self.net.note_error(&err);
                    warn!(error = %err, "subject create failed, recording locally");
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(None, subject, MutationKind::Create)
            .await?)
    }

    pub async fn update(&self, target: EntityRef, subject: Subject) -> EngineResult<Mirrored<Subject>> {
        if self.net.network_present() {
            if let Some(id) = target.server_id() {
                match self.remote.update_subject(id, &SubjectPayload::from(&subject)).await {
                    Ok(()) => {
                        self.net.note_success();
                        return Ok(self.store.write_through(id, subject).await?);
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "subject update failed, recording locally");
                    }
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(Some(target), subject, MutationKind::Update)
            .await?)
    }

    pub async fn delete(&self, target: EntityRef) -> EngineResult<()> {
        let row = self.store.get_by_ref::<Subject>(target).await?;
        let server_id = row.as_ref().and_then(|r| r.server_id).or(target.server_id());

        if self.net.network_present() {
            if let Some(id) = server_id {
                match self.remote.delete_subject(id).await {
                    Ok(()) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Subject>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.status() == Some(404) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Subject>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "subject delete failed, recording locally");
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
impl RemoteMutator<Subject> for SubjectsAdapter {
    fn entity_name(&self) -> &'static str {
        "subjects"
    }

    async fn push_create(&self, row: &Mirrored<Subject>) -> ApiResult<ServerId> {
        let dto = self
            .remote
            .create_subject(&SubjectPayload::from(&row.entity))
            .await?;
        Ok(ServerId(dto.id))
    }

    async fn push_update(&self, id: ServerId, row: &Mirrored<Subject>) -> ApiResult<()> {
        self.remote
            .update_subject(id, &SubjectPayload::from(&row.entity))
            .await
    }

    async fn push_delete(&self, id: ServerId) -> ApiResult<()> {
        self.remote.delete_subject(id).await
    }
}

#[async_trait]
impl SyncAdapter for SubjectsAdapter {
    fn entity_name(&self) -> &'static str {
        "subjects"
    }

    async fn push_pending(&self) -> EntityPush {
        drain_pending::<Subject, _>(&self.store, &self.net, self).await
    }

    async fn pull(&self) -> EntityPull {
        let mut report = EntityPull::new("subjects");
        match self.remote.list_subjects().await {
            Ok(dtos) => {
                self.net.note_success();
                let rows = dtos.into_iter().map(SubjectDto::into_pair).collect();
                match self.store.upsert_from_remote::<Subject>(rows, true).await {
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

pub struct TermsAdapter {
    store: Arc<MirrorStore>,
    remote: Arc<dyn RemoteBackend>,
    net: Arc<ConnectivityMonitor>,
}

impl TermsAdapter {
    pub fn new(
        store: Arc<MirrorStore>,
        remote: Arc<dyn RemoteBackend>,
        net: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self { store, remote, net }
    }

    pub async fn list(&self) -> EngineResult<Vec<Mirrored<Term>>> {
        if self.net.network_present() {
            match self.remote.list_terms().await {
                Ok(dtos) => {
                    self.net.note_success();
                    let rows = dtos.into_iter().map(TermDto::into_pair).collect();
                    self.store.upsert_from_remote::<Term>(rows, true).await?;
                }
                Err(err) => {
                    self.net.note_error(&err);
                    warn!(error = %err, "term refresh failed, serving mirror");
                }
            }
        }
        Ok(self.store.list_live::<Term>().await?)
    }

    pub async fn create(&self, term: Term) -> EngineResult<Mirrored<Term>> {
        if self.net.network_present() {
            match self.remote.create_term(&TermPayload::from(&term)).await {
                Ok(dto) => {
                    self.net.note_success();
                    let (id, entity) = dto.into_pair();
                    return Ok(self.store.write_through(id, entity).await?);
                }
                Err(err) if err.is_rejection() => return Err(EngineError::Rejected(err.to_string())),
                Err(err) => {
                    self.net.note_error(&err);
                    warn!(error = %err, "term create failed, recording locally");
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(None, term, MutationKind::Create)
            .await?)
    }

    pub async fn update(&self, target: EntityRef, term: Term) -> EngineResult<Mirrored<Term>> {
        if self.net.network_present() {
            if let Some(id) = target.server_id() {
                match self.remote.update_term(id, &TermPayload::from(&term)).await {
                    Ok(()) => {
                        self.net.note_success();
                        return Ok(self.store.write_through(id, term).await?);
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "term update failed, recording locally");
                    }
                }
            }
        }
        Ok(self
            .store
            .record_local_mutation(Some(target), term, MutationKind::Update)
            .await?)
    }

    pub async fn delete(&self, target: EntityRef) -> EngineResult<()> {
        let row = self.store.get_by_ref::<Term>(target).await?;
        let server_id = row.as_ref().and_then(|r| r.server_id).or(target.server_id());

        if self.net.network_present() {
            if let Some(id) = server_id {
                match self.remote.delete_term(id).await {
                    Ok(()) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Term>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.status() == Some(404) => {
                        self.net.note_success();
                        if let Some(row) = row {
                            self.store.remove_row::<Term>(row.local_id).await?;
                        }
                        return Ok(());
                    }
                    Err(err) if err.is_rejection() => {
                        return Err(EngineError::Rejected(err.to_string()))
                    }
                    Err(err) => {
                        self.net.note_error(&err);
                        warn!(error = %err, "term delete failed, recording locally");
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
impl RemoteMutator<Term> for TermsAdapter {
    fn entity_name(&self) -> &'static str {
        "terms"
    }

    async fn push_create(&self, row: &Mirrored<Term>) -> ApiResult<ServerId> {
        let dto = self
            .remote
            .create_term(&TermPayload::from(&row.entity))
            .await?;
        Ok(ServerId(dto.id))
    }

    async fn push_update(&self, id: ServerId, row: &Mirrored<Term>) -> ApiResult<()> {
        self.remote
            .update_term(id, &TermPayload::from(&row.entity))
            .await
    }

    async fn push_delete(&self, id: ServerId) -> ApiResult<()> {
        self.remote.delete_term(id).await
    }
}

#[async_trait]
impl SyncAdapter for TermsAdapter {
    fn entity_name(&self) -> &'static str {
        "terms"
    }

    async fn push_pending(&self) -> EntityPush {
        drain_pending::<Term, _>(&self.store, &self.net, self).await
    }

    async fn pull(&self) -> EntityPull {
        let mut report = EntityPull::new("terms");
        match self.remote.list_terms().await {
            Ok(dtos) => {
                self.net.note_success();
                let rows = dtos.into_iter().map(TermDto::into_pair).collect();
                match self.store.upsert_from_remote::<Term>(rows, true).await {
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

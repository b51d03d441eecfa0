//! The engine façade.
//!
//! `SyncEngine` is the single entry point for embedders: it wires the
//! mirror store, connectivity monitor, per-entity adapters, and the
//! orchestrator, and exposes typed read-through views, typed mutations,
//! the manual sync trigger, and the status channel.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use gradebook_api::{
    Activity, EntityRef, Group, Mirrored, RemoteBackend, Score, Student, Subject, Term,
};

use crate::adapters::{
    ActivitiesAdapter, GroupsAdapter, ScoresAdapter, StudentsAdapter, SubjectsAdapter,
    SyncAdapter, TermsAdapter,
};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::projection::{self, GradeSheetRow, StudentReportEntry};
use crate::storage::MirrorStore;
use crate::sync::connectivity::{run_probe_loop, ConnectivityMonitor};
use crate::sync::{SyncOrchestrator, SyncReport, SyncStatus};

pub struct SyncEngine {
    config: EngineConfig,
    store: Arc<MirrorStore>,
    remote: Arc<dyn RemoteBackend>,
    connectivity: Arc<ConnectivityMonitor>,
    orchestrator: Arc<SyncOrchestrator>,
    groups: Arc<GroupsAdapter>,
    students: Arc<StudentsAdapter>,
    subjects: Arc<SubjectsAdapter>,
    terms: Arc<TermsAdapter>,
    activities: Arc<ActivitiesAdapter>,
    scores: Arc<ScoresAdapter>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, remote: Arc<dyn RemoteBackend>) -> EngineResult<Self> {
        let store = Arc::new(match &config.db_path {
            Some(path) => MirrorStore::open(path)?,
            None => MirrorStore::open_in_memory()?,
        });
        let connectivity = Arc::new(ConnectivityMonitor::new());

        let groups = Arc::new(GroupsAdapter::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
        ));
        let subjects = Arc::new(SubjectsAdapter::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
        ));
        let terms = Arc::new(TermsAdapter::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
        ));
        let students = Arc::new(StudentsAdapter::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
        ));
        let activities = Arc::new(ActivitiesAdapter::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
        ));
        let scores = Arc::new(ScoresAdapter::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
        ));

        // Dependency order, parents strictly before children; the same
        // order serves both phases of the cycle.
        let ordered: Vec<Arc<dyn SyncAdapter>> = vec![
            groups.clone(),
            subjects.clone(),
            terms.clone(),
            students.clone(),
            activities.clone(),
            scores.clone(),
        ];
        let orchestrator = Arc::new(SyncOrchestrator::new(ordered));

        Ok(Self {
            config,
            store,
            remote,
            connectivity,
            orchestrator,
            groups,
            students,
            subjects,
            terms,
            activities,
            scores,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the background machinery: the liveness probe loop, the
    /// startup sync trigger (after the settle delay), and the listener
    /// that runs a cycle on every transition to fully operational.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().expect("task list poisoned");

        tasks.push(tokio::spawn(run_probe_loop(
            self.connectivity.clone(),
            self.remote.clone(),
            self.config.probe_interval(),
        )));

        let orchestrator = self.orchestrator.clone();
        let connectivity = self.connectivity.clone();
        let settle = self.config.settle_delay();
        tasks.push(tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            if connectivity.fully_operational() {
                info!("startup sync trigger");
                orchestrator.run_cycle().await;
            } else {
                debug!("startup trigger skipped, not operational yet");
            }
        }));

        let orchestrator = self.orchestrator.clone();
        let mut operational = self.connectivity.subscribe();
        tasks.push(tokio::spawn(async move {
            while operational.changed().await.is_ok() {
                let now_operational = *operational.borrow_and_update();
                if now_operational {
                    info!("connectivity restored, starting sync cycle");
                    orchestrator.run_cycle().await;
                }
            }
        }));
    }

    /// Stop the background tasks. In-flight cycles are not cancelled;
    /// they are idempotent and cheap to re-run anyway.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().expect("task list poisoned").drain(..) {
            task.abort();
        }
    }

    // Connectivity and lifecycle -------------------------------------------

    /// Platform network-presence signal, fed by the embedder.
    pub fn set_network_present(&self, present: bool) {
        self.connectivity.set_network_present(present);
    }

    pub fn is_fully_operational(&self) -> bool {
        self.connectivity.fully_operational()
    }

    /// Manual sync trigger. Returns `None` when a cycle was already in
    /// flight.
    pub async fn force_sync(&self) -> Option<SyncReport> {
        self.orchestrator.run_cycle().await
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.orchestrator.subscribe()
    }

    // Read-through views ---------------------------------------------------

    pub async fn groups(&self) -> EngineResult<Vec<Mirrored<Group>>> {
        self.groups.list().await
    }

    pub async fn students_in_group(&self, group: EntityRef) -> EngineResult<Vec<Mirrored<Student>>> {
        self.students.list(group).await
    }

    pub async fn subjects(&self) -> EngineResult<Vec<Mirrored<Subject>>> {
        self.subjects.list().await
    }

    pub async fn terms(&self) -> EngineResult<Vec<Mirrored<Term>>> {
        self.terms.list().await
    }

    pub async fn activities(
        &self,
        subject: EntityRef,
        term: EntityRef,
    ) -> EngineResult<Vec<Mirrored<Activity>>> {
        self.activities.list(subject, term).await
    }

    /// The roster × score sheet for (group, activity): refreshed from the
    /// server when online, always served from the mirror's merged state.
    pub async fn grade_sheet(
        &self,
        group: EntityRef,
        activity: EntityRef,
    ) -> EngineResult<Vec<GradeSheetRow>> {
        self.scores.refresh_for_activity(activity).await?;
        Ok(projection::grade_sheet(&self.store, group, activity).await?)
    }

    /// A student's report: every score joined against its activity.
    pub async fn scores_for_student(
        &self,
        student: EntityRef,
    ) -> EngineResult<Vec<StudentReportEntry>> {
        self.scores.refresh_for_student(student).await?;
        Ok(projection::student_report(&self.store, student).await?)
    }

    // Mutations ------------------------------------------------------------

    pub async fn create_group(&self, group: Group) -> EngineResult<Mirrored<Group>> {
        self.groups.create(group).await
    }

    pub async fn update_group(&self, target: EntityRef, group: Group) -> EngineResult<Mirrored<Group>> {
        self.groups.update(target, group).await
    }

    pub async fn delete_group(&self, target: EntityRef) -> EngineResult<()> {
        self.groups.delete(target).await
    }

    pub async fn create_student(&self, student: Student) -> EngineResult<Mirrored<Student>> {
        self.students.create(student).await
    }

    pub async fn update_student(
        &self,
        target: EntityRef,
        student: Student,
    ) -> EngineResult<Mirrored<Student>> {
        self.students.update(target, student).await
    }

    pub async fn delete_student(&self, target: EntityRef) -> EngineResult<()> {
        self.students.delete(target).await
    }

    pub async fn create_subject(&self, subject: Subject) -> EngineResult<Mirrored<Subject>> {
        self.subjects.create(subject).await
    }

    pub async fn update_subject(
        &self,
        target: EntityRef,
        subject: Subject,
    ) -> EngineResult<Mirrored<Subject>> {
        self.subjects.update(target, subject).await
    }

    pub async fn delete_subject(&self, target: EntityRef) -> EngineResult<()> {
        self.subjects.delete(target).await
    }

    pub async fn create_term(&self, term: Term) -> EngineResult<Mirrored<Term>> {
        self.terms.create(term).await
    }

    pub async fn update_term(&self, target: EntityRef, term: Term) -> EngineResult<Mirrored<Term>> {
        self.terms.update(target, term).await
    }

    pub async fn delete_term(&self, target: EntityRef) -> EngineResult<()> {
        self.terms.delete(target).await
    }

    pub async fn create_activity(&self, activity: Activity) -> EngineResult<Mirrored<Activity>> {
        self.activities.create(activity).await
    }

    pub async fn update_activity(
        &self,
        target: EntityRef,
        activity: Activity,
    ) -> EngineResult<Mirrored<Activity>> {
        self.activities.update(target, activity).await
    }

    pub async fn delete_activity(&self, target: EntityRef) -> EngineResult<()> {
        self.activities.delete(target).await
    }

    /// Record a score (upsert on the (student, activity) pair).
    pub async fn save_score(&self, score: Score) -> EngineResult<Mirrored<Score>> {
        self.scores.save(score).await
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! End-to-end properties of the push/pull cycle against the fake backend.

use std::sync::Arc;

use gradebook::{EngineConfig, EngineError, SyncEngine};
use gradebook_api::{Activity, EntityRef, Group, Score, ServerId, Student, SyncState};
use gradebook_backend::FakeBackend;

fn engine_with(fake: &Arc<FakeBackend>) -> SyncEngine {
    SyncEngine::new(EngineConfig::default(), fake.clone()).expect("engine should construct")
}

fn group(level: &str) -> Group {
    Group {
        level: level.to_string(),
        section: "A".to_string(),
        school_year: 2025,
    }
}

/// Stage a classroom on the server: one group with two students, one
/// subject/term pair, one activity worth 10%.
struct Classroom {
    group: ServerId,
    s1: ServerId,
    s2: ServerId,
    subject: ServerId,
    term: ServerId,
    activity: ServerId,
}

fn seed_classroom(fake: &FakeBackend) -> Classroom {
    let group = fake.seed_group("7th", "A", 2025);
    let s1 = fake.seed_student(group, "Ana", "Lopez");
    let s2 = fake.seed_student(group, "Bruno", "Mora");
    let subject = fake.seed_subject("Math");
    let term = fake.seed_term("T1", 2025, true);
    let activity = fake.seed_activity(subject, term, "Quiz 1", 10.0);
    Classroom {
        group,
        s1,
        s2,
        subject,
        term,
        activity,
    }
}

#[tokio::test]
async fn a_second_cycle_without_mutations_changes_nothing() {
    let fake = Arc::new(FakeBackend::new());
    let class = seed_classroom(&fake);
    fake.seed_score(class.s1, class.activity, 7.0);
    let engine = engine_with(&fake);

    engine.force_sync().await.expect("first cycle should run");
    let groups_1 = engine.groups().await.unwrap();
    let students_1 = engine
        .students_in_group(EntityRef::Server(class.group))
        .await
        .unwrap();
    let sheet_1 = engine
        .grade_sheet(EntityRef::Server(class.group), EntityRef::Server(class.activity))
        .await
        .unwrap();

    let report = engine.force_sync().await.expect("second cycle should run");
    assert!(report.clean());

    assert_eq!(engine.groups().await.unwrap(), groups_1);
    assert_eq!(
        engine
            .students_in_group(EntityRef::Server(class.group))
            .await
            .unwrap(),
        students_1
    );
    let sheet_2 = engine
        .grade_sheet(EntityRef::Server(class.group), EntityRef::Server(class.activity))
        .await
        .unwrap();
    assert_eq!(sheet_1.len(), sheet_2.len());
    for (a, b) in sheet_1.iter().zip(sheet_2.iter()) {
        assert_eq!(a.student, b.student);
        assert_eq!(a.score, b.score);
    }
}

#[tokio::test]
async fn an_offline_create_survives_reconnection_without_duplicates() {
    let fake = Arc::new(FakeBackend::new());
    let engine = engine_with(&fake);

    engine.set_network_present(false);
    let created = engine.create_group(group("offline 7th")).await.unwrap();
    assert_eq!(created.state, SyncState::PendingCreate);
    assert!(created.server_id.is_none());

    engine.set_network_present(true);
    let report = engine.force_sync().await.expect("cycle should run");
    assert_eq!(report.total_pushed(), 1);

    let rows = engine.groups().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].local_id, created.local_id);
    assert_eq!(rows[0].state, SyncState::Synced);
    assert!(rows[0].server_id.is_some());
    assert_eq!(fake.group_count(), 1);

    // A later pull returning the same row reuses the local key.
    engine.force_sync().await.expect("cycle should run");
    let rows = engine.groups().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].local_id, created.local_id);
}

#[tokio::test]
async fn a_pending_edit_wins_over_a_stale_pull() {
    let fake = Arc::new(FakeBackend::new());
    let class = seed_classroom(&fake);
    fake.seed_score(class.s1, class.activity, 7.0);
    let engine = engine_with(&fake);
    engine.force_sync().await.expect("cycle should run");

    // Edit the score while offline; the server still holds 7.0.
    engine.set_network_present(false);
    let edited = engine
        .save_score(Score {
            value: 9.0,
            remark: None,
            student: EntityRef::Server(class.s1),
            activity: EntityRef::Server(class.activity),
        })
        .await
        .unwrap();
    assert_eq!(edited.state, SyncState::PendingUpdate);

    // Back online, a read-through refresh pulls the stale 7.0; the merged
    // view must still read 9.0.
    engine.set_network_present(true);
    let sheet = engine
        .grade_sheet(EntityRef::Server(class.group), EntityRef::Server(class.activity))
        .await
        .unwrap();
    let row = sheet
        .iter()
        .find(|r| r.student.server_id == Some(class.s1))
        .expect("student should be on the sheet");
    let score = row.score.as_ref().expect("score should be present");
    assert_eq!(score.entity.value, 9.0);
    assert_eq!(score.state, SyncState::PendingUpdate);

    // The next cycle pushes 9.0 and the server converges.
    engine.force_sync().await.expect("cycle should run");
    assert_eq!(fake.score_of(class.s1, class.activity), Some(9.0));
}

#[tokio::test]
async fn deleting_a_never_synced_row_makes_no_network_calls() {
    let fake = Arc::new(FakeBackend::new());
    let engine = engine_with(&fake);

    engine.set_network_present(false);
    let created = engine.create_group(group("scratch")).await.unwrap();
    engine
        .delete_group(EntityRef::Local(created.local_id))
        .await
        .unwrap();
    assert!(engine.groups().await.unwrap().is_empty());

    engine.set_network_present(true);
    engine.force_sync().await.expect("cycle should run");
    assert_eq!(fake.call_count("create_group"), 0);
    assert_eq!(fake.call_count("delete_group"), 0);
    assert_eq!(fake.group_count(), 0);
}

#[tokio::test]
async fn a_tombstone_survives_pulls_and_confirms_on_push() {
    let fake = Arc::new(FakeBackend::new());
    let id = fake.seed_group("7th", "A", 2025);
    let engine = engine_with(&fake);
    engine.force_sync().await.expect("cycle should run");

    engine.set_network_present(false);
    engine.delete_group(EntityRef::Server(id)).await.unwrap();
    assert!(engine.groups().await.unwrap().is_empty());

    // Online again: the server still returns the group, but the
    // read-through refresh must not resurrect the tombstone.
    engine.set_network_present(true);
    assert!(engine.groups().await.unwrap().is_empty());
    assert_eq!(fake.group_count(), 1);

    // The push confirms the delete and the tombstone disappears.
    engine.force_sync().await.expect("cycle should run");
    assert_eq!(fake.group_count(), 0);
    assert!(engine.groups().await.unwrap().is_empty());
}

#[tokio::test]
async fn the_grade_sheet_joins_roster_and_scores_deterministically() {
    let fake = Arc::new(FakeBackend::new());
    let class = seed_classroom(&fake);
    fake.seed_score(class.s1, class.activity, 7.0);
    let engine = engine_with(&fake);
    engine.force_sync().await.expect("cycle should run");

    let sheet = engine
        .grade_sheet(EntityRef::Server(class.group), EntityRef::Server(class.activity))
        .await
        .unwrap();
    assert_eq!(sheet.len(), 2);

    let s1 = sheet
        .iter()
        .find(|r| r.student.server_id == Some(class.s1))
        .unwrap();
    let s2 = sheet
        .iter()
        .find(|r| r.student.server_id == Some(class.s2))
        .unwrap();
    assert_eq!(s1.score.as_ref().map(|s| s.entity.value), Some(7.0));
    assert_eq!(s1.score.as_ref().map(|s| s.state), Some(SyncState::Synced));
    assert!(s2.score.is_none());

    // An offline score for the second student shows up immediately.
    engine.set_network_present(false);
    engine
        .save_score(Score {
            value: 9.0,
            remark: None,
            student: EntityRef::Server(class.s2),
            activity: EntityRef::Server(class.activity),
        })
        .await
        .unwrap();

    let sheet = engine
        .grade_sheet(EntityRef::Server(class.group), EntityRef::Server(class.activity))
        .await
        .unwrap();
    let s2 = sheet
        .iter()
        .find(|r| r.student.server_id == Some(class.s2))
        .unwrap();
    let score = s2.score.as_ref().expect("pending score should be visible");
    assert_eq!(score.entity.value, 9.0);
    assert_eq!(score.state, SyncState::PendingCreate);
}

#[tokio::test]
async fn a_member_pushes_only_after_its_parent_group() {
    let fake = Arc::new(FakeBackend::new());
    let engine = engine_with(&fake);

    engine.set_network_present(false);
    let pending_group = engine.create_group(group("offline 7th")).await.unwrap();
    let pending_student = engine
        .create_student(Student {
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            email: None,
            group: pending_group.key(),
        })
        .await
        .unwrap();
    assert!(pending_student.entity.group.is_local());

    engine.set_network_present(true);
    fake.clear_calls();
    let report = engine.force_sync().await.expect("cycle should run");
    assert_eq!(report.total_pushed(), 2);

    // The group's create went out before the student's.
    let calls = fake.calls();
    let group_pos = calls.iter().position(|c| c == "create_group").unwrap();
    let student_pos = calls.iter().position(|c| c == "create_student").unwrap();
    assert!(group_pos < student_pos);

    assert_eq!(fake.group_count(), 1);
    assert_eq!(fake.student_count(), 1);

    // The student's reference was rewritten to the real identity.
    let groups = engine.groups().await.unwrap();
    let students = engine.students_in_group(groups[0].key()).await.unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].state, SyncState::Synced);
    assert_eq!(students[0].entity.group, groups[0].key());
}

#[tokio::test]
async fn a_rejected_mutation_surfaces_and_is_not_queued() {
    let fake = Arc::new(FakeBackend::new());
    let class = seed_classroom(&fake);
    // Quiz 1 already takes 10%; 95% more overflows the rule.
    let engine = engine_with(&fake);
    engine.force_sync().await.expect("cycle should run");

    let result = engine
        .create_activity(Activity {
            name: "Megaproject".to_string(),
            description: None,
            weight: 95.0,
            subject: EntityRef::Server(class.subject),
            term: EntityRef::Server(class.term),
            parent: None,
            averaged: false,
            date: None,
        })
        .await;
    assert!(matches!(result, Err(EngineError::Rejected(_))));

    // Nothing was folded into a pending local write.
    let activities = engine
        .activities(EntityRef::Server(class.subject), EntityRef::Server(class.term))
        .await
        .unwrap();
    assert_eq!(activities.len(), 1);
    assert!(activities.iter().all(|a| a.state == SyncState::Synced));
}

#[tokio::test]
async fn a_transport_failure_falls_back_to_a_pending_write() {
    let fake = Arc::new(FakeBackend::new());
    let engine = engine_with(&fake);

    // Network looks present but the backend is unreachable.
    fake.set_reachable(false);
    let created = engine.create_group(group("7th")).await.unwrap();
    assert_eq!(created.state, SyncState::PendingCreate);
    assert!(!engine.is_fully_operational());

    fake.set_reachable(true);
    engine.force_sync().await.expect("cycle should run");
    assert_eq!(fake.group_count(), 1);
    let rows = engine.groups().await.unwrap();
    assert_eq!(rows[0].state, SyncState::Synced);
}

#[tokio::test]
async fn a_pull_failure_does_not_roll_back_a_successful_push() {
    let fake = Arc::new(FakeBackend::new());
    let engine = engine_with(&fake);

    engine.set_network_present(false);
    engine.create_group(group("7th")).await.unwrap();
    engine.set_network_present(true);

    fake.seed_subject("Math");

    let report = engine.force_sync().await.expect("cycle should run");
    assert_eq!(report.total_pushed(), 1);
    assert_eq!(fake.group_count(), 1);

    // Now break the backend entirely and run another cycle: pulls fail,
    // but the previously pushed row stays synced in the mirror.
    fake.set_reachable(false);
    let report = engine.force_sync().await.expect("cycle should run");
    assert!(report.pull.iter().any(|p| p.error.is_some()));

    engine.set_network_present(false);
    let rows = engine.groups().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, SyncState::Synced);
}

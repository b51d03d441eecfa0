use gradebook_api::{EntityRef, Group, LocalId, Score, ServerId, Student, SyncState};

use super::mirror::MirrorStore;
use super::types::{MutationKind, StorageError};

fn group(level: &str) -> Group {
    Group {
        level: level.to_string(),
        section: "A".to_string(),
        school_year: 2025,
    }
}

fn student(first: &str, group: EntityRef) -> Student {
    Student {
        first_name: first.to_string(),
        last_name: "Lopez".to_string(),
        email: None,
        group,
    }
}

fn score(student: EntityRef, activity: EntityRef, value: f64) -> Score {
    Score {
        value,
        remark: None,
        student,
        activity,
    }
}

#[tokio::test]
async fn upsert_inserts_and_overwrites_synced_rows() {
    let store = MirrorStore::open_in_memory().unwrap();

    let summary = store
        .upsert_from_remote(vec![(ServerId(1), group("7th"))], true)
        .await
        .unwrap();
    assert_eq!(summary.applied, 1);

    let rows = store.list_live::<Group>().await.unwrap();
    assert_eq!(rows.len(), 1);
    let first_local = rows[0].local_id;
    assert_eq!(rows[0].state, SyncState::Synced);

    // Same server row again: overwritten in place, local key stable.
    store
        .upsert_from_remote(vec![(ServerId(1), group("8th"))], true)
        .await
        .unwrap();
    let rows = store.list_live::<Group>().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].local_id, first_local);
    assert_eq!(rows[0].entity.level, "8th");
}

#[tokio::test]
async fn upsert_protects_pending_rows_and_prunes_absent_ones() {
    let store = MirrorStore::open_in_memory().unwrap();
    store
        .upsert_from_remote(
            vec![(ServerId(1), group("7th")), (ServerId(2), group("8th"))],
            true,
        )
        .await
        .unwrap();

    // Edit row 1 locally, then pull a stale copy of it.
    let edited = store
        .record_local_mutation(
            Some(EntityRef::Server(ServerId(1))),
            group("7th edited"),
            MutationKind::Update,
        )
        .await
        .unwrap();
    assert_eq!(edited.state, SyncState::PendingUpdate);

    let summary = store
        .upsert_from_remote(vec![(ServerId(1), group("7th stale"))], true)
        .await
        .unwrap();
    assert_eq!(summary.protected, 1);
    // Server no longer lists group 2: pruned.
    assert_eq!(summary.pruned, 1);

    let rows = store.list_live::<Group>().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entity.level, "7th edited");
    assert_eq!(rows[0].state, SyncState::PendingUpdate);
}

#[tokio::test]
async fn tombstones_survive_pulls_that_still_return_the_row() {
    let store = MirrorStore::open_in_memory().unwrap();
    store
        .upsert_from_remote(vec![(ServerId(1), group("7th"))], true)
        .await
        .unwrap();

    let tombstone = store
        .record_local_mutation(
            Some(EntityRef::Server(ServerId(1))),
            group("7th"),
            MutationKind::Delete,
        )
        .await
        .unwrap();
    assert_eq!(tombstone.state, SyncState::PendingDelete);

    // The server still returns the row; it must not be resurrected.
    let summary = store
        .upsert_from_remote(vec![(ServerId(1), group("7th"))], true)
        .await
        .unwrap();
    assert_eq!(summary.protected, 1);

    assert!(store.list_live::<Group>().await.unwrap().is_empty());
    let all = store.list_all::<Group>().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].state, SyncState::PendingDelete);
}

#[tokio::test]
async fn deleting_a_never_synced_row_removes_it_immediately() {
    let store = MirrorStore::open_in_memory().unwrap();
    let created = store
        .record_local_mutation(None, group("offline"), MutationKind::Create)
        .await
        .unwrap();
    assert_eq!(created.state, SyncState::PendingCreate);
    assert!(created.server_id.is_none());

    store
        .record_local_mutation(
            Some(EntityRef::Local(created.local_id)),
            created.entity.clone(),
            MutationKind::Delete,
        )
        .await
        .unwrap();

    assert!(store.list_all::<Group>().await.unwrap().is_empty());
    assert!(store.list_pending::<Group>().await.unwrap().is_empty());
}

#[tokio::test]
async fn local_edits_escalate_but_never_demote() {
    let store = MirrorStore::open_in_memory().unwrap();
    let created = store
        .record_local_mutation(None, group("new"), MutationKind::Create)
        .await
        .unwrap();

    // Editing an unsynced create keeps it a create.
    let edited = store
        .record_local_mutation(
            Some(EntityRef::Local(created.local_id)),
            group("new edited"),
            MutationKind::Update,
        )
        .await
        .unwrap();
    assert_eq!(edited.state, SyncState::PendingCreate);
    assert_eq!(edited.local_id, created.local_id);

    // A synced row edited twice stays a pending update.
    store
        .upsert_from_remote(vec![(ServerId(9), group("synced"))], false)
        .await
        .unwrap();
    for _ in 0..2 {
        let row = store
            .record_local_mutation(
                Some(EntityRef::Server(ServerId(9))),
                group("synced edited"),
                MutationKind::Update,
            )
            .await
            .unwrap();
        assert_eq!(row.state, SyncState::PendingUpdate);
    }
}

#[tokio::test]
async fn reconcile_assigns_identity_and_clears_tombstones() {
    let store = MirrorStore::open_in_memory().unwrap();
    let created = store
        .record_local_mutation(None, group("new"), MutationKind::Create)
        .await
        .unwrap();

    store
        .reconcile_after_push::<Group>(created.local_id, ServerId(5))
        .await
        .unwrap();
    let row = store
        .get_by_ref::<Group>(EntityRef::Server(ServerId(5)))
        .await
        .unwrap()
        .expect("row should now carry its server id");
    assert_eq!(row.local_id, created.local_id);
    assert_eq!(row.state, SyncState::Synced);

    // Confirmed tombstone disappears entirely.
    store
        .record_local_mutation(
            Some(EntityRef::Server(ServerId(5))),
            row.entity.clone(),
            MutationKind::Delete,
        )
        .await
        .unwrap();
    store
        .reconcile_after_push::<Group>(created.local_id, ServerId(5))
        .await
        .unwrap();
    assert!(store.list_all::<Group>().await.unwrap().is_empty());
}

#[tokio::test]
async fn rewrite_cascades_child_references_after_push() {
    let store = MirrorStore::open_in_memory().unwrap();
    let pending_group = store
        .record_local_mutation(None, group("offline"), MutationKind::Create)
        .await
        .unwrap();

    let child = store
        .record_local_mutation(
            None,
            student("Ana", EntityRef::Local(pending_group.local_id)),
            MutationKind::Create,
        )
        .await
        .unwrap();
    assert!(child.entity.group.is_local());

    store
        .reconcile_after_push::<Group>(pending_group.local_id, ServerId(31))
        .await
        .unwrap();
    let rewritten = store
        .rewrite_parent_ref("groups", pending_group.local_id, ServerId(31))
        .await
        .unwrap();
    assert_eq!(rewritten, 1);

    let students = store.list_live::<Student>().await.unwrap();
    assert_eq!(students[0].entity.group, EntityRef::Server(ServerId(31)));
    // The student itself is still pending; only its reference moved.
    assert_eq!(students[0].state, SyncState::PendingCreate);
}

#[tokio::test]
async fn score_upserts_match_on_the_student_activity_pair() {
    let store = MirrorStore::open_in_memory().unwrap();
    let student_ref = EntityRef::Server(ServerId(1));
    let activity_ref = EntityRef::Server(ServerId(2));

    // Offline edit holds 9.0 with no server identity yet.
    let pending = store
        .record_local_mutation(None, score(student_ref, activity_ref, 9.0), MutationKind::Create)
        .await
        .unwrap();
    assert_eq!(pending.state, SyncState::PendingCreate);

    // A pull returns the stale server value 7.0 under the same pair: the
    // pending row is protected and no duplicate appears.
    let summary = store
        .upsert_from_remote(vec![(ServerId(77), score(student_ref, activity_ref, 7.0))], false)
        .await
        .unwrap();
    assert_eq!(summary.protected, 1);
    let all = store.list_all::<Score>().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].entity.value, 9.0);

    // A second local edit folds into the same row.
    let edited = store
        .record_local_mutation(None, score(student_ref, activity_ref, 9.5), MutationKind::Create)
        .await
        .unwrap();
    assert_eq!(edited.local_id, pending.local_id);
    assert_eq!(edited.state, SyncState::PendingCreate);
}

#[tokio::test]
async fn write_through_forces_the_confirmed_server_state() {
    let store = MirrorStore::open_in_memory().unwrap();
    let student_ref = EntityRef::Server(ServerId(1));
    let activity_ref = EntityRef::Server(ServerId(2));

    store
        .record_local_mutation(None, score(student_ref, activity_ref, 6.0), MutationKind::Create)
        .await
        .unwrap();

    // The server accepted 8.0 for the same pair: the pending row is
    // overwritten and marked synced.
    let row = store
        .write_through(ServerId(40), score(student_ref, activity_ref, 8.0))
        .await
        .unwrap();
    assert_eq!(row.state, SyncState::Synced);

    let all = store.list_all::<Score>().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].entity.value, 8.0);
    assert_eq!(all[0].server_id, Some(ServerId(40)));
}

#[tokio::test]
async fn deleting_an_unknown_row_reports_not_found() {
    let store = MirrorStore::open_in_memory().unwrap();
    let err = store
        .record_local_mutation(
            Some(EntityRef::Local(LocalId(99))),
            group("ghost"),
            MutationKind::Delete,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");

    {
        let store = MirrorStore::open(&path).unwrap();
        store
            .record_local_mutation(None, group("offline"), MutationKind::Create)
            .await
            .unwrap();
    }

    let store = MirrorStore::open(&path).unwrap();
    let pending = store.list_pending::<Group>().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity.level, "offline");
}

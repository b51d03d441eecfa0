//! Read-through accessor behavior, connectivity triggers, and the
//! orchestrator's re-entrancy guard.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};

use gradebook::adapters::SyncAdapter;
use gradebook::sync::{EntityPull, EntityPush, SyncOrchestrator};
use gradebook::{EngineConfig, SyncEngine, SyncPhase};
use gradebook_api::EntityRef;
use gradebook_backend::FakeBackend;

fn engine_with(fake: &Arc<FakeBackend>, config: EngineConfig) -> SyncEngine {
    SyncEngine::new(config, fake.clone()).expect("engine should construct")
}

#[tokio::test]
async fn reads_fall_back_to_the_mirror_when_the_backend_drops() {
    let fake = Arc::new(FakeBackend::new());
    let group = fake.seed_group("7th", "A", 2025);
    fake.seed_student(group, "Ana", "Lopez");
    let engine = engine_with(&fake, EngineConfig::default());

    let online = engine.groups().await.unwrap();
    assert_eq!(online.len(), 1);
    let roster_online = engine.students_in_group(online[0].key()).await.unwrap();
    assert_eq!(roster_online.len(), 1);

    fake.set_reachable(false);
    let offline = engine.groups().await.unwrap();
    assert_eq!(offline, online);

    let roster_offline = engine.students_in_group(online[0].key()).await.unwrap();
    assert_eq!(roster_offline, roster_online);
    assert_eq!(roster_offline[0].entity.first_name, "Ana");
}

#[tokio::test]
async fn scoped_reads_work_for_local_only_parents() {
    let fake = Arc::new(FakeBackend::new());
    let engine = engine_with(&fake, EngineConfig::default());

    engine.set_network_present(false);
    let pending_group = engine
        .create_group(gradebook_api::Group {
            level: "7th".to_string(),
            section: "A".to_string(),
            school_year: 2025,
        })
        .await
        .unwrap();
    engine
        .create_student(gradebook_api::Student {
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            email: None,
            group: pending_group.key(),
        })
        .await
        .unwrap();

    let students = engine.students_in_group(pending_group.key()).await.unwrap();
    assert_eq!(students.len(), 1);
    assert!(students[0].entity.group.is_local());
}

#[tokio::test]
async fn the_startup_trigger_and_connectivity_transition_drive_cycles() {
    let fake = Arc::new(FakeBackend::new());
    fake.seed_group("7th", "A", 2025);
    let config = EngineConfig {
        settle_delay_ms: 20,
        probe_interval_secs: 1,
        ..Default::default()
    };
    let engine = engine_with(&fake, config);
    let mut status = engine.status();

    engine.start();

    // The probe marks the backend reachable, the settle trigger runs the
    // first cycle.
    timeout(Duration::from_secs(5), async {
        loop {
            if status.borrow().last_report.is_some() {
                break;
            }
            status.changed().await.expect("status channel closed");
        }
    })
    .await
    .expect("startup cycle should have produced a report");
    assert_eq!(status.borrow().phase, SyncPhase::Idle);

    // Go offline, record an edit, come back: the transition to
    // operational must push it without a manual trigger.
    engine.set_network_present(false);
    engine
        .create_group(gradebook_api::Group {
            level: "8th".to_string(),
            section: "B".to_string(),
            school_year: 2025,
        })
        .await
        .unwrap();
    engine.set_network_present(true);

    timeout(Duration::from_secs(5), async {
        while fake.group_count() < 2 {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("reconnection should have pushed the pending group");

    engine.shutdown();
}

/// Adapter that takes long enough for a second trigger to arrive
/// mid-cycle.
struct SlowAdapter;

#[async_trait]
impl SyncAdapter for SlowAdapter {
    fn entity_name(&self) -> &'static str {
        "slow"
    }

    async fn push_pending(&self) -> EntityPush {
        sleep(Duration::from_millis(150)).await;
        EntityPush {
            entity: "slow".to_string(),
            ..Default::default()
        }
    }

    async fn pull(&self) -> EntityPull {
        EntityPull::new("slow")
    }
}

#[tokio::test]
async fn a_running_cycle_ignores_new_triggers() {
    let orchestrator = Arc::new(SyncOrchestrator::new(vec![Arc::new(SlowAdapter)]));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_cycle().await })
    };
    sleep(Duration::from_millis(30)).await;
    assert!(orchestrator.is_syncing());

    // Second trigger while the first cycle is still pushing.
    assert!(orchestrator.run_cycle().await.is_none());

    let report = first
        .await
        .expect("task should join")
        .expect("first cycle should complete");
    assert_eq!(report.push.len(), 1);
    assert!(!orchestrator.is_syncing());
}

#[tokio::test]
async fn grade_sheet_requires_a_mirrored_group() {
    let fake = Arc::new(FakeBackend::new());
    let engine = engine_with(&fake, EngineConfig::default());
    engine.set_network_present(false);

    let result = engine
        .grade_sheet(
            EntityRef::Server(gradebook_api::ServerId(999)),
            EntityRef::Server(gradebook_api::ServerId(1)),
        )
        .await;
    assert!(result.is_err());
}

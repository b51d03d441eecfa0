//! Walk one offline editing session end to end against the fake backend:
//! pull a classroom, lose the network, record a score, reconnect, sync,
//! and watch the mirror converge.
//!
//! Run with: cargo run -p gradebook --example offline_cycle

use std::sync::Arc;

use anyhow::Result;
use gradebook::{EngineConfig, SyncEngine};
use gradebook_api::{EntityRef, Score};
use gradebook_backend::FakeBackend;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Stage an authoritative classroom.
    let fake = Arc::new(FakeBackend::new());
    let group = fake.seed_group("7th Grade", "A", 2025);
    let s1 = fake.seed_student(group, "Ana", "Lopez");
    let s2 = fake.seed_student(group, "Bruno", "Mora");
    let subject = fake.seed_subject("Mathematics");
    let term = fake.seed_term("Term 1", 2025, true);
    let activity = fake.seed_activity(subject, term, "Quiz 1", 10.0);
    fake.seed_score(s1, activity, 7.0);

    let engine = SyncEngine::new(EngineConfig::default(), fake.clone())?;

    // First cycle mirrors everything locally.
    let report = engine.force_sync().await.expect("no cycle in flight");
    println!(
        "initial sync: {} rows applied across {} collections",
        report.total_applied(),
        report.pull.len()
    );

    // The network drops; the teacher keeps grading.
    engine.set_network_present(false);
    engine
        .save_score(Score {
            value: 9.0,
            remark: Some("great improvement".to_string()),
            student: EntityRef::Server(s2),
            activity: EntityRef::Server(activity),
        })
        .await?;

    println!("\noffline grade sheet:");
    for row in engine
        .grade_sheet(EntityRef::Server(group), EntityRef::Server(activity))
        .await?
    {
        println!(
            "  {} {} -> {:?} [{}]",
            row.student.entity.first_name,
            row.student.entity.last_name,
            row.score.as_ref().map(|s| s.entity.value),
            row.score
                .as_ref()
                .map(|s| s.state.to_string())
                .unwrap_or_else(|| "no score".to_string()),
        );
    }

    // Connectivity returns; one cycle reconciles.
    engine.set_network_present(true);
    let report = engine.force_sync().await.expect("no cycle in flight");
    println!(
        "\nreconnected: pushed {} pending rows, server now holds {:?}",
        report.total_pushed(),
        fake.score_of(s2, activity)
    );

    Ok(())
}

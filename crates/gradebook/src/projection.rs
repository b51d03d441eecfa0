//! Mirror-only read models: the grade sheet and the student report.
//!
//! Both are built purely from local data with a deterministic left outer
//! join. When several score rows share a logical key, a pending edit
//! outranks a synced row and the greatest local key breaks ties, so the
//! user always sees their latest unsynced edit over a stale server value.

use serde::Serialize;

use gradebook_api::{Activity, EntityRef, Group, Mirrored, Score, Student};

use crate::storage::{MirrorStore, StorageError, StorageResult};

/// One roster line of the grade sheet: a student and their single best
/// matching score for the activity, if any.
#[derive(Debug, Clone, Serialize)]
pub struct GradeSheetRow {
    pub student: Mirrored<Student>,
    pub score: Option<Mirrored<Score>>,
}

/// One line of a student's report: a score joined against its activity
/// (the activity may be absent from the mirror when it was never pulled).
#[derive(Debug, Clone, Serialize)]
pub struct StudentReportEntry {
    pub score: Mirrored<Score>,
    pub activity: Option<Mirrored<Activity>>,
}

/// Precedence for candidates sharing a logical key: pending edits first,
/// then the most recent local key.
fn rank(score: &Mirrored<Score>) -> (bool, i64) {
    (score.state.is_pending_edit(), score.local_id.0)
}

fn pick_best<'a>(
    current: Option<&'a Mirrored<Score>>,
    candidate: &'a Mirrored<Score>,
) -> &'a Mirrored<Score> {
    match current {
        Some(best) if rank(best) >= rank(candidate) => best,
        _ => candidate,
    }
}

/// The roster of `group` joined against the scores of `activity`.
pub async fn grade_sheet(
    store: &MirrorStore,
    group: EntityRef,
    activity: EntityRef,
) -> StorageResult<Vec<GradeSheetRow>> {
    let group_row = store
        .get_by_ref::<Group>(group)
        .await?
        .ok_or(StorageError::NotFound {
            table: "groups",
            key: group.encode(),
        })?;

    let students = store
        .list_live_matching::<Student>(&[("group_ref", group_row.reference_encodings())])
        .await?;

    // The activity may be referenced before it was ever mirrored; fall
    // back to matching the caller's reference verbatim.
    let activity_encodings = match store.get_by_ref::<Activity>(activity).await? {
        Some(row) => row.reference_encodings(),
        None => vec![activity.encode()],
    };
    let scores = store
        .list_live_matching::<Score>(&[("activity_ref", activity_encodings)])
        .await?;

    let rows = students
        .into_iter()
        .map(|student| {
            let best = scores
                .iter()
                .filter(|score| student.is_referenced_by(score.entity.student))
                .fold(None, |best, candidate| Some(pick_best(best, candidate)));
            GradeSheetRow {
                score: best.cloned(),
                student,
            }
        })
        .collect();
    Ok(rows)
}

/// Every score of `student`, joined against the mirrored activities.
pub async fn student_report(
    store: &MirrorStore,
    student: EntityRef,
) -> StorageResult<Vec<StudentReportEntry>> {
    let student_encodings = match store.get_by_ref::<Student>(student).await? {
        Some(row) => row.reference_encodings(),
        None => vec![student.encode()],
    };
    let scores = store
        .list_live_matching::<Score>(&[("student_ref", student_encodings)])
        .await?;

    let mut entries = Vec::with_capacity(scores.len());
    for score in scores {
        let activity = store.get_by_ref::<Activity>(score.entity.activity).await?;
        entries.push(StudentReportEntry { score, activity });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradebook_api::{LocalId, ServerId, SyncState};

    fn score_row(local_id: i64, state: SyncState, value: f64) -> Mirrored<Score> {
        Mirrored {
            local_id: LocalId(local_id),
            server_id: None,
            state,
            entity: Score {
                value,
                remark: None,
                student: EntityRef::Server(ServerId(1)),
                activity: EntityRef::Server(ServerId(2)),
            },
        }
    }

    #[test]
    fn pending_edit_outranks_synced() {
        let synced = score_row(10, SyncState::Synced, 7.0);
        let pending = score_row(3, SyncState::PendingUpdate, 9.0);
        assert_eq!(pick_best(Some(&synced), &pending).entity.value, 9.0);
        assert_eq!(pick_best(Some(&pending), &synced).entity.value, 9.0);
    }

    #[test]
    fn greater_local_key_breaks_ties() {
        let older = score_row(4, SyncState::Synced, 5.0);
        let newer = score_row(9, SyncState::Synced, 6.0);
        assert_eq!(pick_best(Some(&older), &newer).entity.value, 6.0);
        assert_eq!(pick_best(Some(&newer), &older).entity.value, 6.0);
    }
}

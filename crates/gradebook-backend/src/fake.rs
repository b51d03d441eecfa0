//! In-memory fake backend for tests and demos.
//!
//! Mirrors the real API's observable behavior: create responses carry the
//! assigned identity, the score POST upserts on (student, activity), the
//! activities controller enforces the root weight-sum rule with a 400 and
//! a reason body. Reachability can be toggled to simulate losing the
//! backend, and every call is recorded so tests can assert on traffic.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use gradebook_api::{
    ActivityDto, ActivityPayload, ApiError, ApiResult, GroupDto, GroupPayload, ParentIdDto,
    RemoteBackend, ScoreDto, ScorePayload, ServerId, StudentDto, StudentPayload, SubjectDto,
    SubjectPayload, TermDto, TermPayload,
};

#[derive(Default)]
struct State {
    next_id: i64,
    groups: BTreeMap<i64, GroupDto>,
    students: BTreeMap<i64, StudentDto>,
    subjects: BTreeMap<i64, SubjectDto>,
    terms: BTreeMap<i64, TermDto>,
    activities: BTreeMap<i64, ActivityDto>,
    scores: BTreeMap<i64, ScoreDto>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct FakeBackend {
    state: Mutex<State>,
    reachable: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            reachable: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the backend dropping off (or coming back onto) the network.
    /// While unreachable, every call fails with a transport error.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of calls whose name starts with `prefix` (e.g. `"delete"`,
    /// `"save_score"`).
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .expect("call log poisoned")
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("call log poisoned").clear();
    }

    /// The full call log, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn enter(&self, name: &str) -> ApiResult<()> {
        self.calls
            .lock()
            .expect("call log poisoned")
            .push(name.to_string());
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::Transport("backend unreachable".to_string()))
        }
    }

    fn not_found(what: &str, id: ServerId) -> ApiError {
        ApiError::Rejected {
            status: 404,
            message: format!("{what} {id} not found"),
        }
    }

    // Seeding helpers used by tests to stage authoritative state.

    pub fn seed_group(&self, level: &str, section: &str, school_year: i32) -> ServerId {
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        state.groups.insert(
            id,
            GroupDto {
                id,
                level: level.to_string(),
                section: section.to_string(),
                school_year,
            },
        );
        ServerId(id)
    }

    pub fn seed_student(&self, group: ServerId, first_name: &str, last_name: &str) -> ServerId {
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        state.students.insert(
            id,
            StudentDto {
                id,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: None,
                group: ParentIdDto { id: group.0 },
            },
        );
        ServerId(id)
    }

    pub fn seed_subject(&self, name: &str) -> ServerId {
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        state.subjects.insert(
            id,
            SubjectDto {
                id,
                name: name.to_string(),
                description: None,
            },
        );
        ServerId(id)
    }

    pub fn seed_term(&self, name: &str, school_year: i32, active: bool) -> ServerId {
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        state.terms.insert(
            id,
            TermDto {
                id,
                name: name.to_string(),
                school_year,
                start_date: None,
                end_date: None,
                active,
            },
        );
        ServerId(id)
    }

    pub fn seed_activity(
        &self,
        subject: ServerId,
        term: ServerId,
        name: &str,
        weight: f64,
    ) -> ServerId {
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        state.activities.insert(
            id,
            ActivityDto {
                id,
                name: name.to_string(),
                description: None,
                weight,
                subject: ParentIdDto { id: subject.0 },
                term: ParentIdDto { id: term.0 },
                parent: None,
                averaged: false,
                date: None,
            },
        );
        ServerId(id)
    }

    pub fn seed_score(&self, student: ServerId, activity: ServerId, value: f64) -> ServerId {
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        state.scores.insert(
            id,
            ScoreDto {
                id,
                value,
                remark: None,
                student: ParentIdDto { id: student.0 },
                activity: ParentIdDto { id: activity.0 },
            },
        );
        ServerId(id)
    }

    /// Value currently held by the fake for (student, activity), if any.
    pub fn score_of(&self, student: ServerId, activity: ServerId) -> Option<f64> {
        let state = self.state.lock().expect("state poisoned");
        state
            .scores
            .values()
            .find(|s| s.student.id == student.0 && s.activity.id == activity.0)
            .map(|s| s.value)
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().expect("state poisoned").groups.len()
    }

    pub fn student_count(&self) -> usize {
        self.state.lock().expect("state poisoned").students.len()
    }
}

#[async_trait]
impl RemoteBackend for FakeBackend {
    async fn ping(&self) -> ApiResult<()> {
        self.enter("ping")
    }

    async fn list_groups(&self) -> ApiResult<Vec<GroupDto>> {
        self.enter("list_groups")?;
        Ok(self
            .state
            .lock()
            .expect("state poisoned")
            .groups
            .values()
            .cloned()
            .collect())
    }

    async fn create_group(&self, group: &GroupPayload) -> ApiResult<GroupDto> {
        self.enter("create_group")?;
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        let dto = GroupDto {
            id,
            level: group.level.clone(),
            section: group.section.clone(),
            school_year: group.school_year,
        };
        state.groups.insert(id, dto.clone());
        Ok(dto)
    }

    async fn update_group(&self, id: ServerId, group: &GroupPayload) -> ApiResult<GroupDto> {
        self.enter("update_group")?;
        let mut state = self.state.lock().expect("state poisoned");
        let existing = state
            .groups
            .get_mut(&id.0)
            .ok_or_else(|| Self::not_found("group", id))?;
        existing.level = group.level.clone();
        existing.section = group.section.clone();
        existing.school_year = group.school_year;
        Ok(existing.clone())
    }

    async fn delete_group(&self, id: ServerId) -> ApiResult<()> {
        self.enter("delete_group")?;
        let mut state = self.state.lock().expect("state poisoned");
        state
            .groups
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("group", id))
    }

    async fn students_in_group(&self, group: ServerId) -> ApiResult<Vec<StudentDto>> {
        self.enter("students_in_group")?;
        Ok(self
            .state
            .lock()
            .expect("state poisoned")
            .students
            .values()
            .filter(|s| s.group.id == group.0)
            .cloned()
            .collect())
    }

    async fn create_student(&self, student: &StudentPayload) -> ApiResult<StudentDto> {
        self.enter("create_student")?;
        let mut state = self.state.lock().expect("state poisoned");
        if !state.groups.contains_key(&student.group.id) {
            return Err(Self::not_found("group", ServerId(student.group.id)));
        }
        let id = state.next_id();
        let dto = StudentDto {
            id,
            first_name: student.first_name.clone(),
            last_name: student.last_name.clone(),
            email: student.email.clone(),
            group: student.group,
        };
        state.students.insert(id, dto.clone());
        Ok(dto)
    }

    async fn update_student(&self, id: ServerId, student: &StudentPayload) -> ApiResult<()> {
        self.enter("update_student")?;
        let mut state = self.state.lock().expect("state poisoned");
        let existing = state
            .students
            .get_mut(&id.0)
            .ok_or_else(|| Self::not_found("student", id))?;
        existing.first_name = student.first_name.clone();
        existing.last_name = student.last_name.clone();
        existing.email = student.email.clone();
        existing.group = student.group;
        Ok(())
    }

    async fn delete_student(&self, id: ServerId) -> ApiResult<()> {
        self.enter("delete_student")?;
        let mut state = self.state.lock().expect("state poisoned");
        state
            .students
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("student", id))
    }

    async fn list_subjects(&self) -> ApiResult<Vec<SubjectDto>> {
        self.enter("list_subjects")?;
        Ok(self
            .state
            .lock()
            .expect("state poisoned")
            .subjects
            .values()
            .cloned()
            .collect())
    }

    async fn create_subject(&self, subject: &SubjectPayload) -> ApiResult<SubjectDto> {
        self.enter("create_subject")?;
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        let dto = SubjectDto {
            id,
            name: subject.name.clone(),
            description: subject.description.clone(),
        };
        state.subjects.insert(id, dto.clone());
        Ok(dto)
    }

    async fn update_subject(&self, id: ServerId, subject: &SubjectPayload) -> ApiResult<()> {
        self.enter("update_subject")?;
        let mut state = self.state.lock().expect("state poisoned");
        let existing = state
            .subjects
            .get_mut(&id.0)
            .ok_or_else(|| Self::not_found("subject", id))?;
        existing.name = subject.name.clone();
        existing.description = subject.description.clone();
        Ok(())
    }

    async fn delete_subject(&self, id: ServerId) -> ApiResult<()> {
        self.enter("delete_subject")?;
        let mut state = self.state.lock().expect("state poisoned");
        state
            .subjects
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("subject", id))
    }

    async fn list_terms(&self) -> ApiResult<Vec<TermDto>> {
        self.enter("list_terms")?;
        Ok(self
            .state
            .lock()
            .expect("state poisoned")
            .terms
            .values()
            .cloned()
            .collect())
    }

    async fn create_term(&self, term: &TermPayload) -> ApiResult<TermDto> {
        self.enter("create_term")?;
        let mut state = self.state.lock().expect("state poisoned");
        let id = state.next_id();
        let dto = TermDto {
            id,
            name: term.name.clone(),
            school_year: term.school_year,
            start_date: term.start_date,
            end_date: term.end_date,
            active: term.active,
        };
        state.terms.insert(id, dto.clone());
        Ok(dto)
    }

    async fn update_term(&self, id: ServerId, term: &TermPayload) -> ApiResult<()> {
        self.enter("update_term")?;
        let mut state = self.state.lock().expect("state poisoned");
        let existing = state
            .terms
            .get_mut(&id.0)
            .ok_or_else(|| Self::not_found("term", id))?;
        existing.name = term.name.clone();
        existing.school_year = term.school_year;
        existing.start_date = term.start_date;
        existing.end_date = term.end_date;
        existing.active = term.active;
        Ok(())
    }

    async fn delete_term(&self, id: ServerId) -> ApiResult<()> {
        self.enter("delete_term")?;
        let mut state = self.state.lock().expect("state poisoned");
        state
            .terms
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("term", id))
    }

    async fn list_activities(
        &self,
        subject: ServerId,
        term: ServerId,
    ) -> ApiResult<Vec<ActivityDto>> {
        self.enter("list_activities")?;
        Ok(self
            .state
            .lock()
            .expect("state poisoned")
            .activities
            .values()
            .filter(|a| a.subject.id == subject.0 && a.term.id == term.0 && a.parent.is_none())
            .cloned()
            .collect())
    }

    async fn create_activity(&self, activity: &ActivityPayload) -> ApiResult<ActivityDto> {
        self.enter("create_activity")?;
        let mut state = self.state.lock().expect("state poisoned");
        if !state.subjects.contains_key(&activity.subject_id) {
            return Err(Self::not_found("subject", ServerId(activity.subject_id)));
        }
        if !state.terms.contains_key(&activity.term_id) {
            return Err(Self::not_found("term", ServerId(activity.term_id)));
        }

        // Root weight-sum rule, as enforced by the real controller.
        if activity.parent_id.is_none() {
            let current: f64 = state
                .activities
                .values()
                .filter(|a| {
                    a.subject.id == activity.subject_id
                        && a.term.id == activity.term_id
                        && a.parent.is_none()
                })
                .map(|a| a.weight)
                .sum();
            if current + activity.weight > 100.0 {
                return Err(ApiError::Rejected {
                    status: 400,
                    message: format!(
                        "total weight may not exceed 100%; current total: {current}%"
                    ),
                });
            }
        }

        let id = state.next_id();
        let dto = ActivityDto {
            id,
            name: activity.name.clone(),
            description: activity.description.clone(),
            weight: activity.weight,
            subject: ParentIdDto {
                id: activity.subject_id,
            },
            term: ParentIdDto {
                id: activity.term_id,
            },
            parent: activity.parent_id.map(|id| ParentIdDto { id }),
            averaged: activity.averaged,
            date: activity.date,
        };
        state.activities.insert(id, dto.clone());
        Ok(dto)
    }

    async fn update_activity(&self, id: ServerId, activity: &ActivityPayload) -> ApiResult<()> {
        self.enter("update_activity")?;
        let mut state = self.state.lock().expect("state poisoned");
        let existing = state
            .activities
            .get_mut(&id.0)
            .ok_or_else(|| Self::not_found("activity", id))?;
        existing.name = activity.name.clone();
        existing.description = activity.description.clone();
        existing.weight = activity.weight;
        existing.averaged = activity.averaged;
        existing.date = activity.date;
        Ok(())
    }

    async fn delete_activity(&self, id: ServerId) -> ApiResult<()> {
        self.enter("delete_activity")?;
        let mut state = self.state.lock().expect("state poisoned");
        state
            .activities
            .remove(&id.0)
            .ok_or_else(|| Self::not_found("activity", id))?;
        // The backend cascades score deletion with the activity.
        state.scores.retain(|_, s| s.activity.id != id.0);
        Ok(())
    }

    async fn save_score(&self, score: &ScorePayload) -> ApiResult<ScoreDto> {
        self.enter("save_score")?;
        let mut state = self.state.lock().expect("state poisoned");
        if !state.students.contains_key(&score.student_id) {
            return Err(Self::not_found("student", ServerId(score.student_id)));
        }
        if !state.activities.contains_key(&score.activity_id) {
            return Err(Self::not_found("activity", ServerId(score.activity_id)));
        }

        let existing = state
            .scores
            .values()
            .find(|s| s.student.id == score.student_id && s.activity.id == score.activity_id)
            .map(|s| s.id);

        let dto = match existing {
            Some(id) => {
                let row = state.scores.get_mut(&id).expect("score disappeared");
                row.value = score.value;
                row.remark = Some(score.remark.clone());
                row.clone()
            }
            None => {
                let id = state.next_id();
                let dto = ScoreDto {
                    id,
                    value: score.value,
                    remark: Some(score.remark.clone()),
                    student: ParentIdDto {
                        id: score.student_id,
                    },
                    activity: ParentIdDto {
                        id: score.activity_id,
                    },
                };
                state.scores.insert(id, dto.clone());
                dto
            }
        };
        Ok(dto)
    }

    async fn scores_for_activity(&self, activity: ServerId) -> ApiResult<Vec<ScoreDto>> {
        self.enter("scores_for_activity")?;
        Ok(self
            .state
            .lock()
            .expect("state poisoned")
            .scores
            .values()
            .filter(|s| s.activity.id == activity.0)
            .cloned()
            .collect())
    }

    async fn scores_for_student(&self, student: ServerId) -> ApiResult<Vec<ScoreDto>> {
        self.enter("scores_for_student")?;
        Ok(self
            .state
            .lock()
            .expect("state poisoned")
            .scores
            .values()
            .filter(|s| s.student.id == student.0)
            .cloned()
            .collect())
    }

    async fn export_all_scores(&self) -> ApiResult<Vec<ScoreDto>> {
        self.enter("export_all_scores")?;
        Ok(self
            .state
            .lock()
            .expect("state poisoned")
            .scores
            .values()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_score_upserts_on_student_activity_pair() {
        let fake = FakeBackend::new();
        let group = fake.seed_group("7th", "A", 2025);
        let student = fake.seed_student(group, "Ana", "Lopez");
        let subject = fake.seed_subject("Math");
        let term = fake.seed_term("T1", 2025, true);
        let activity = fake.seed_activity(subject, term, "Quiz 1", 10.0);

        let first = fake
            .save_score(&ScorePayload {
                student_id: student.0,
                activity_id: activity.0,
                value: 7.0,
                remark: String::new(),
            })
            .await
            .unwrap();
        let second = fake
            .save_score(&ScorePayload {
                student_id: student.0,
                activity_id: activity.0,
                value: 9.0,
                remark: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(fake.score_of(student, activity), Some(9.0));
    }

    #[tokio::test]
    async fn create_activity_rejects_weight_overflow() {
        let fake = FakeBackend::new();
        let subject = fake.seed_subject("Math");
        let term = fake.seed_term("T1", 2025, true);
        fake.seed_activity(subject, term, "Exam", 80.0);

        let err = fake
            .create_activity(&ActivityPayload {
                name: "Project".to_string(),
                description: None,
                weight: 30.0,
                subject_id: subject.0,
                term_id: term.0,
                parent_id: None,
                averaged: false,
                date: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn unreachable_backend_fails_with_transport_errors() {
        let fake = FakeBackend::new();
        fake.set_reachable(false);
        let err = fake.list_groups().await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(fake.call_count("list_groups"), 1);
    }
}

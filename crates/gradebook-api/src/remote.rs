//! The remote backend seam.
//!
//! One trait covers every entity endpoint of the school API so the engine
//! can be wired against the real HTTP client or an in-memory fake. Create
//! calls return the full server row (including the assigned identity);
//! list calls return full payloads with denormalized parent references.

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::keys::ServerId;
use crate::models::{
    ActivityDto, ActivityPayload, GroupDto, GroupPayload, ScoreDto, ScorePayload, StudentDto,
    StudentPayload, SubjectDto, SubjectPayload, TermDto, TermPayload,
};

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Cheap liveness probe. Success means the backend is reachable and
    /// answering; the engine treats any decoded HTTP response as alive.
    async fn ping(&self) -> ApiResult<()>;

    // Groups
    async fn list_groups(&self) -> ApiResult<Vec<GroupDto>>;
    async fn create_group(&self, group: &GroupPayload) -> ApiResult<GroupDto>;
    async fn update_group(&self, id: ServerId, group: &GroupPayload) -> ApiResult<GroupDto>;
    async fn delete_group(&self, id: ServerId) -> ApiResult<()>;

    // Students
    async fn students_in_group(&self, group: ServerId) -> ApiResult<Vec<StudentDto>>;
    async fn create_student(&self, student: &StudentPayload) -> ApiResult<StudentDto>;
    async fn update_student(&self, id: ServerId, student: &StudentPayload) -> ApiResult<()>;
    async fn delete_student(&self, id: ServerId) -> ApiResult<()>;

    // Subjects (catalog)
    async fn list_subjects(&self) -> ApiResult<Vec<SubjectDto>>;
    async fn create_subject(&self, subject: &SubjectPayload) -> ApiResult<SubjectDto>;
    async fn update_subject(&self, id: ServerId, subject: &SubjectPayload) -> ApiResult<()>;
    async fn delete_subject(&self, id: ServerId) -> ApiResult<()>;

    // Terms (catalog)
    async fn list_terms(&self) -> ApiResult<Vec<TermDto>>;
    async fn create_term(&self, term: &TermPayload) -> ApiResult<TermDto>;
    async fn update_term(&self, id: ServerId, term: &TermPayload) -> ApiResult<()>;
    async fn delete_term(&self, id: ServerId) -> ApiResult<()>;

    // Activities, scoped to (subject, term) root activities
    async fn list_activities(&self, subject: ServerId, term: ServerId)
        -> ApiResult<Vec<ActivityDto>>;
    async fn create_activity(&self, activity: &ActivityPayload) -> ApiResult<ActivityDto>;
    async fn update_activity(&self, id: ServerId, activity: &ActivityPayload) -> ApiResult<()>;
    async fn delete_activity(&self, id: ServerId) -> ApiResult<()>;

    // Scores: the POST endpoint upserts on (student, activity)
    async fn save_score(&self, score: &ScorePayload) -> ApiResult<ScoreDto>;
    async fn scores_for_activity(&self, activity: ServerId) -> ApiResult<Vec<ScoreDto>>;
    async fn scores_for_student(&self, student: ServerId) -> ApiResult<Vec<ScoreDto>>;
    /// Bulk export of every score, used during PULL instead of one list
    /// call per activity.
    async fn export_all_scores(&self) -> ApiResult<Vec<ScoreDto>>;
}

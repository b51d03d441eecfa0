//! reqwest-backed implementation of [`RemoteBackend`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use gradebook_api::{
    ActivityDto, ActivityPayload, ApiError, ApiResult, GroupDto, GroupPayload, RemoteBackend,
    ScoreDto, ScorePayload, ServerId, StudentDto, StudentPayload, SubjectDto, SubjectPayload,
    TermDto, TermPayload,
};

/// HTTP client for the school backend.
///
/// Every request carries the bearer credential handed in at construction
/// (how it is produced is outside the engine's responsibility) and a
/// bounded timeout so a stalled request cannot block a whole sync cycle.
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::Transport(format!("invalid credential: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map reqwest-level failures into the transient side of the taxonomy.
    fn transport_error(err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Transport(format!("timeout: {err}"))
        } else if err.is_connect() {
            ApiError::Transport(format!("connection error: {err}"))
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }

    /// Classify a non-success status: retryable server trouble vs a
    /// rejection the caller has to act on.
    async fn check(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        let message = if message.len() > 500 {
            format!("{}... (truncated)", &message[..500])
        } else {
            message
        };

        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Err(ApiError::Server {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn expect_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await.map_err(Self::transport_error)?;
        let response = Self::check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn expect_ok(&self, request: RequestBuilder) -> ApiResult<()> {
        let response = request.send().await.map_err(Self::transport_error)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for BackendClient {
    async fn ping(&self) -> ApiResult<()> {
        // Any decoded HTTP response counts as alive; only transport-level
        // failures mean the backend is unreachable.
        let url = self.url("/api/trimestres");
        match self.client.get(&url).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "liveness probe answered");
                Ok(())
            }
            Err(err) => Err(Self::transport_error(err)),
        }
    }

    async fn list_groups(&self) -> ApiResult<Vec<GroupDto>> {
        self.expect_json(self.client.get(self.url("/api/grados"))).await
    }

    async fn create_group(&self, group: &GroupPayload) -> ApiResult<GroupDto> {
        self.expect_json(self.client.post(self.url("/api/grados")).json(group))
            .await
    }

    async fn update_group(&self, id: ServerId, group: &GroupPayload) -> ApiResult<GroupDto> {
        self.expect_json(
            self.client
                .put(self.url(&format!("/api/grados/{id}")))
                .json(group),
        )
        .await
    }

    async fn delete_group(&self, id: ServerId) -> ApiResult<()> {
        self.expect_ok(self.client.delete(self.url(&format!("/api/grados/{id}"))))
            .await
    }

    async fn students_in_group(&self, group: ServerId) -> ApiResult<Vec<StudentDto>> {
        self.expect_json(
            self.client
                .get(self.url(&format!("/api/estudiantes/grado/{group}"))),
        )
        .await
    }

    async fn create_student(&self, student: &StudentPayload) -> ApiResult<StudentDto> {
        self.expect_json(self.client.post(self.url("/api/estudiantes")).json(student))
            .await
    }

    async fn update_student(&self, id: ServerId, student: &StudentPayload) -> ApiResult<()> {
        self.expect_ok(
            self.client
                .put(self.url(&format!("/api/estudiantes/{id}")))
                .json(student),
        )
        .await
    }

    async fn delete_student(&self, id: ServerId) -> ApiResult<()> {
        self.expect_ok(
            self.client
                .delete(self.url(&format!("/api/estudiantes/{id}"))),
        )
        .await
    }

    async fn list_subjects(&self) -> ApiResult<Vec<SubjectDto>> {
        self.expect_json(self.client.get(self.url("/api/materias"))).await
    }

    async fn create_subject(&self, subject: &SubjectPayload) -> ApiResult<SubjectDto> {
        self.expect_json(self.client.post(self.url("/api/materias")).json(subject))
            .await
    }

    async fn update_subject(&self, id: ServerId, subject: &SubjectPayload) -> ApiResult<()> {
        self.expect_ok(
            self.client
                .put(self.url(&format!("/api/materias/{id}")))
                .json(subject),
        )
        .await
    }

    async fn delete_subject(&self, id: ServerId) -> ApiResult<()> {
        self.expect_ok(self.client.delete(self.url(&format!("/api/materias/{id}"))))
            .await
    }

    async fn list_terms(&self) -> ApiResult<Vec<TermDto>> {
        self.expect_json(self.client.get(self.url("/api/trimestres"))).await
    }

    async fn create_term(&self, term: &TermPayload) -> ApiResult<TermDto> {
        self.expect_json(self.client.post(self.url("/api/trimestres")).json(term))
            .await
    }

    async fn update_term(&self, id: ServerId, term: &TermPayload) -> ApiResult<()> {
        self.expect_ok(
            self.client
                .put(self.url(&format!("/api/trimestres/{id}")))
                .json(term),
        )
        .await
    }

    async fn delete_term(&self, id: ServerId) -> ApiResult<()> {
        self.expect_ok(
            self.client
                .delete(self.url(&format!("/api/trimestres/{id}"))),
        )
        .await
    }

    async fn list_activities(
        &self,
        subject: ServerId,
        term: ServerId,
    ) -> ApiResult<Vec<ActivityDto>> {
        self.expect_json(self.client.get(self.url("/api/actividades")).query(&[
            ("materiaId", subject.0),
            ("trimestreId", term.0),
        ]))
        .await
    }

    async fn create_activity(&self, activity: &ActivityPayload) -> ApiResult<ActivityDto> {
        self.expect_json(self.client.post(self.url("/api/actividades")).json(activity))
            .await
    }

    async fn update_activity(&self, id: ServerId, activity: &ActivityPayload) -> ApiResult<()> {
        self.expect_ok(
            self.client
                .put(self.url(&format!("/api/actividades/{id}")))
                .json(activity),
        )
        .await
    }

    async fn delete_activity(&self, id: ServerId) -> ApiResult<()> {
        self.expect_ok(
            self.client
                .delete(self.url(&format!("/api/actividades/{id}"))),
        )
        .await
    }

    async fn save_score(&self, score: &ScorePayload) -> ApiResult<ScoreDto> {
        self.expect_json(self.client.post(self.url("/api/calificaciones")).json(score))
            .await
    }

    async fn scores_for_activity(&self, activity: ServerId) -> ApiResult<Vec<ScoreDto>> {
        self.expect_json(
            self.client
                .get(self.url(&format!("/api/calificaciones/actividad/{activity}"))),
        )
        .await
    }

    async fn scores_for_student(&self, student: ServerId) -> ApiResult<Vec<ScoreDto>> {
        self.expect_json(
            self.client
                .get(self.url(&format!("/api/calificaciones/estudiante/{student}"))),
        )
        .await
    }

    async fn export_all_scores(&self) -> ApiResult<Vec<ScoreDto>> {
        self.expect_json(self.client.get(self.url("/api/calificaciones/all")))
            .await
    }
}

//! HTTP implementation of the exam API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::instrument;

use quizdesk_core::error::ApiError;
use quizdesk_core::model::{ExamResult, Participation, Question, Session, SessionId};
use quizdesk_core::traits::{ExamApi, JoinRequest, SaveProgressRequest, SubmitRequest};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Exam backend reached over REST.
pub struct HttpExamApi {
    base_url: String,
    token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpExamApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            timeout_secs: timeout.as_secs(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("accept", "application/json");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout_secs)
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, error_message(&body)));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(req).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(alias = "detail", alias = "error")]
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionsBody {
    List(Vec<Question>),
    Wrapped { questions: Vec<Question> },
}

#[async_trait]
impl ExamApi for HttpExamApi {
    #[instrument(skip(self))]
    async fn join(&self, code: &str) -> Result<Session, ApiError> {
        let body = JoinRequest {
            code: code.to_string(),
        };
        self.send_json(self.request(Method::POST, "/student/sessions/join").json(&body))
            .await
    }

    #[instrument(skip(self))]
    async fn session(&self, id: SessionId) -> Result<Session, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/student/sessions/{id}")))
            .await
    }

    #[instrument(skip(self))]
    async fn questions(&self, id: SessionId) -> Result<Vec<Question>, ApiError> {
        let body: QuestionsBody = self
            .send_json(self.request(Method::GET, &format!("/student/sessions/{id}/questions")))
            .await?;
        Ok(match body {
            QuestionsBody::List(questions) | QuestionsBody::Wrapped { questions } => questions,
        })
    }

    #[instrument(skip(self))]
    async fn participation(&self, id: SessionId) -> Result<Participation, ApiError> {
        self.send_json(self.request(
            Method::GET,
            &format!("/student/sessions/{id}/participation"),
        ))
        .await
    }

    #[instrument(skip(self, request), fields(answers = request.answers.len()))]
    async fn save_progress(
        &self,
        id: SessionId,
        request: &SaveProgressRequest,
    ) -> Result<(), ApiError> {
        self.send(
            self.request(Method::POST, &format!("/student/sessions/{id}/save-progress"))
                .json(request),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(answers = request.answers.len(), auto = request.auto_submitted))]
    async fn submit(
        &self,
        id: SessionId,
        request: &SubmitRequest,
    ) -> Result<ExamResult, ApiError> {
        self.send_json(
            self.request(Method::POST, &format!("/student/sessions/{id}/submit"))
                .json(request),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn result(&self, id: SessionId) -> Result<ExamResult, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/student/sessions/{id}/result")))
            .await
    }
}

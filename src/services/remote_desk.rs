use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::core::config::Settings;
use crate::db::models::{Exam, ExamResult, Student};
use crate::services::exam_access::AccessError;
use crate::services::exam_codes;
use crate::services::DeskError;
use crate::session::{ResultDraft, ResultSink, SubmitError};

#[derive(Debug, Clone)]
pub struct RemoteDeskConfig {
    /// Desk origin plus API prefix, e.g. `http://desk:8000/api/v1`.
    pub base_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl RemoteDeskConfig {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: format!("{}{}", settings.desk().base_url, settings.api().api_v1_str),
            poll_interval: Duration::from_secs(settings.desk().poll_interval_seconds),
            request_timeout: Duration::from_secs(settings.desk().request_timeout_seconds),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExamStatus {
    #[serde(alias = "isActive")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Talks to a desk server over its JSON API. Every call is attempted once.
#[derive(Debug, Clone)]
pub struct RemoteDesk {
    client: Client,
    base_url: String,
    poll_interval: Duration,
}

impl RemoteDesk {
    pub fn new(config: RemoteDeskConfig) -> Result<Self, DeskError> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
        })
    }

    pub async fn lookup(&self, code: &str, student: Option<&Student>) -> Result<Exam, DeskError> {
        let response = self
            .client
            .post(self.url("/exams/lookup"))
            .json(&json!({
                "exam_code": code,
                "room": student.map(|student| student.room.as_str()),
                "grade": student.map(|student| student.grade.as_str()),
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                Err(AccessError::NotFound(exam_codes::sanitize_code(code)).into())
            }
            StatusCode::CONFLICT => Err(AccessError::NotOpen(code.trim().to_string()).into()),
            _ => decode(response).await,
        }
    }

    pub async fn fetch_exam(&self, exam_id: &str) -> Result<Exam, DeskError> {
        let response = self.client.get(self.url(&format!("/exams/{exam_id}"))).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(DeskError::ExamNotFound(exam_id.to_string()));
        }
        decode(response).await
    }

    pub async fn exam_active(&self, exam_id: &str) -> Result<bool, DeskError> {
        let response =
            self.client.get(self.url(&format!("/exams/{exam_id}/status"))).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(DeskError::ExamNotFound(exam_id.to_string()));
        }
        let status: ExamStatus = decode(response).await?;
        Ok(status.is_active)
    }

    /// Polls the exam's status until every receiver is gone. Unreachable
    /// desks keep the last known value; a deleted exam reads as closed.
    pub fn watch_exam_active(&self, exam: &Exam) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(exam.is_active);
        let desk = self.clone();
        let exam_id = exam.id.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(desk.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => match desk.exam_active(&exam_id).await {
                        Ok(active) => {
                            tx.send_if_modified(|current| {
                                let changed = *current != active;
                                *current = active;
                                changed
                            });
                        }
                        Err(DeskError::ExamNotFound(_)) => {
                            tx.send_replace(false);
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(
                                exam_id = %exam_id,
                                error = %err,
                                "Exam status poll failed"
                            );
                        }
                    },
                }
            }
            tracing::debug!(exam_id = %exam_id, "Exam status poller stopped");
        });

        rx
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ResultSink for RemoteDesk {
    async fn submit_result(&self, draft: ResultDraft) -> Result<ExamResult, SubmitError> {
        let response = self.client.post(self.url("/results")).json(&draft).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            return Err(SubmitError::Rejected { status: status.as_u16(), detail });
        }

        let result: ExamResult = response.json().await?;
        tracing::info!(
            exam_id = %result.exam_id,
            result_id = %result.id,
            trigger = draft.trigger.as_str(),
            "Exam result accepted by desk"
        );
        Ok(result)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DeskError> {
    let status = response.status();
    if !status.is_success() {
        let detail = error_detail(response).await;
        return Err(DeskError::Rejected { status: status.as_u16(), detail });
    }
    Ok(response.json().await?)
}

async fn error_detail(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body.detail,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    }
}

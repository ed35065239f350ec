/// Scoring Client — the single point of entry for calls to the external
/// scoring service.
///
/// ARCHITECTURAL RULE: No other module talks to the scoring service directly.
/// Responses are normalised into `MatchResult` here, before anything else sees them.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::matching::models::{Document, JdPayload, MatchResult};

pub mod wire;

use wire::{normalize_rank_rows, AnalyzeResponse, RankRow};

const RANK_PATH: &str = "/rank-candidates";
const ANALYZE_PATH: &str = "/analyze-resume";

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scoring service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Response is missing required field '{0}'")]
    MissingField(&'static str),
}

/// One scoring call: either a whole resume batch against one job description
/// (recruiter flow) or a single resume against one job description (applicant flow).
#[derive(Debug, Clone)]
pub enum ScoringRequest {
    Rank {
        job_description: Document,
        resumes: Vec<Document>,
    },
    Analyze {
        resume: Document,
        job_description: JdPayload,
    },
}

/// Anything that can turn a `ScoringRequest` into canonical match results.
///
/// Carried in `AppState` behind the orchestrator as `Arc<dyn ScoringService>`.
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, request: &ScoringRequest) -> Result<Vec<MatchResult>, ScoringError>;
}

/// HTTP client for the scoring service. No retries: a failed call fails the run.
#[derive(Clone)]
pub struct ScoringClient {
    client: Client,
    base_url: String,
}

impl ScoringClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// POST /rank-candidates with one `jd` part and one `resumes` part per resume.
    pub async fn rank(
        &self,
        job_description: &Document,
        resumes: &[Document],
    ) -> Result<Vec<MatchResult>, ScoringError> {
        let mut form = Form::new().part("jd", file_part(job_description)?);
        for resume in resumes {
            form = form.part("resumes", file_part(resume)?);
        }

        let rows: Vec<RankRow> = self.post_form(RANK_PATH, form).await?;
        debug!("Rank response: {} rows for {} resumes", rows.len(), resumes.len());
        normalize_rank_rows(rows)
    }

    /// POST /analyze-resume with a `resume` part and either a `jd` part or `jd_text_input`.
    pub async fn analyze(
        &self,
        resume: &Document,
        job_description: &JdPayload,
    ) -> Result<MatchResult, ScoringError> {
        let form = Form::new().part("resume", file_part(resume)?);
        let form = match job_description {
            JdPayload::Document(doc) => form.part("jd", file_part(doc)?),
            JdPayload::Text(text) => form.text("jd_text_input", text.clone()),
        };

        let response: AnalyzeResponse = self.post_form(ANALYZE_PATH, form).await?;
        response.into_match_result(&resume.file_name)
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T, ScoringError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Scoring service returned {} for {}: {}", status, path, body);
            return Err(ScoringError::Api {
                status: status.as_u16(),
                message: error_detail(&body),
            });
        }

        debug!("Scoring service {} responded with {} bytes", path, body.len());
        serde_json::from_str(&body).map_err(ScoringError::Parse)
    }
}

#[async_trait]
impl ScoringService for ScoringClient {
    async fn score(&self, request: &ScoringRequest) -> Result<Vec<MatchResult>, ScoringError> {
        match request {
            ScoringRequest::Rank {
                job_description,
                resumes,
            } => self.rank(job_description, resumes).await,
            ScoringRequest::Analyze {
                resume,
                job_description,
            } => Ok(vec![self.analyze(resume, job_description).await?]),
        }
    }
}

fn file_part(document: &Document) -> Result<Part, ScoringError> {
    Ok(Part::bytes(document.bytes.to_vec())
        .file_name(document.file_name.clone())
        .mime_str(&document.content_type)?)
}

/// Pulls the human-readable `detail` out of an error body, falling back to the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Multipart, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Echoes every `resumes` part back as a row so part names and order are observable.
    async fn rank_stub(mut multipart: Multipart) -> Json<Value> {
        let mut rows = Vec::new();
        let mut score = 10.0;
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("resumes") {
                rows.push(json!({
                    "candidate_name": field.file_name().unwrap_or_default(),
                    "ats_score": score,
                    "skill_match": 50.0,
                    "keyword_density": 25.4,
                    "matched_skills": ["rust", "sql"],
                    "missing_skills": "None"
                }));
                score += 20.0;
            }
        }
        Json(Value::Array(rows))
    }

    async fn analyze_stub(mut multipart: Multipart) -> Json<Value> {
        let mut jd_text = String::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("jd_text_input") {
                jd_text = field.text().await.unwrap();
            }
        }
        Json(json!({
            "ats_score": if jd_text.contains("Rust") { 80.4 } else { 10.0 },
            "match_details": {"Skill Match": 75.0, "Keyword Density": 60.0, "Matched Skills": []},
            "suggestions": []
        }))
    }

    /// Reports every part it received as `name:file_name` in `suggestions`.
    async fn part_echo_stub(mut multipart: Multipart) -> Json<Value> {
        let mut parts = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            parts.push(format!(
                "{}:{}",
                field.name().unwrap_or_default(),
                field.file_name().unwrap_or_default()
            ));
        }
        Json(json!({
            "ats_score": 55.0,
            "match_details": {"Skill Match": 40.0, "Keyword Density": 20.0},
            "suggestions": parts
        }))
    }

    fn doc(name: &str) -> Document {
        Document::from_text(name, "resume body")
    }

    #[tokio::test]
    async fn test_rank_sends_every_resume_in_order() {
        let base = spawn_stub(Router::new().route(RANK_PATH, post(rank_stub))).await;
        let client = ScoringClient::new(base, Duration::from_secs(5));

        let results = client
            .rank(&doc("jd.txt"), &[doc("a.txt"), doc("b.txt"), doc("c.txt")])
            .await
            .unwrap();

        let names: Vec<&str> = results.iter().map(|r| r.candidate_name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(results[2].ats_score, 50);
        assert_eq!(results[0].keyword_density, 25);
        assert!(results[0].missing_skills.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_sends_free_text() {
        let base = spawn_stub(Router::new().route(ANALYZE_PATH, post(analyze_stub))).await;
        let client = ScoringClient::new(base, Duration::from_secs(5));

        let results = client
            .score(&ScoringRequest::Analyze {
                resume: doc("me.pdf"),
                job_description: JdPayload::Text("Senior Rust engineer".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate_name, "me.pdf");
        assert_eq!(results[0].ats_score, 80);
    }

    #[tokio::test]
    async fn test_analyze_sends_document_as_jd_part() {
        let base = spawn_stub(Router::new().route(ANALYZE_PATH, post(part_echo_stub))).await;
        let client = ScoringClient::new(base, Duration::from_secs(5));

        let result = client
            .analyze(&doc("me.pdf"), &JdPayload::Document(doc("backend.pdf")))
            .await
            .unwrap();

        let parts = result.analysis.unwrap().suggestions;
        assert_eq!(parts, vec!["resume:me.pdf", "jd:backend.pdf"]);
        assert!(!parts.iter().any(|p| p.starts_with("jd_text_input")));
        assert_eq!(result.ats_score, 55);
    }

    #[tokio::test]
    async fn test_non_success_status_surfaces_detail() {
        let router = Router::new().route(
            RANK_PATH,
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"detail": "JD Error: Unsupported file format."})),
                )
            }),
        );
        let client = ScoringClient::new(spawn_stub(router).await, Duration::from_secs(5));

        let err = client.rank(&doc("jd.bin"), &[doc("a.txt")]).await.unwrap_err();
        match err {
            ScoringError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "JD Error: Unsupported file format.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_a_transport_failure() {
        let router = Router::new().route(
            RANK_PATH,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!([]))
            }),
        );
        let client = ScoringClient::new(spawn_stub(router).await, Duration::from_millis(100));

        let err = client.rank(&doc("jd.txt"), &[doc("a.txt")]).await.unwrap_err();
        assert!(matches!(err, ScoringError::Http(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_non_json_body_is_parse_error() {
        let router = Router::new().route(RANK_PATH, post(|| async { "<html>oops</html>" }));
        let client = ScoringClient::new(spawn_stub(router).await, Duration::from_secs(5));

        let err = client.rank(&doc("jd.txt"), &[doc("a.txt")]).await.unwrap_err();
        assert!(matches!(err, ScoringError::Parse(_)));
    }

    #[test]
    fn test_error_detail_falls_back_to_body() {
        assert_eq!(error_detail(r#"{"detail": "bad"}"#), "bad");
        assert_eq!(error_detail("plain failure"), "plain failure");
    }
}

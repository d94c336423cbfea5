//! `/api/jobs`: operator surface of the job supervisor.

use super::auth::require_internal;
use super::error::ApiError;
use super::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use relay_application::JobSupervisor;
use relay_domain::{Job, JobEvent, JobEventKind, JobSpec};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub name: String,
    pub spec: JobSpec,
    #[serde(default)]
    pub backend: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForkBody {
    #[serde(default)]
    pub backend: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SteerBody {
    pub text: String,
}

/// Counters derived from a job's event log.
fn stats(events: &[JobEvent]) -> Value {
    let count = |kind: JobEventKind| events.iter().filter(|e| e.kind == kind).count();
    json!({
        "chunks": count(JobEventKind::ChunkDone),
        "retries": count(JobEventKind::Retry),
        "failovers": events
            .iter()
            .filter(|e| e.kind == JobEventKind::Failover && e.get("refused").is_none())
            .count(),
        "stalls": count(JobEventKind::WatchdogTimeout),
    })
}

fn summary(job: &Job, events: &[JobEvent]) -> Value {
    let mut value = json!({
        "id": job.id,
        "name": job.name,
        "state": job.state,
        "backend": job.backend,
        "created_at": job.created_at,
        "updated_at": job.updated_at,
    });
    if let (Value::Object(map), Value::Object(counters)) = (&mut value, stats(events)) {
        map.extend(counters);
    }
    value
}

async fn admit(jobs: &Arc<JobSupervisor>) {
    if let Err(e) = jobs.admit_pending().await {
        warn!("Job admission failed: {e}");
    }
}

/// `GET /api/jobs`, newest first.
pub async fn list_jobs(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_internal(&app, &headers)?;
    let mut jobs = app.jobs.list().await?;
    jobs.reverse();
    let mut items = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let events = app.jobs.events(&job.id).await.unwrap_or_default();
        items.push(summary(job, &events));
    }
    Ok(Json(json!({"jobs": items})))
}

/// `POST /api/jobs`
pub async fn submit_job(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    require_internal(&app, &headers)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    let backend = body
        .backend
        .unwrap_or_else(|| app.config().jobs.default_backend);
    let job = app.jobs.submit(body.name, body.spec, backend).await?;
    admit(&app.jobs).await;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `GET /api/jobs/{id}`
pub async fn get_job(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    require_internal(&app, &headers)?;
    let job = app.jobs.get(&id).await?;
    let events = app.jobs.events(&id).await?;
    Ok(Json(json!({
        "job": job,
        "stats": stats(&events),
        "artifacts": job.artifacts,
    })))
}

/// `GET /api/jobs/{id}/events`
pub async fn job_events(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<JobEvent>>, ApiError> {
    require_internal(&app, &headers)?;
    Ok(Json(app.jobs.events(&id).await?))
}

/// `POST /api/jobs/{id}/cancel`
pub async fn cancel_job(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    require_internal(&app, &headers)?;
    Ok(Json(app.jobs.cancel(&id).await?))
}

/// `POST /api/jobs/{id}/resume`
pub async fn resume_job(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    require_internal(&app, &headers)?;
    let job = app.jobs.resume(&id).await?;
    admit(&app.jobs).await;
    Ok(Json(job))
}

/// `POST /api/jobs/{id}/fork`
pub async fn fork_job(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ForkBody>>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    require_internal(&app, &headers)?;
    let ForkBody { backend } = body.map(|Json(b)| b).unwrap_or_default();
    let job = app.jobs.fork(&id, backend).await?;
    admit(&app.jobs).await;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `POST /api/jobs/{id}/next`: steer the next turn.
pub async fn steer_job(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<SteerBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_internal(&app, &headers)?;
    if body.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }
    app.jobs.steer(&id, &body.text).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({"status": "queued"}))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::INTERNAL_TOKEN_HEADER;
    use crate::server::state::test_support::app;
    use axum::http::HeaderValue;
    use relay_domain::JobState;

    fn authed() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(INTERNAL_TOKEN_HEADER, HeaderValue::from_static("secret"));
        headers
    }

    fn spec() -> JobSpec {
        serde_json::from_value(json!({"model": "m", "maxChunks": 2})).unwrap()
    }

    #[tokio::test]
    async fn token_is_required() {
        let app = app(Some("secret"));
        let err = list_jobs(State(app.state.clone()), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn submit_uses_default_backend() {
        let app = app(Some("secret"));
        let body = SubmitBody {
            name: "story".into(),
            spec: spec(),
            backend: None,
        };
        let (status, Json(job)) = submit_job(State(app.state.clone()), authed(), Json(body))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job.backend, "bridge");
        assert_eq!(job.state, JobState::Pending);

        let Json(listing) = list_jobs(State(app.state.clone()), authed()).await.unwrap();
        assert_eq!(listing["jobs"][0]["id"], job.id);
        assert_eq!(listing["jobs"][0]["chunks"], 0);
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let app = app(Some("secret"));
        let body = SubmitBody {
            name: "story".into(),
            spec: spec(),
            backend: Some("nope".into()),
        };
        let err = submit_job(State(app.state.clone()), authed(), Json(body))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_job_is_404() {
        let app = app(Some("secret"));
        let err = get_job(State(app.state.clone()), authed(), Path("missing".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_steer_and_inspect() {
        let app = app(Some("secret"));
        let job = app.state.jobs.submit("story", spec(), "bridge").await.unwrap();

        let (status, Json(body)) = steer_job(
            State(app.state.clone()),
            authed(),
            Path(job.id.clone()),
            Json(SteerBody { text: "more dialogue".into() }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "queued");

        let Json(cancelled) = cancel_job(State(app.state.clone()), authed(), Path(job.id.clone()))
            .await
            .unwrap();
        assert_eq!(cancelled.state, JobState::Cancelled);

        let Json(detail) = get_job(State(app.state.clone()), authed(), Path(job.id.clone()))
            .await
            .unwrap();
        assert_eq!(detail["job"]["state"], "CANCELLED");
        assert_eq!(detail["stats"]["retries"], 0);

        let Json(events) = job_events(State(app.state.clone()), authed(), Path(job.id.clone()))
            .await
            .unwrap();
        assert_eq!(events.first().map(|e| &e.kind), Some(&JobEventKind::JobSubmitted));
        assert!(events.iter().any(|e| e.kind == JobEventKind::NextOverrideQueued));
        assert!(events.iter().any(|e| e.kind == JobEventKind::JobCancelled));
    }
}

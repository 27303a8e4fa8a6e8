//! In-process stand-in for the Google OAuth2 token endpoint and the Batch
//! v1 jobs API, served by axum on an ephemeral localhost port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{json, Value};

use netprobe_cloud::auth::AssertionClaims;

pub const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/test_service_account.pem");
pub const TEST_PUBLIC_KEY: &str = include_str!("../fixtures/test_service_account.pub.pem");
pub const TEST_CLIENT_EMAIL: &str = "probe@galaxy-dev.iam.gserviceaccount.com";
pub const TEST_ACCESS_TOKEN: &str = "ya29.test-access-token";

/// A create-job request as seen by the fake Batch API.
#[derive(Debug, Clone)]
pub struct ReceivedJob {
    pub project: String,
    pub location: String,
    pub job_id: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Default)]
pub struct FakeState {
    pub token_uri: String,
    pub token_requests: AtomicUsize,
    pub received: Mutex<Vec<ReceivedJob>>,
    /// When set, create-job answers with this status and body.
    pub create_failure: Mutex<Option<(StatusCode, String)>>,
}

pub struct FakeGoogle {
    pub base_url: String,
    pub state: Arc<FakeState>,
}

impl FakeGoogle {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{addr}");

        let state = Arc::new(FakeState {
            token_uri: format!("{base_url}/token"),
            ..FakeState::default()
        });

        let app = Router::new()
            .route("/token", post(token))
            .route(
                "/v1/projects/{project}/locations/{location}/jobs",
                post(create_job),
            )
            .route(
                "/v1/projects/{project}/locations/{location}/jobs/{job}",
                get(get_job),
            )
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake google");
        });

        Self { base_url, state }
    }

    pub fn token_uri(&self) -> String {
        self.state.token_uri.clone()
    }

    pub fn batch_endpoint(&self) -> String {
        format!("{}/v1", self.base_url)
    }

    pub fn fail_create_with(&self, status: StatusCode, body: &str) {
        *self.state.create_failure.lock().expect("lock") = Some((status, body.to_string()));
    }

    pub fn received(&self) -> Vec<ReceivedJob> {
        self.state.received.lock().expect("lock").clone()
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    /// Service-account key JSON pointing at this server's token endpoint.
    pub fn service_account_json(&self) -> String {
        json!({
            "type": "service_account",
            "project_id": "galaxy-dev",
            "private_key_id": "test-key-id",
            "private_key": TEST_PRIVATE_KEY,
            "client_email": TEST_CLIENT_EMAIL,
            "token_uri": self.token_uri(),
        })
        .to_string()
    }
}

async fn token(
    State(state): State<Arc<FakeState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);

    if form.get("grant_type").map(String::as_str)
        != Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
    {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "unsupported_grant_type"})))
            .into_response();
    }

    let Some(assertion) = form.get("assertion") else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_request"})))
            .into_response();
    };

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[state.token_uri.as_str()]);
    let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).expect("public key");

    match decode::<AssertionClaims>(assertion, &key, &validation) {
        Ok(data) if data.claims.iss == TEST_CLIENT_EMAIL => Json(json!({
            "access_token": TEST_ACCESS_TOKEN,
            "expires_in": 3599,
            "token_type": "Bearer",
        }))
        .into_response(),
        _ => (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response(),
    }
}

async fn create_job(
    State(state): State<Arc<FakeState>>,
    Path((project, location)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let job_id = query.get("job_id").cloned();
    state.received.lock().expect("lock").push(ReceivedJob {
        project: project.clone(),
        location: location.clone(),
        job_id: job_id.clone(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    if let Some((status, body)) = state.create_failure.lock().expect("lock").clone() {
        return (status, body).into_response();
    }

    let job_id = job_id.unwrap_or_else(|| "generated".to_string());
    let mut job = body;
    job["name"] = json!(format!("projects/{project}/locations/{location}/jobs/{job_id}"));
    job["uid"] = json!(format!("{job_id}-uid"));
    job["status"] = json!({"state": "QUEUED"});
    Json(job).into_response()
}

async fn get_job(Path((project, location, job)): Path<(String, String, String)>) -> Response {
    Json(json!({
        "name": format!("projects/{project}/locations/{location}/jobs/{job}"),
        "uid": format!("{job}-uid"),
        "status": {"state": "RUNNING"},
    }))
    .into_response()
}

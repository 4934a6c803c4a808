use crate::data::{DataError, Employee, School};
use crate::distance::{DistanceMatrix, airline_matrix};
use crate::report::interpret;
use crate::scenario::ScenarioSummary;
use crate::session::{
    Phase, PlanInputs, PlanSession, SessionStatus, SolveOutcome, StartSolveError, build_snapshot,
};
use crate::solver::{EngineError, SolverEngine};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

/// Shared state behind every handler. The session lock is never held
/// across a solve; the engine slot is filled once by the warm-up task and
/// stays empty if the probe fails.
#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<PlanSession>>,
    engine: Arc<OnceLock<Arc<SolverEngine>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            session: Arc::new(Mutex::new(PlanSession::new())),
            engine: Arc::new(OnceLock::new()),
        }
    }

    fn engine(&self) -> Result<Arc<SolverEngine>, ApiError> {
        self.engine
            .get()
            .cloned()
            .ok_or(ApiError::EngineUnavailable)
    }

    /// Installs a probed engine. Returns false when a handle was already
    /// installed.
    pub(crate) fn set_engine(&self, engine: SolverEngine) -> bool {
        self.engine.set(Arc::new(engine)).is_ok()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Probes the solver backend off the runtime and fills the engine slot.
/// Solve endpoints answer 503 until the probe has succeeded.
pub fn start_engine(state: &AppState) {
    let state = state.clone();
    tokio::spawn(async move {
        match tokio::task::spawn_blocking(SolverEngine::probe).await {
            Ok(Ok(engine)) => {
                if state.set_engine(engine) {
                    info!("Solver engine is ready");
                }
            }
            Ok(Err(e)) => error!("Solver engine probe failed: {e}"),
            Err(e) => error!("Solver engine probe task crashed: {e}"),
        }
    });
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("solver engine is not ready yet")]
    EngineUnavailable,

    #[error(transparent)]
    Start(#[from] StartSolveError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("no solve outcome is available yet")]
    NoReport,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Data(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Start(_) => StatusCode::CONFLICT,
            ApiError::Engine(EngineError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NoReport => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InputsAccepted {
    generation: u64,
    phase: Phase,
    variables: usize,
    constraints: usize,
    summary: ScenarioSummary,
}

async fn put_inputs(
    State(state): State<AppState>,
    Json(inputs): Json<PlanInputs>,
) -> Result<Json<InputsAccepted>, ApiError> {
    let mut session = state.session.lock().await;
    let snapshot = session.update(&inputs)?;
    Ok(Json(InputsAccepted {
        generation: session.generation(),
        phase: session.phase(),
        variables: snapshot.problem.variable_count(),
        constraints: snapshot.problem.constraint_count(),
        summary: snapshot.summary.clone(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveStarted {
    generation: u64,
    phase: Phase,
}

/// Kicks off an asynchronous solve of the current program and replies
/// immediately. The result lands in the session unless newer inputs have
/// arrived in the meantime.
async fn post_solve(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SolveStarted>), ApiError> {
    let engine = state.engine()?;
    let ticket = {
        let mut session = state.session.lock().await;
        session.begin_solve()?
    };
    let started = SolveStarted {
        generation: ticket.generation,
        phase: Phase::Solving,
    };
    let session = state.session.clone();
    tokio::spawn(async move {
        let result = engine.solve(&ticket.snapshot.problem).await;
        session.lock().await.finish_solve(&ticket, result);
    });
    Ok((StatusCode::ACCEPTED, Json(started)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    engine_ready: bool,
    #[serde(flatten)]
    session: SessionStatus,
}

async fn get_status(State(state): State<AppState>) -> Json<StatusView> {
    let session = state.session.lock().await.status();
    Json(StatusView {
        engine_ready: state.engine.get().is_some(),
        session,
    })
}

async fn get_report(State(state): State<AppState>) -> Result<Json<SolveOutcome>, ApiError> {
    let session = state.session.lock().await;
    let outcome = session.outcome().cloned().ok_or(ApiError::NoReport)?;
    Ok(Json(outcome))
}

/// Stateless pipeline: merge, build, solve and interpret in one call.
/// Non-usable verdicts come back as data with empty tables, not as errors.
async fn solve_once(
    State(state): State<AppState>,
    Json(inputs): Json<PlanInputs>,
) -> Result<Json<SolveOutcome>, ApiError> {
    let engine = state.engine()?;
    let snapshot = build_snapshot(&inputs)?;
    let solution = engine.solve(&snapshot.problem).await?;
    let report = interpret(
        &solution,
        &snapshot.effective,
        &snapshot.distances,
        snapshot.variant,
    );
    Ok(Json(SolveOutcome::Completed { report }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AirlineRequest {
    schools: Vec<School>,
    employees: Vec<Employee>,
}

/// Bundled distance collaborator: great-circle distances in meters, rows
/// aligned to the school list and columns to the employee list.
async fn airline_distances(
    Json(request): Json<AirlineRequest>,
) -> Result<Json<DistanceMatrix>, ApiError> {
    let matrix = airline_matrix(&request.schools, &request.employees)?;
    Ok(Json(matrix))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/v1/plan/inputs", put(put_inputs))
        .route("/v1/plan/solve", post(post_solve))
        .route("/v1/plan/status", get(get_status))
        .route("/v1/plan/report", get(get_report))
        .route("/v1/solve", post(solve_once))
        .route("/v1/distances/airline", post(airline_distances))
        .with_state(state)
}

pub async fn run_server() {
    let state = AppState::new();
    start_engine(&state);
    let app = app(state);

    let addr =
        std::env::var("EXAM_PLANNER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    println!("Server running at http://{}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    fn ready_state() -> AppState {
        let state = AppState::new();
        assert!(state.set_engine(SolverEngine::probe().unwrap()));
        state
    }

    fn plan_body() -> Value {
        json!({
            "schools": [
                {"id": "s1", "name": "School s1", "lon": 1.0, "lat": 50.0},
                {"id": "s2", "name": "School s2", "lon": 2.0, "lat": 50.0}
            ],
            "employees": [
                {"id": "p1", "name": "P1", "lon": 10.0, "lat": 51.0, "role": "physician"},
                {"id": "p2", "name": "P2", "lon": 11.0, "lat": 51.0, "role": "physician"},
                {"id": "a1", "name": "A1", "lon": 12.0, "lat": 51.0, "role": "assistant"},
                {"id": "a2", "name": "A2", "lon": 13.0, "lat": 51.0, "role": "assistant"}
            ],
            "distances": [
                [100.0, 200.0, 300.0, 400.0],
                [500.0, 600.0, 700.0, 800.0]
            ],
            "scenario": {
                "childrenPerSchool": {"s1": 3, "s2": 2},
                "capacityPerEmployee": {
                    "p1": {"min": 0, "max": 5},
                    "p2": {"min": 0, "max": 5},
                    "a1": {"min": 0, "max": 5},
                    "a2": {"min": 0, "max": 5}
                }
            },
            "variant": "assignChildren"
        })
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn wait_for_phase(app: &Router, phase: &str) -> Value {
        for _ in 0..200 {
            let (status, body) = send(app.clone(), get_request("/v1/plan/status")).await;
            assert_eq!(status, StatusCode::OK);
            if body["phase"] == phase {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached phase {phase}");
    }

    #[tokio::test]
    async fn one_shot_solve_returns_the_complete_outcome() {
        let app = app(ready_state());

        let (status, body) = send(app, json_request("POST", "/v1/solve", &plan_body())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "completed");
        assert_eq!(body["status"], "optimal");
        assert_eq!(body["objective"], 3600.0);
        let total: f64 = body["assignments"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["children"].as_f64().unwrap())
            .sum();
        assert_eq!(total, 10.0);
        assert!(!body["employees"].as_array().unwrap().is_empty());
        assert!(!body["links"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_shot_solve_reports_infeasibility_as_data() {
        let app = app(ready_state());
        let mut body = plan_body();
        // a single child more than the physicians can carry
        body["scenario"]["childrenPerSchool"]["s1"] = json!(9);

        let (status, body) = send(app, json_request("POST", "/v1/solve", &body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "completed");
        assert_eq!(body["status"], "infeasible");
        assert!(body["assignments"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_references_are_rejected_with_422() {
        let app = app(ready_state());
        let mut body = plan_body();
        body["scenario"]["forcedPairs"] = json!([{"school": "nope", "employee": "p1"}]);

        let (status, body) = send(app, json_request("POST", "/v1/solve", &body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn solving_is_disabled_until_the_engine_is_ready() {
        let app = app(AppState::new());

        let (status, _) = send(app.clone(), json_request("POST", "/v1/solve", &plan_body())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(app.clone(), post_request("/v1/plan/solve")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = send(app, get_request("/v1/plan/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["engineReady"], false);
        assert_eq!(body["phase"], "idle");
    }

    #[tokio::test]
    async fn plan_session_runs_end_to_end() {
        let app = app(ready_state());

        let (status, body) =
            send(app.clone(), json_request("PUT", "/v1/plan/inputs", &plan_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["generation"], 1);
        assert_eq!(body["phase"], "ready");
        assert_eq!(body["variables"], 8);
        assert_eq!(body["constraints"], 8);
        assert_eq!(body["summary"]["totalChildren"], 5);

        let (status, body) = send(app.clone(), post_request("/v1/plan/solve")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["generation"], 1);
        assert_eq!(body["phase"], "solving");

        let status_body = wait_for_phase(&app, "solved").await;
        assert_eq!(status_body["engineReady"], true);
        assert_eq!(status_body["outcome"]["status"], "optimal");

        let (status, body) = send(app, get_request("/v1/plan/report")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "completed");
        assert_eq!(body["objective"], 3600.0);
    }

    #[tokio::test]
    async fn solving_before_inputs_is_a_conflict() {
        let app = app(ready_state());

        let (status, body) = send(app, post_request("/v1/plan/solve")).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("inputs"));
    }

    #[tokio::test]
    async fn report_is_missing_until_a_solve_has_applied() {
        let app = app(ready_state());

        let (status, _) = send(app.clone(), get_request("/v1/plan/report")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send(app.clone(), json_request("PUT", "/v1/plan/inputs", &plan_body())).await;
        assert_eq!(status, StatusCode::OK);

        // inputs alone do not produce a report
        let (status, _) = send(app, get_request("/v1/plan/report")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stale_matrix_is_rejected_at_input_time() {
        let app = app(ready_state());
        let mut body = plan_body();
        body["distances"] = json!([[100.0, 200.0, 300.0, 400.0]]);

        let (status, body) = send(app, json_request("PUT", "/v1/plan/inputs", &body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("distance matrix"));
    }

    #[tokio::test]
    async fn airline_endpoint_returns_a_school_major_matrix() {
        let app = app(AppState::new());
        let body = json!({
            "schools": [
                {"id": "s1", "name": "S1", "lon": 9.0, "lat": 50.0},
                {"id": "s2", "name": "S2", "lon": 10.0, "lat": 50.0}
            ],
            "employees": [
                {"id": "e1", "name": "E1", "lon": 9.0, "lat": 50.0, "role": "physician"}
            ]
        });

        let (status, body) = send(app, json_request("POST", "/v1/distances/airline", &body)).await;

        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_array().unwrap().len(), 1);
        assert_eq!(rows[0][0], 0.0);
        assert!(rows[1][0].as_f64().unwrap() > 70_000.0);
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use clap::Parser;
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tower::ServiceExt;
use tower::service_fn;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::canvas::{CanvasEvent, Mode, PointerEvent, Scene};
use crate::config::CanvasConfig;
use crate::editor::Editor;
use crate::error::{GraphError, LoadError};
use crate::geometry::{Point, Transform};
use crate::graph::{ConnectionPatch, GraphModel, NodePatch};
use crate::model::{Connection, Diagram, Node, NodeType, Question};

/// Arguments for running the flowcanvas editing server
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowcanvas serve",
    about = "Serve a flowchart over a JSON editing API."
)]
pub struct ServeArgs {
    /// Flowchart JSON file to edit. Created on first save when missing.
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,

    /// Background color for rendered SVG previews.
    #[arg(long = "background-color", default_value = "white")]
    pub background_color: String,

    /// Canvas configuration file (JSON).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Directory holding a static front-end to serve next to the API.
    #[arg(long = "ui-dir", env = "FLOWCANVAS_UI_DIR")]
    pub ui_dir: Option<PathBuf>,
}

struct ServeState {
    source_path: PathBuf,
    background: String,
    editor: RwLock<Editor>,
    save_lock: Mutex<()>,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

#[derive(Debug, Deserialize)]
struct NewNodeRequest {
    #[serde(rename = "type")]
    node_type: NodeType,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct NewConnectionRequest {
    from: String,
    to: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct NewQuestionRequest {
    #[serde(default)]
    category: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    answer: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DetailsRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    general_notes: Option<String>,
}

/// `text: null` (or a missing field) cancels the edit in progress.
#[derive(Debug, Deserialize)]
struct LabelRequest {
    #[serde(default)]
    text: Option<String>,
}

impl ServeState {
    async fn save(&self) -> Result<()> {
        let json = self
            .editor
            .read()
            .await
            .export_json()
            .context("failed to serialize flowchart")?;
        let _guard = self.save_lock.lock().await;
        tokio::fs::write(&self.source_path, json.as_bytes())
            .await
            .with_context(|| format!("failed to write '{}'", self.source_path.display()))?;
        info!("saved flowchart to {}", self.source_path.display());
        Ok(())
    }
}

/// Reads the served file, or starts an empty diagram when it does not exist yet.
pub fn load_model(path: &std::path::Path) -> Result<GraphModel> {
    if !path.exists() {
        info!(
            "'{}' does not exist yet; starting a new flowchart",
            path.display()
        );
        return Ok(GraphModel::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let mut model = GraphModel::default();
    model
        .load_from_json(&contents)
        .with_context(|| format!("failed to load flowchart '{}'", path.display()))?;
    Ok(model)
}

pub fn router(editor: Editor, source_path: PathBuf, background: String) -> Router {
    let state = Arc::new(ServeState {
        source_path,
        background,
        editor: RwLock::new(editor),
        save_lock: Mutex::new(()),
    });

    Router::new()
        .route(
            "/api/diagram",
            get(get_diagram).put(put_diagram).delete(delete_diagram),
        )
        .route("/api/diagram/details", put(put_details))
        .route("/api/diagram/save", post(save_diagram))
        .route("/api/diagram/svg", get(get_svg))
        .route("/api/diagram/text", get(get_text))
        .route("/api/nodes", post(post_node))
        .route("/api/nodes/:id", put(put_node).delete(delete_node))
        .route("/api/connections", post(post_connection))
        .route(
            "/api/connections/:id",
            put(put_connection).delete(delete_connection),
        )
        .route("/api/questions", post(post_question))
        .route(
            "/api/questions/:id",
            put(put_question).delete(delete_question),
        )
        .route("/api/canvas/mode", put(put_mode))
        .route("/api/canvas/pointer", post(post_pointer))
        .route("/api/canvas/fit", post(post_fit))
        .route("/api/canvas/reset", post(post_reset))
        .route("/api/canvas/scene", get(get_scene))
        .route("/api/canvas/label", post(post_label))
        .with_state(state)
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => CanvasConfig::from_file(path)?,
        None => CanvasConfig::default(),
    };
    let model = load_model(&args.input)?;
    let editor = Editor::new(model, config);

    let mut app = router(editor, args.input.clone(), args.background_color.clone());

    if let Some(root) = locate_ui_dir(args.ui_dir.as_deref())? {
        info!("serving static front-end from {}", root.display());
        let static_dir = ServeDir::new(root.clone())
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(root.join("index.html")));

        let static_service = service_fn(move |req| {
            let svc = static_dir.clone();
            async move {
                match svc.oneshot(req).await {
                    Ok(response) => Ok(response.map(axum::body::Body::new)),
                    Err(error) => {
                        let message = format!("Static file error: {error}");
                        Ok((StatusCode::INTERNAL_SERVER_ERROR, message).into_response())
                    }
                }
            }
        });

        app = app.fallback_service(static_service);
    }

    let app = app.layer(CorsLayer::permissive());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("flowcanvas server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    info!("server stopped");
    Ok(())
}

fn locate_ui_dir(requested: Option<&std::path::Path>) -> Result<Option<PathBuf>> {
    let Some(dir) = requested else {
        return Ok(None);
    };
    if dir.join("index.html").is_file() {
        Ok(Some(dir.to_path_buf()))
    } else {
        Err(anyhow!(
            "UI directory '{}' does not contain an index.html",
            dir.display()
        ))
    }
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

fn graph_error(err: GraphError) -> (StatusCode, String) {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, err.to_string())
}

fn load_error(err: LoadError) -> (StatusCode, String) {
    warn!("rejected flowchart upload: {err}");
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn with_content_type(body: String, content_type: &'static str) -> Response {
    let mut response = Response::new(body.into());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn get_diagram(State(state): State<Arc<ServeState>>) -> Json<Diagram> {
    Json(state.editor.read().await.export())
}

async fn put_diagram(
    State(state): State<Arc<ServeState>>,
    Json(payload): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    state
        .editor
        .write()
        .await
        .import_data(payload)
        .map_err(load_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_diagram(State(state): State<Arc<ServeState>>) -> StatusCode {
    state.editor.write().await.clear();
    StatusCode::NO_CONTENT
}

async fn put_details(
    State(state): State<Arc<ServeState>>,
    Json(details): Json<DetailsRequest>,
) -> Json<Diagram> {
    let mut editor = state.editor.write().await;
    editor.canvas_mut().model_mut().update_details(
        details.title,
        details.description,
        details.general_notes,
    );
    Json(editor.export())
}

async fn save_diagram(State(state): State<Arc<ServeState>>) -> ApiResult<impl IntoResponse> {
    state.save().await.map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_svg(State(state): State<Arc<ServeState>>) -> Response {
    let svg = state.editor.write().await.export_svg(&state.background);
    with_content_type(svg, "image/svg+xml")
}

async fn get_text(State(state): State<Arc<ServeState>>) -> Response {
    let text = state.editor.read().await.export_text();
    with_content_type(text, "text/plain; charset=utf-8")
}

fn node_snapshot(editor: &Editor, id: &str) -> ApiResult<Node> {
    editor
        .model()
        .node(id)
        .cloned()
        .ok_or_else(|| internal_error(anyhow!("node '{id}' vanished after update")))
}

fn connection_snapshot(editor: &Editor, id: &str) -> ApiResult<Connection> {
    editor
        .model()
        .connection(id)
        .cloned()
        .ok_or_else(|| internal_error(anyhow!("connection '{id}' vanished after update")))
}

async fn post_node(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<NewNodeRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut editor = state.editor.write().await;
    let id = editor
        .canvas_mut()
        .add_node(request.node_type, Point::new(request.x, request.y))
        .map_err(graph_error)?;
    let node = node_snapshot(&editor, &id)?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn put_node(
    State(state): State<Arc<ServeState>>,
    AxumPath(node_id): AxumPath<String>,
    Json(patch): Json<NodePatch>,
) -> ApiResult<Json<Node>> {
    let mut editor = state.editor.write().await;
    editor
        .canvas_mut()
        .update_node(&node_id, patch)
        .map_err(graph_error)?;
    node_snapshot(&editor, &node_id).map(Json)
}

async fn delete_node(
    State(state): State<Arc<ServeState>>,
    AxumPath(node_id): AxumPath<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .editor
        .write()
        .await
        .canvas_mut()
        .delete_node(&node_id)
        .map_err(graph_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_connection(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<NewConnectionRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut editor = state.editor.write().await;
    let canvas = editor.canvas_mut();
    let id = canvas
        .connect(&request.from, &request.to)
        .map_err(graph_error)?;
    if !request.label.is_empty() {
        let patch = ConnectionPatch {
            label: Some(request.label),
            ..ConnectionPatch::default()
        };
        canvas.update_connection(&id, patch).map_err(graph_error)?;
    }
    let connection = connection_snapshot(&editor, &id)?;
    Ok((StatusCode::CREATED, Json(connection)))
}

async fn put_connection(
    State(state): State<Arc<ServeState>>,
    AxumPath(connection_id): AxumPath<String>,
    Json(patch): Json<ConnectionPatch>,
) -> ApiResult<Json<Connection>> {
    let mut editor = state.editor.write().await;
    editor
        .canvas_mut()
        .update_connection(&connection_id, patch)
        .map_err(graph_error)?;
    connection_snapshot(&editor, &connection_id).map(Json)
}

async fn delete_connection(
    State(state): State<Arc<ServeState>>,
    AxumPath(connection_id): AxumPath<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .editor
        .write()
        .await
        .canvas_mut()
        .delete_connection(&connection_id)
        .map_err(graph_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_question(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<NewQuestionRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut editor = state.editor.write().await;
    let question = editor
        .canvas_mut()
        .model_mut()
        .add_question(request.category, request.text)
        .map_err(graph_error)?
        .clone();
    Ok((StatusCode::CREATED, Json(question)))
}

async fn put_question(
    State(state): State<Arc<ServeState>>,
    AxumPath(question_id): AxumPath<String>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<Json<Question>> {
    let mut editor = state.editor.write().await;
    let question = editor
        .canvas_mut()
        .model_mut()
        .update_question_answer(&question_id, request.answer)
        .map_err(graph_error)?
        .clone();
    Ok(Json(question))
}

async fn delete_question(
    State(state): State<Arc<ServeState>>,
    AxumPath(question_id): AxumPath<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .editor
        .write()
        .await
        .canvas_mut()
        .model_mut()
        .delete_question(&question_id)
        .map_err(graph_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_mode(State(state): State<Arc<ServeState>>, Json(mode): Json<Mode>) -> Json<Mode> {
    let mut editor = state.editor.write().await;
    editor.set_mode(mode);
    Json(editor.mode())
}

async fn post_pointer(
    State(state): State<Arc<ServeState>>,
    Json(event): Json<PointerEvent>,
) -> Json<Option<CanvasEvent>> {
    Json(state.editor.write().await.handle_pointer(event))
}

async fn post_fit(State(state): State<Arc<ServeState>>) -> Json<Transform> {
    let mut editor = state.editor.write().await;
    let canvas = editor.canvas_mut();
    canvas.fit_to_screen();
    Json(canvas.transform())
}

async fn post_reset(State(state): State<Arc<ServeState>>) -> Json<Transform> {
    let mut editor = state.editor.write().await;
    let canvas = editor.canvas_mut();
    canvas.reset_zoom();
    Json(canvas.transform())
}

async fn get_scene(State(state): State<Arc<ServeState>>) -> Json<Scene> {
    Json(state.editor.write().await.canvas_mut().scene())
}

async fn post_label(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<LabelRequest>,
) -> ApiResult<Json<Option<String>>> {
    let mut editor = state.editor.write().await;
    match request.text {
        Some(text) => editor.commit_label(&text).map(Json).map_err(graph_error),
        None => {
            editor.cancel_label();
            Ok(Json(None))
        }
    }
}

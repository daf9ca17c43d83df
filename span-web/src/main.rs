//! Servidor web Axum com WebSocket para decodificação e avaliação de spans NER

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use span_core::{
    bmes::TokenRecord,
    log_adapter::{parse_log_str, LogReader},
    session::{evaluate_log, evaluate_parallel, run_streaming, SessionEvent},
    EvalConfig, GoldSpan, LengthHistogram, SpanExtractor,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Estado compartilhado da aplicação
struct AppState {
    /// Configuração base; cada requisição pode sobrescrever campos
    config: EvalConfig,
}

#[derive(Deserialize)]
struct EvaluateRequest {
    log: String,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    verbose: Option<bool>,
    #[serde(default)]
    parallel: bool,
}

#[derive(Deserialize)]
struct ExtractRequest {
    tokens: Vec<TokenRecord>,
    #[serde(default)]
    max_span_len: Option<usize>,
}

#[derive(Serialize)]
struct ExtractResponse {
    spans: Vec<GoldSpan>,
    span_lengths: LengthHistogram,
}

impl AppState {
    fn config_for(&self, threshold: Option<f64>, verbose: Option<bool>) -> Result<EvalConfig, String> {
        let mut config = self.config.clone();
        if let Some(t) = threshold {
            config.threshold = t;
        }
        if let Some(v) = verbose {
            config.verbose = v;
        }
        config.validate().map_err(|e| e.to_string())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("SPAN_EVAL_CONFIG") {
        Ok(path) => match EvalConfig::from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("configuração ignorada ({e}); usando padrões");
                EvalConfig::default()
            }
        },
        Err(_) => EvalConfig::default(),
    };
    let state = Arc::new(AppState { config });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/evaluate", post(evaluate_handler))
        .route("/extract", post(extract_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state);

    let addr = std::env::var("SPAN_EVAL_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("não foi possível escutar em {addr}: {e}");
            return;
        }
    };
    info!("🚀 Servidor de avaliação iniciado em http://{addr}");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("servidor encerrado com erro: {e}");
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

/// Avaliação de um log completo via HTTP POST (sem streaming)
async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> impl IntoResponse {
    if req.log.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Log vazio");
    }
    let config = match state.config_for(req.threshold, req.verbose) {
        Ok(config) => config,
        Err(message) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, message),
    };

    // Decodificação é CPU-bound: roda fora do runtime
    let result = tokio::task::spawn_blocking(move || {
        if req.parallel {
            parse_log_str(&req.log)
                .map(|blocks| evaluate_parallel(&blocks, &config))
                .map_err(|e| e.to_string())
        } else {
            evaluate_log(req.log.as_bytes(), &config).map_err(|e| e.to_string())
        }
    })
    .await;

    match result {
        Ok(Ok(report)) => Json(report).into_response(),
        Ok(Err(message)) => error_response(StatusCode::UNPROCESSABLE_ENTITY, message),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Spans gold a partir de tags BMES
async fn extract_handler(Json(req): Json<ExtractRequest>) -> impl IntoResponse {
    let mut span_lengths = LengthHistogram::new();
    match SpanExtractor::new(req.max_span_len).extract(&req.tokens, &mut span_lengths) {
        Ok(spans) => Json(ExtractResponse { spans, span_lengths }).into_response(),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Lógica do WebSocket: recebe um log, avalia e envia um evento por sentença
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket conectado");

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                // Tenta parsear como JSON {log, threshold, verbose}; senão usa como log puro
                let (log, config) = match serde_json::from_str::<EvaluateRequest>(&text) {
                    Ok(req) => (req.log, state.config_for(req.threshold, req.verbose)),
                    Err(_) => (text.to_string(), Ok(state.config.clone())),
                };
                let config = match config {
                    Ok(config) => config,
                    Err(message) => {
                        let event = SessionEvent::Error { message };
                        if let Ok(json) = serde_json::to_string(&event) {
                            let _ = socket.send(Message::Text(json.into())).await;
                        }
                        continue;
                    }
                };

                if log.trim().is_empty() {
                    continue;
                }

                info!("Avaliando via WebSocket: {} bytes (threshold {})", log.len(), config.threshold);

                let (tx, rx) = std::sync::mpsc::channel::<SessionEvent>();

                // Roda a sessão em thread separada (é síncrona)
                let handle = tokio::task::spawn_blocking(move || {
                    run_streaming(LogReader::new(log.as_bytes()), &config, tx);
                });
                handle.await.ok();

                // A sessão já terminou: todos os eventos estão na fila
                let events: Vec<SessionEvent> = rx.try_iter().collect();

                for event in &events {
                    if let Ok(json) = serde_json::to_string(event) {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            return; // cliente desconectou
                        }
                    }
                }
            }
            Message::Close(_) => {
                info!("WebSocket desconectado");
                return;
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            _ => {}
        }
    }
}

use crate::chat::{ChatApi, GatewayClient};
use crate::commands::{self, SeasonRemoval};
use crate::error::CatalogError;
use crate::models::Category;
use crate::reconcile::{self, Reconciler};
use crate::render::{self, View};
use crate::router::{self, InteractionEvent, Reply, Router as InteractionRouter};
use crate::store::Store;
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::{env, net::SocketAddr, sync::Arc, time::Duration};
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const MAX_SKEW_SECS: i64 = 300; // 5 minutes freshness window
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 1800;
const EXPIRY_SWEEP_SECS: u64 = 60;
const PORT: u16 = 3164;

/// Application context, constructed once at startup and handed to every
/// component that needs store or collaborator access.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub chat: Arc<dyn ChatApi>,
    pub router: Arc<InteractionRouter>,
    pub reconciler: Arc<Reconciler>,
    pub signing_secret: String,
}

impl AppState {
    pub fn new(store: Arc<Store>, chat: Arc<dyn ChatApi>, signing_secret: String) -> Self {
        let router = Arc::new(InteractionRouter::new(
            Arc::clone(&store),
            Arc::clone(&chat),
            chrono::Duration::seconds(router::SESSION_TIMEOUT_SECS),
        ));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), Arc::clone(&chat)));
        Self {
            store,
            chat,
            router,
            reconciler,
            signing_secret,
        }
    }

    /// Fire-and-forget reconciliation, used right after a mutating command.
    fn trigger_reconcile(&self) {
        let reconciler = Arc::clone(&self.reconciler);
        tokio::spawn(async move {
            let corrections = reconciler.reconcile_all().await;
            if corrections > 0 {
                info!("post-command reconcile applied {corrections} correction(s)");
            }
        });
    }
}

pub async fn run_server() -> Result<()> {
    let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let store = Arc::new(Store::new(data_dir));
    let chat: Arc<dyn ChatApi> = Arc::new(GatewayClient::from_env()?);
    let signing_secret = env::var("WEBHOOK_SECRET")
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("WEBHOOK_SECRET must be set"))?;

    let state = AppState::new(store, chat, signing_secret);

    // Startup sweep, then the self-healing interval and session expiry.
    state.trigger_reconcile();
    let interval = env::var("RECONCILE_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS);
    reconcile::spawn_sweep(
        Arc::clone(&state.reconciler),
        Duration::from_secs(interval),
    );
    router::spawn_expiry_sweep(
        Arc::clone(&state.router),
        Duration::from_secs(EXPIRY_SWEEP_SECS),
    );

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], PORT));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/interactions", post(handle_interaction))
        .route("/commands", post(handle_command))
        .route("/health", get(health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Shared ingress guards: size, content type, signature, freshness.
fn verified_payload(
    headers: &HeaderMap,
    body: &Bytes,
    secret: &str,
) -> Result<Value, (StatusCode, Json<Value>)> {
    if body.len() > MAX_BODY_BYTES {
        warn!("rejecting request: body too large ({} bytes)", body.len());
        return Err(reject(StatusCode::PAYLOAD_TOO_LARGE, "body too large"));
    }

    let content_type_ok = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        == Some(true);
    if !content_type_ok {
        warn!("rejecting request: unsupported content type");
        return Err(reject(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/json",
        ));
    }

    if !verify_signature(headers, body, secret) {
        warn!("webhook signature verification failed");
        return Err(reject(StatusCode::UNAUTHORIZED, "bad signature"));
    }

    let payload: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!("rejecting request: invalid JSON body: {e}");
            return Err(reject(StatusCode::BAD_REQUEST, "invalid JSON"));
        }
    };

    if !is_fresh_timestamp(&payload) {
        warn!("rejecting request: stale or missing timestamp");
        return Err(reject(StatusCode::BAD_REQUEST, "stale timestamp"));
    }

    Ok(payload)
}

async fn handle_interaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let payload = match verified_payload(&headers, &body, &state.signing_secret) {
        Ok(p) => p,
        Err(rejection) => return rejection,
    };

    let event: InteractionEvent = match payload
        .get("event")
        .cloned()
        .and_then(|e| serde_json::from_value(e).ok())
    {
        Some(event) => event,
        None => return reject(StatusCode::BAD_REQUEST, "missing interaction event"),
    };

    let reply = state.router.dispatch(event).await;
    (StatusCode::OK, Json(reply_json(&reply)))
}

fn reply_json(reply: &Reply) -> Value {
    match reply {
        Reply::EditInPlace(view) => json!({ "type": "edit", "view": view }),
        Reply::Show(view) => json!({ "type": "show", "view": view }),
        Reply::OpenRating { category, target } => json!({
            "type": "open_rating",
            "category": category.slug(),
            "target": target,
        }),
        Reply::OpenSearch { category } => json!({
            "type": "open_search",
            "category": category.slug(),
        }),
    }
}

/// Admin mutation commands, delivered over the same signed webhook path.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Command {
    Add {
        category: String,
        title: String,
        url: String,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        themes: Option<String>,
    },
    Delete {
        category: String,
        title: String,
    },
    Get {
        category: String,
        title: String,
    },
    AddSeason {
        title: String,
        number: u32,
        url: String,
        #[serde(default)]
        season_title: Option<String>,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        themes: Option<String>,
    },
    DeleteSeason {
        title: String,
        number: u32,
    },
    DeleteSeries {
        title: String,
    },
    ImportSeasons {
        title: String,
        seasons: String,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        themes: Option<String>,
    },
    SearchHome {
        category: String,
    },
}

async fn handle_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let payload = match verified_payload(&headers, &body, &state.signing_secret) {
        Ok(p) => p,
        Err(rejection) => return rejection,
    };

    let command: Command = match serde_json::from_value(payload) {
        Ok(c) => c,
        Err(e) => {
            warn!("rejecting command: {e}");
            return reject(StatusCode::BAD_REQUEST, "malformed command");
        }
    };

    let view = apply_command(&state, command).await;
    (StatusCode::OK, Json(json!({ "type": "show", "view": view })))
}

async fn apply_command(state: &AppState, command: Command) -> View {
    match command {
        Command::Add {
            category,
            title,
            url,
            image,
            themes,
        } => {
            let Some(category) = Category::parse(&category) else {
                return render::notice("❌ Unknown category.");
            };
            match commands::add_entry(&state.store, category, &title, &url, image, themes).await
            {
                Ok(entry) => {
                    state.trigger_reconcile();
                    let mut view =
                        render::entry_detail(category, &crate::models::normalize_key(&title), &entry);
                    view.title = format!(
                        "✅ {} added to {}",
                        render::title_case(&title),
                        category.slug()
                    );
                    view
                }
                Err(e) => command_failure(e),
            }
        }
        Command::Delete { category, title } => {
            let Some(category) = Category::parse(&category) else {
                return render::notice("❌ Unknown category.");
            };
            match commands::delete_entry(&state.store, category, &title).await {
                Ok(true) => {
                    state.trigger_reconcile();
                    render::notice(format!(
                        "🗑️ {} **{}** deleted.",
                        render::title_case(category.singular()),
                        render::title_case(&title)
                    ))
                }
                Ok(false) => render::notice(format!(
                    "❌ {} not found.",
                    render::title_case(category.singular())
                )),
                Err(e) => command_failure(e),
            }
        }
        Command::Get { category, title } => {
            let Some(category) = Category::parse(&category) else {
                return render::notice("❌ Unknown category.");
            };
            match commands::get_entry(&state.store, category, &title).await {
                Ok(entry) => {
                    render::entry_detail(category, &crate::models::normalize_key(&title), &entry)
                }
                Err(e) => command_failure(e),
            }
        }
        Command::AddSeason {
            title,
            number,
            url,
            season_title,
            image,
            themes,
        } => {
            match commands::upsert_season(
                &state.store,
                &title,
                number,
                &url,
                season_title,
                image,
                themes,
            )
            .await
            {
                Ok((entry, created)) => {
                    state.trigger_reconcile();
                    let mut view = render::entry_detail(
                        Category::Series,
                        &crate::models::normalize_key(&title),
                        &entry,
                    );
                    view.title = if created {
                        format!("✅ New series {} created", render::title_case(&title))
                    } else {
                        format!("✅ Series {} updated", render::title_case(&title))
                    };
                    view
                }
                Err(e) => command_failure(e),
            }
        }
        Command::DeleteSeason { title, number } => {
            match commands::delete_season(&state.store, &title, number).await {
                Ok(SeasonRemoval::SeasonRemoved { remaining }) => {
                    state.trigger_reconcile();
                    render::notice(format!(
                        "🗑️ Season {number} of **{}** deleted ({remaining} left).",
                        render::title_case(&title)
                    ))
                }
                Ok(SeasonRemoval::SeriesDeleted) => {
                    state.trigger_reconcile();
                    render::notice(format!(
                        "🗑️ Season {number} of **{}** deleted. It was the last one, so the series is gone as well.",
                        render::title_case(&title)
                    ))
                }
                Err(e) => command_failure(e),
            }
        }
        Command::DeleteSeries { title } => {
            match commands::delete_entry(&state.store, Category::Series, &title).await {
                Ok(true) => {
                    state.trigger_reconcile();
                    render::notice(format!(
                        "🗑️ Series **{}** deleted.",
                        render::title_case(&title)
                    ))
                }
                Ok(false) => render::notice("❌ Series not found."),
                Err(e) => command_failure(e),
            }
        }
        Command::ImportSeasons {
            title,
            seasons,
            image,
            themes,
        } => {
            match commands::import_seasons(&state.store, &title, &seasons, image, themes).await {
                Ok(report) => {
                    state.trigger_reconcile();
                    let mut lines = vec![if report.created_series {
                        format!("✅ New series **{}** created.", render::title_case(&title))
                    } else {
                        format!("✅ Series **{}** updated.", render::title_case(&title))
                    }];
                    if report.added > 0 {
                        lines.push(format!("**{}** season(s) added.", report.added));
                    }
                    if report.updated > 0 {
                        lines.push(format!("**{}** season(s) updated.", report.updated));
                    }
                    if !report.errors.is_empty() {
                        lines.push("⚠️ Errors:".to_string());
                        lines.extend(report.errors);
                    }
                    View {
                        title: format!("Series import: {}", render::title_case(&title)),
                        body: lines.join("\n"),
                        image: None,
                        fields: Vec::new(),
                        controls: Vec::new(),
                    }
                }
                Err(e) => command_failure(e),
            }
        }
        Command::SearchHome { category } => {
            let Some(category) = Category::parse(&category) else {
                return render::notice("❌ Unknown category.");
            };
            state.router.search_home(category)
        }
    }
}

fn command_failure(e: CatalogError) -> View {
    match e {
        CatalogError::NotFound => render::notice("❌ Not found."),
        CatalogError::Validation(msg) => render::notice(format!("❌ {msg}")),
        CatalogError::Io(e) => {
            error!("command failed on storage: {e}");
            render::notice("❌ Something went wrong.")
        }
    }
}

fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "type": "error", "message": message })))
}

fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> bool {
    let Some(sig_header) = headers
        .get("x-catalink-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let sig_hex = sig_header.strip_prefix("sha256=").unwrap_or(sig_header);
    let Ok(expected) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    expected.len() == computed.len() && constant_time_eq(&computed, &expected)
}

fn is_fresh_timestamp(payload: &Value) -> bool {
    let ts_str = match payload.get("timestamp").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return false,
    };
    let parsed: DateTime<Utc> = match ts_str.parse() {
        Ok(v) => v,
        Err(_) => return false,
    };
    let now = Utc::now();
    let diff = (now - parsed).num_seconds().abs();
    diff <= MAX_SKEW_SECS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

use crate::chat::ChatApi;
use crate::error::CatalogError;
use crate::models::{normalize_key, Category};
use crate::pagination::{Pager, PAGE_SIZE};
use crate::ratings;
use crate::render::{self, View};
use crate::store::Store;
use crate::token::{Action, Token};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

pub const SESSION_TIMEOUT_SECS: i64 = 180;

/// Inbound interaction, already verified by the ingress. An immutable
/// request value: the router never calls back into the platform while
/// deciding what to do with it.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionEvent {
    pub token: String,
    /// Submitted text for the rating/search sub-flows.
    #[serde(default)]
    pub input: Option<String>,
    /// Message the control lives on, when the platform provides it.
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// What the ingress should do with the interaction. Applying it (edit vs.
/// new ephemeral reply vs. opening an input) is the platform's side of the
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Re-render the originating message in place (page navigation).
    EditInPlace(View),
    /// Show a view as a new ephemeral reply.
    Show(View),
    /// Open the rating input sub-flow for one entry.
    OpenRating { category: Category, target: String },
    /// Open the free-text search sub-flow.
    OpenSearch { category: Category },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Expired,
}

struct Session {
    pager: Pager,
    state: SessionState,
    last_active: DateTime<Utc>,
    last_view: View,
    /// (channel, message) of the rendered page, learned from the first
    /// interaction that carries it; the expiry sweep edits it disabled.
    message: Option<(String, String)>,
}

/// Decodes opaque tokens into actions and drives the per-instance
/// pagination state machine (`Active` until the inactivity window elapses,
/// then `Expired` and closed to further transitions).
pub struct Router {
    store: Arc<Store>,
    chat: Arc<dyn ChatApi>,
    sessions: Mutex<HashMap<u64, Session>>,
    next_session: AtomicU64,
    timeout: Duration,
}

impl Router {
    pub fn new(store: Arc<Store>, chat: Arc<dyn ChatApi>, timeout: Duration) -> Self {
        Self {
            store,
            chat,
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            timeout,
        }
    }

    /// Decode and dispatch one interaction. Never faults: undecodable
    /// tokens, missing entries and storage failures all come back as
    /// user-facing replies.
    pub async fn dispatch(&self, event: InteractionEvent) -> Reply {
        let Some(token) = Token::decode(&event.token) else {
            debug!("rejecting undecodable token '{}'", event.token);
            return Reply::Show(render::notice("❌ Not found."));
        };

        match token.action {
            Action::Prev | Action::Next => self.navigate(&token, &event).await,
            Action::Select => self.select(token.category, &token.target).await,
            Action::Rate => self.rate(token.category, &token.target, event.input).await,
            Action::Search => self.search(token.category, event.input).await,
            Action::ViewAll => self.view_all(token.category).await,
        }
    }

    /// Post (or refresh) a category's search home; entry point the admin
    /// surface uses when wiring a browse channel.
    pub fn search_home(&self, category: Category) -> View {
        render::search_home(category)
    }

    async fn navigate(&self, token: &Token, event: &InteractionEvent) -> Reply {
        let Ok(session_id) = token.target.parse::<u64>() else {
            return Reply::Show(render::notice("❌ Not found."));
        };
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            return Reply::Show(render::notice(
                "⌛ This view has expired. Open it again to keep browsing.",
            ));
        };

        if session.state == SessionState::Expired || now - session.last_active > self.timeout {
            if session.state == SessionState::Active {
                session.state = SessionState::Expired;
                session.last_view = session.last_view.with_controls_disabled();
            }
            // Late token: reject explicitly and leave the stale view
            // visibly disabled rather than pretending it still works.
            return Reply::EditInPlace(session.last_view.clone());
        }

        match token.action {
            Action::Prev => session.pager.prev(),
            Action::Next => session.pager.next(),
            _ => unreachable!("navigate only handles prev/next"),
        }
        session.last_active = now;
        if let (Some(channel), Some(message)) = (&event.channel_id, &event.message_id) {
            session.message = Some((channel.clone(), message.clone()));
        }
        let view = session.pager.render(session_id);
        session.last_view = view.clone();
        Reply::EditInPlace(view)
    }

    async fn select(&self, category: Category, target: &str) -> Reply {
        // Always a fresh read: ratings or details may have moved since the
        // page was rendered.
        match self.store.get(category, target).await {
            Ok(Some(entry)) => Reply::Show(render::entry_detail(
                category,
                &normalize_key(target),
                &entry,
            )),
            Ok(None) => Reply::Show(render::notice(format!(
                "❌ {} details not found.",
                render::title_case(category.singular())
            ))),
            Err(e) => {
                error!("failed to load {category} for select: {e}");
                Reply::Show(render::notice("❌ Something went wrong."))
            }
        }
    }

    async fn rate(&self, category: Category, target: &str, input: Option<String>) -> Reply {
        let Some(raw) = input else {
            return Reply::OpenRating {
                category,
                target: target.to_string(),
            };
        };

        let Ok(value) = raw.trim().parse::<i64>() else {
            return Reply::Show(render::notice("❌ The rating must be a whole number."));
        };

        match ratings::add_rating(&self.store, category, target, value).await {
            Ok((average, entry)) => {
                debug!("rated '{target}' in {category}: new average {average}");
                Reply::Show(render::entry_detail(category, &normalize_key(target), &entry))
            }
            Err(CatalogError::Validation(_)) => Reply::Show(render::notice(
                "❌ The rating must be a number between 1 and 5.",
            )),
            Err(CatalogError::NotFound) => Reply::Show(render::notice(format!(
                "❌ {} not found.",
                render::title_case(category.singular())
            ))),
            Err(e) => {
                error!("failed to store rating for '{target}' in {category}: {e}");
                Reply::Show(render::notice("❌ Something went wrong."))
            }
        }
    }

    async fn search(&self, category: Category, input: Option<String>) -> Reply {
        let Some(query) = input else {
            return Reply::OpenSearch { category };
        };
        let query = normalize_key(&query);

        let collection = match self.store.load(category).await {
            Ok(c) => c,
            Err(e) => {
                error!("failed to load {category} for search: {e}");
                return Reply::Show(render::notice("❌ Something went wrong."));
            }
        };

        if query.is_empty() {
            return Reply::Show(render::notice(format!(
                "❌ No {} found with that title.",
                category.singular()
            )));
        }

        if let Some(entry) = collection.get(&query) {
            return Reply::Show(render::entry_detail(category, &query, entry));
        }

        // A query naming a known theme browses that theme instead.
        let themed: Vec<String> = collection
            .iter()
            .filter(|(_, entry)| entry.has_theme(&query))
            .map(|(key, _)| key.clone())
            .collect();
        if !themed.is_empty() {
            let heading = format!(
                "{} — {}",
                render::title_case(category.slug()),
                render::title_case(&query)
            );
            let view = self.open_session(category, heading, themed).await;
            return Reply::Show(view);
        }

        Reply::Show(render::notice(format!(
            "❌ No {} found with that title.",
            category.singular()
        )))
    }

    async fn view_all(&self, category: Category) -> Reply {
        match self.store.load(category).await {
            Ok(collection) => {
                let titles: Vec<String> = collection.keys().cloned().collect();
                let heading = format!("All {}", category.slug());
                let view = self.open_session(category, heading, titles).await;
                Reply::Show(view)
            }
            Err(e) => {
                error!("failed to load {category} for view_all: {e}");
                Reply::Show(render::notice("❌ Something went wrong."))
            }
        }
    }

    /// Start a new Active pagination session and render its first page.
    async fn open_session(&self, category: Category, heading: String, titles: Vec<String>) -> View {
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let pager = Pager::new(category, heading, titles, PAGE_SIZE);
        let view = pager.render(session_id);
        let session = Session {
            pager,
            state: SessionState::Active,
            last_active: Utc::now(),
            last_view: view.clone(),
            message: None,
        };
        self.sessions.lock().await.insert(session_id, session);
        view
    }

    /// Expire sessions past the inactivity window: their last rendered view
    /// is edited with every control disabled so the user can see why the
    /// controls stopped responding. Long-expired sessions are pruned.
    pub async fn expire_stale(&self, now: DateTime<Utc>) {
        let mut disabled_edits = Vec::new();
        {
            let mut sessions = self.sessions.lock().await;
            for (&id, session) in sessions.iter_mut() {
                if session.state == SessionState::Active
                    && now - session.last_active > self.timeout
                {
                    session.state = SessionState::Expired;
                    session.last_view = session.last_view.with_controls_disabled();
                    debug!("pagination session {id} expired");
                    if let Some((channel, message)) = &session.message {
                        disabled_edits.push((
                            channel.clone(),
                            message.clone(),
                            session.last_view.clone(),
                        ));
                    }
                }
            }
            let prune_after = self.timeout * 10;
            sessions.retain(|_, s| {
                s.state == SessionState::Active || now - s.last_active <= prune_after
            });
        }

        for (channel, message, view) in disabled_edits {
            if let Err(e) = self.chat.edit_message(&channel, &message, &view).await {
                warn!("failed to disable expired view {channel}/{message}: {e}");
            }
        }
    }

    #[cfg(test)]
    async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Periodic expiry sweep for live pagination sessions.
pub fn spawn_expiry_sweep(
    router: Arc<Router>,
    period: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            router.expire_stale(Utc::now()).await;
        }
    })
}

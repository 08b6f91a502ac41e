use crate::chat::ChatApi;
use crate::models::Category;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keeps one counter channel per category in agreement with the catalogue
/// size. Runs immediately after every mutating command and on a fixed
/// interval as a self-healing sweep, and is idempotent: with unchanged
/// sizes a second consecutive run applies zero corrections.
pub struct Reconciler {
    store: Arc<Store>,
    chat: Arc<dyn ChatApi>,
}

impl Reconciler {
    pub fn new(store: Arc<Store>, chat: Arc<dyn ChatApi>) -> Self {
        Self { store, chat }
    }

    /// One full sweep. A failure on one category is logged and the sweep
    /// moves on; retry happens on the next scheduled run, never in-sweep.
    pub async fn reconcile_all(&self) -> usize {
        let mut corrections = 0;
        for category in Category::ALL {
            match self.reconcile_category(category).await {
                Ok(true) => corrections += 1,
                Ok(false) => {}
                Err(e) => warn!("reconciliation failed for {category}: {e:#}"),
            }
        }
        corrections
    }

    /// Returns whether a rename/create was applied for this category.
    async fn reconcile_category(&self, category: Category) -> anyhow::Result<bool> {
        let count = self.store.load(category).await?.len();
        let base = category.counter_base();
        let desired = format!("{base} : {count}");

        let channels = self.chat.list_channels().await?;
        let existing = channels.iter().find(|c| matches_counter(&c.name, base));

        match existing {
            Some(channel) if channel.name == desired => {
                debug!("counter '{desired}' already up to date");
                Ok(false)
            }
            Some(channel) => {
                self.chat.rename_channel(&channel.id, &desired).await?;
                info!("renamed counter '{}' to '{desired}'", channel.name);
                Ok(true)
            }
            None => {
                self.chat.create_channel(&desired).await?;
                info!("created counter '{desired}'");
                Ok(true)
            }
        }
    }
}

/// Tolerant match for an existing counter channel: the bare base name, or
/// `base : <number>` with flexible spacing, case-insensitively.
pub fn matches_counter(name: &str, base: &str) -> bool {
    let name = name.trim().to_lowercase();
    let base = base.to_lowercase();
    if name == base {
        return true;
    }
    let Some(rest) = name.strip_prefix(&base) else {
        return false;
    };
    let Some(rest) = rest.trim_start().strip_prefix(':') else {
        return false;
    };
    let rest = rest.trim();
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Fixed-interval self-healing sweep, independent of command activity.
pub fn spawn_sweep(reconciler: Arc<Reconciler>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let corrections = reconciler.reconcile_all().await;
            debug!("periodic sweep applied {corrections} correction(s)");
        }
    })
}

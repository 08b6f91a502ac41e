use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The four fixed catalogue partitions. Each category owns exactly one
/// persisted collection and one counter channel on the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Films,
    Series,
    Games,
    Software,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Films,
        Category::Series,
        Category::Games,
        Category::Software,
    ];

    /// Stable identifier: wire value and storage file stem.
    pub fn slug(self) -> &'static str {
        match self {
            Category::Films => "films",
            Category::Series => "series",
            Category::Games => "games",
            Category::Software => "software",
        }
    }

    /// Display-singular label used in user-facing replies.
    pub fn singular(self) -> &'static str {
        match self {
            Category::Films => "film",
            Category::Series => "series",
            Category::Games => "game",
            Category::Software => "software",
        }
    }

    /// Base name of the category's counter channel; the reconciler appends
    /// ` : <count>`.
    pub fn counter_base(self) -> &'static str {
        match self {
            Category::Films => "Available films",
            Category::Series => "Available series",
            Category::Games => "Available games",
            Category::Software => "Available software",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.slug())
    }

    pub fn parse(s: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.slug() == s)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// One numbered, titled, URL-bearing sub-record of a series entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub number: u32,
    pub title: String,
    pub url: String,
}

/// A catalogued item. Films/games/software carry `url`; series carry
/// `seasons`. Absent fields are omitted on disk so the persisted shape
/// round-trips the historical JSON files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub themes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ratings: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasons: Option<Vec<Season>>,
}

impl Entry {
    /// Seasons sorted ascending by number; empty for non-series entries.
    pub fn seasons_sorted(&self) -> Vec<Season> {
        let mut seasons = self.seasons.clone().unwrap_or_default();
        seasons.sort_by_key(|s| s.number);
        seasons
    }

    pub fn has_theme(&self, theme: &str) -> bool {
        self.themes.contains(theme)
    }
}

/// A whole persisted category, keyed by lower-cased title. BTreeMap keeps
/// keys sorted, which both the pagination order and the pretty-printed
/// files rely on.
pub type Collection = BTreeMap<String, Entry>;

/// Lower-cased storage key for a user-supplied title.
pub fn normalize_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Split a comma-separated theme list into the stored lower-cased set.
pub fn parse_themes(csv: &str) -> BTreeSet<String> {
    csv.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

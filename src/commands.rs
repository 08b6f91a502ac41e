use crate::error::CatalogError;
use crate::models::{normalize_key, parse_themes, Category, Entry, Season};
use crate::store::Store;

/// Outcome of removing one season from a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeasonRemoval {
    SeasonRemoved { remaining: usize },
    /// The removal left a bare series (no seasons, no image, no themes),
    /// which is deleted as a whole.
    SeriesDeleted,
}

/// Result of a bulk season import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub created_series: bool,
    pub added: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Create or update a films/games/software entry. Merge semantics:
/// provided fields overwrite, omitted fields are preserved on update and
/// defaulted on creation, so re-adding a title never drops its ratings.
pub async fn add_entry(
    store: &Store,
    category: Category,
    title: &str,
    url: &str,
    image: Option<String>,
    themes_csv: Option<String>,
) -> Result<Entry, CatalogError> {
    if category == Category::Series {
        return Err(CatalogError::validation(
            "series are managed through season commands",
        ));
    }
    let key = normalize_key(title);
    if key.is_empty() {
        return Err(CatalogError::validation("title must not be empty"));
    }
    let url = url.to_string();
    store
        .modify(category, move |collection| {
            let entry = collection.entry(key).or_default();
            entry.url = Some(url);
            if image.is_some() {
                entry.image = image;
            }
            if let Some(csv) = themes_csv {
                entry.themes = parse_themes(&csv);
            }
            entry.clone()
        })
        .await
}

pub async fn delete_entry(
    store: &Store,
    category: Category,
    title: &str,
) -> Result<bool, CatalogError> {
    store.delete(category, title).await
}

pub async fn get_entry(
    store: &Store,
    category: Category,
    title: &str,
) -> Result<Entry, CatalogError> {
    store
        .get(category, title)
        .await?
        .ok_or(CatalogError::NotFound)
}

/// Add or replace one season of a series, creating the series when absent.
/// Returns the refreshed entry and whether the series was created.
pub async fn upsert_season(
    store: &Store,
    title: &str,
    number: u32,
    url: &str,
    season_title: Option<String>,
    image: Option<String>,
    themes_csv: Option<String>,
) -> Result<(Entry, bool), CatalogError> {
    if number == 0 {
        return Err(CatalogError::validation("season number must be positive"));
    }
    let key = normalize_key(title);
    if key.is_empty() {
        return Err(CatalogError::validation("title must not be empty"));
    }
    let season = Season {
        number,
        title: season_title.unwrap_or_else(|| format!("Season {number}")),
        url: url.to_string(),
    };
    store
        .modify(Category::Series, move |collection| {
            let created = !collection.contains_key(&key);
            let entry = collection.entry(key).or_default();
            if image.is_some() {
                entry.image = image;
            }
            if let Some(csv) = themes_csv {
                entry.themes = parse_themes(&csv);
            }
            let seasons = entry.seasons.get_or_insert_with(Vec::new);
            match seasons.iter_mut().find(|s| s.number == season.number) {
                Some(existing) => *existing = season,
                None => seasons.push(season),
            }
            seasons.sort_by_key(|s| s.number);
            (entry.clone(), created)
        })
        .await
}

/// Remove one season. When the removal leaves a series with zero seasons
/// and no image and no themes, the whole entry goes with it.
pub async fn delete_season(
    store: &Store,
    title: &str,
    number: u32,
) -> Result<SeasonRemoval, CatalogError> {
    let key = normalize_key(title);
    store
        .modify(Category::Series, move |collection| {
            let entry = collection.get_mut(&key).ok_or(CatalogError::NotFound)?;
            let seasons = entry.seasons.get_or_insert_with(Vec::new);
            let before = seasons.len();
            seasons.retain(|s| s.number != number);
            if seasons.len() == before {
                return Err(CatalogError::NotFound);
            }
            seasons.sort_by_key(|s| s.number);
            let remaining = seasons.len();
            let delete_series =
                remaining == 0 && entry.image.is_none() && entry.themes.is_empty();
            if delete_series {
                collection.remove(&key);
                Ok(SeasonRemoval::SeriesDeleted)
            } else {
                Ok(SeasonRemoval::SeasonRemoved { remaining })
            }
        })
        .await?
}

/// Bulk-import seasons from a feed like `"S1:http://a,S2:http://b"`.
/// Invalid items become per-item errors while the valid ones still apply;
/// the series is created when absent.
pub async fn import_seasons(
    store: &Store,
    title: &str,
    feed: &str,
    image: Option<String>,
    themes_csv: Option<String>,
) -> Result<ImportReport, CatalogError> {
    let key = normalize_key(title);
    if key.is_empty() {
        return Err(CatalogError::validation("title must not be empty"));
    }

    let mut report = ImportReport::default();
    let mut seasons = Vec::new();
    for item in feed.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match parse_season_item(item) {
            Ok(season) => seasons.push(season),
            Err(e) => report.errors.push(e),
        }
    }

    let applied = store
        .modify(Category::Series, move |collection| {
            let created = !collection.contains_key(&key);
            let entry = collection.entry(key).or_default();
            if image.is_some() {
                entry.image = image;
            }
            if let Some(csv) = themes_csv {
                entry.themes = parse_themes(&csv);
            }
            let existing = entry.seasons.get_or_insert_with(Vec::new);
            let mut added = 0;
            let mut updated = 0;
            for season in seasons {
                match existing.iter_mut().find(|s| s.number == season.number) {
                    Some(slot) => {
                        *slot = season;
                        updated += 1;
                    }
                    None => {
                        existing.push(season);
                        added += 1;
                    }
                }
            }
            existing.sort_by_key(|s| s.number);
            (created, added, updated)
        })
        .await?;

    report.created_series = applied.0;
    report.added = applied.1;
    report.updated = applied.2;
    Ok(report)
}

/// One import item: `S<number>:<http(s) url>`.
fn parse_season_item(item: &str) -> Result<Season, String> {
    let (head, url) = item
        .split_once(':')
        .ok_or_else(|| format!("invalid season format '{item}', expected 'SX:url'"))?;
    let number_str = head.trim().trim_start_matches(['s', 'S']);
    let number: u32 = number_str
        .parse()
        .map_err(|_| format!("invalid season number in '{item}', expected 'S' then digits"))?;
    if number == 0 {
        return Err(format!("season number must be positive in '{item}'"));
    }
    let url = url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!(
            "url for season {number} ('{url}') must start with http:// or https://"
        ));
    }
    Ok(Season {
        number,
        title: format!("Season {number}"),
        url: url.to_string(),
    })
}

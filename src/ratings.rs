use crate::error::CatalogError;
use crate::models::{normalize_key, Category, Entry};
use crate::store::Store;

/// Append a rating to an entry and recompute its running average.
///
/// Ratings carry no rater identity, so repeated ratings from the same actor
/// accumulate; that matches the persisted shape and is deliberate. Returns
/// the new average together with the refreshed entry for immediate
/// re-render.
pub async fn add_rating(
    store: &Store,
    category: Category,
    key: &str,
    value: i64,
) -> Result<(f64, Entry), CatalogError> {
    if !(1..=5).contains(&value) {
        return Err(CatalogError::validation("rating must be between 1 and 5"));
    }

    let key = normalize_key(key);
    store
        .modify(category, move |collection| {
            let entry = collection.get_mut(&key).ok_or(CatalogError::NotFound)?;
            entry.ratings.push(value as u8);
            let average = rounded_mean(&entry.ratings);
            entry.rating = Some(average);
            Ok((average, entry.clone()))
        })
        .await?
}

/// Mean rounded to two decimals, the invariant the stored `rating` field
/// must satisfy whenever `ratings` is non-empty.
pub fn rounded_mean(ratings: &[u8]) -> f64 {
    let sum: u32 = ratings.iter().map(|&r| r as u32).sum();
    let mean = sum as f64 / ratings.len() as f64;
    (mean * 100.0).round() / 100.0
}

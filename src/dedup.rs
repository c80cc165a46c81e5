use std::collections::BTreeMap;

use crate::formats::LegacyPage;
use crate::path::{canonical_path, is_feed_path};

pub fn quality_score(page: &LegacyPage) -> i64 {
    let mut score = i64::try_from(page.text.chars().count()).unwrap_or(i64::MAX / 2);
    if !page.hero_image.is_empty() {
        score += 150;
    }
    score += 25 * i64::try_from(page.content_images.len()).unwrap_or(0);
    if !page.updated_at.is_empty() {
        score += 30;
    }
    if canonical_path(&page.path) == "/" {
        score += 1000;
    }
    score
}

/// One page per canonical path, feeds dropped, sorted by path.
///
/// A later page replaces the kept one only with a strictly greater score, so
/// on ties the first page in input order survives.
pub fn dedupe_pages(pages: impl IntoIterator<Item = LegacyPage>) -> Vec<LegacyPage> {
    let mut by_path: BTreeMap<String, (i64, LegacyPage)> = BTreeMap::new();

    for mut page in pages {
        let path = canonical_path(&page.path);
        if is_feed_path(&path) {
            tracing::debug!(%path, "dropping feed page");
            continue;
        }
        page.path = path.clone();
        let score = quality_score(&page);

        match by_path.get(&path) {
            Some((existing, kept)) if score <= *existing => {
                tracing::debug!(%path, kept = %kept.id, dropped = %page.id, "duplicate path");
            }
            Some((_, kept)) => {
                tracing::debug!(%path, kept = %page.id, dropped = %kept.id, "duplicate path");
                by_path.insert(path, (score, page));
            }
            None => {
                by_path.insert(path, (score, page));
            }
        }
    }

    by_path.into_values().map(|(_, page)| page).collect()
}

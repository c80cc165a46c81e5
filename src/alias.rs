use crate::assets::AssetResolver;
use crate::config::AliasRule;
use crate::formats::LegacyPage;
use crate::path::{canonical_path, same_path};

/// Adds a page for each alias route whose target is missing, cloned from the
/// first source that exists. Never introduces a duplicate path. The result is
/// sorted by path.
pub fn apply_aliases(mut pages: Vec<LegacyPage>, rules: &[AliasRule]) -> Vec<LegacyPage> {
    for rule in rules {
        let target = canonical_path(&rule.path);
        if pages.iter().any(|page| same_path(&page.path, &target)) {
            continue;
        }

        let Some(source) = find_source(&pages, rule) else {
            tracing::debug!(alias = %target, "no source page for alias");
            continue;
        };

        let alias = LegacyPage {
            id: format!("{}__{}", source.id, rule.id_suffix),
            path: target.clone(),
            title: rule.title.clone(),
            ..source.clone()
        };
        tracing::debug!(alias = %target, source = %source.path, "synthesized alias page");
        pages.push(alias);
    }

    pages.sort_by(|a, b| a.path.cmp(&b.path));
    pages
}

fn find_source<'a>(pages: &'a [LegacyPage], rule: &AliasRule) -> Option<&'a LegacyPage> {
    rule.sources
        .iter()
        .find_map(|source| pages.iter().find(|page| same_path(&page.path, source)))
        .or_else(|| {
            let category = rule.source_category.as_deref()?;
            pages.iter().find(|page| page.category == category)
        })
}

/// Replaces every page's hero with the best useful candidate, or the
/// path/category/global fallback.
pub fn finalize_heroes(pages: &mut [LegacyPage], resolver: &AssetResolver) {
    for page in pages.iter_mut() {
        let hero = resolver.select_hero(
            &page.path,
            &page.category,
            &page.hero_image,
            &page.content_images,
        );
        page.hero_image = hero;
    }
}

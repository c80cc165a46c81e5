use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::alias::{apply_aliases, finalize_heroes};
use crate::assets::{AssetResolver, AssetRewriter, RegexAssetRewriter};
use crate::cms::{OverlaySource, fetch_overlay, merge_overlay};
use crate::config::PipelineConfig;
use crate::dedup::{dedupe_pages, quality_score};
use crate::formats::{CmsRow, LegacyPage, RawCorpus, SiteContent};
use crate::menu::MenuSanitizer;
use crate::normalize::{Normalizer, coerce_string};
use crate::path::{canonical_path, same_path};

pub const SOURCE_LABEL: &str = "legacy-site-snapshot";
pub const SOURCE_LABEL_WITH_CMS: &str = "legacy-site-snapshot+cms";

/// Raw corpus -> normalize -> dedup -> aliases -> CMS overlay -> heroes ->
/// routes and menu.
pub struct Pipeline<'c> {
    config: &'c PipelineConfig,
    rewriter: Box<dyn AssetRewriter + Send + Sync>,
}

impl<'c> Pipeline<'c> {
    pub fn new(config: &'c PipelineConfig) -> Self {
        Self {
            config,
            rewriter: Box::new(RegexAssetRewriter),
        }
    }

    pub fn with_rewriter(mut self, rewriter: impl AssetRewriter + Send + Sync + 'static) -> Self {
        self.rewriter = Box::new(rewriter);
        self
    }

    /// Fails only when the configuration itself is invalid (unparsable source
    /// URL, bad patterns). Bad records never fail the run.
    pub fn run(&self, corpus: &RawCorpus, overlay: &[CmsRow]) -> anyhow::Result<SiteContent> {
        let resolver = self.resolver_for(corpus)?;
        let normalizer = Normalizer::new(self.config, &resolver, self.rewriter.as_ref());
        let pages = self.normalize_and_dedupe(corpus, &normalizer);

        let mut pages = apply_aliases(pages, &self.config.aliases);
        if !overlay.is_empty() {
            pages = merge_overlay(pages, overlay, &normalizer);
            tracing::info!(rows = overlay.len(), pages = pages.len(), "applied cms overlay");
        }
        finalize_heroes(&mut pages, &resolver);

        let route_set: BTreeSet<String> = pages.iter().map(|page| page.path.clone()).collect();
        let mut routes: Vec<String> = route_set.iter().cloned().collect();
        for synthetic in &self.config.synthetic_routes {
            let synthetic = canonical_path(synthetic);
            if !routes.contains(&synthetic) {
                routes.push(synthetic);
            }
        }

        let known_routes: BTreeSet<String> = routes.iter().cloned().collect();
        let sanitizer = MenuSanitizer::new(resolver.allow_list());
        let menu = sanitizer.sanitize(&corpus.primary_menu, &known_routes);
        let menu_items = menu
            .iter()
            .map(|entry| sanitizer.to_internal_item(entry))
            .collect();

        let generated_at = coerce_string(corpus.generated_at.as_ref())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
        let source = coerce_string(corpus.source.as_ref())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.config.source.clone());
        let source_label = if overlay.is_empty() {
            SOURCE_LABEL
        } else {
            SOURCE_LABEL_WITH_CMS
        };

        Ok(SiteContent {
            generated_at,
            source,
            source_label: source_label.to_owned(),
            host_allow_list: resolver.allow_list().to_vec(),
            menu,
            menu_items,
            pages,
            routes,
        })
    }

    /// Normalized and deduplicated corpus, before aliases, overlay and hero
    /// fallbacks.
    pub fn normalized_pages(&self, corpus: &RawCorpus) -> anyhow::Result<Vec<LegacyPage>> {
        let resolver = self.resolver_for(corpus)?;
        let normalizer = Normalizer::new(self.config, &resolver, self.rewriter.as_ref());
        Ok(self.normalize_and_dedupe(corpus, &normalizer))
    }

    fn resolver_for(&self, corpus: &RawCorpus) -> anyhow::Result<AssetResolver> {
        let corpus_hosts: Vec<String> = corpus
            .host_allow_list
            .iter()
            .filter_map(|host| coerce_string(Some(host)))
            .collect();
        let allow_list = self.config.merged_allow_list(&corpus_hosts);
        AssetResolver::new(self.config, allow_list).context("build asset resolver")
    }

    fn normalize_and_dedupe(&self, corpus: &RawCorpus, normalizer: &Normalizer<'_>) -> Vec<LegacyPage> {
        let mut defaulted_records = 0_usize;
        let normalized: Vec<LegacyPage> = corpus
            .pages
            .iter()
            .map(|raw| {
                let normalized = normalizer.normalize(raw);
                if !normalized.defaulted.is_empty() {
                    defaulted_records += 1;
                }
                normalized.page
            })
            .collect();

        let pages = dedupe_pages(normalized);
        tracing::info!(
            raw = corpus.pages.len(),
            deduped = pages.len(),
            defaulted_records,
            "normalized corpus"
        );
        pages
    }

    /// Fetches the overlay (degrading to none on failure), then runs.
    pub async fn run_with_overlay(
        &self,
        corpus: &RawCorpus,
        source: Option<&dyn OverlaySource>,
    ) -> anyhow::Result<SiteContent> {
        let rows = match source {
            Some(source) => fetch_overlay(source).await,
            None => Vec::new(),
        };
        self.run(corpus, &rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageGroup {
    pub name: String,
    pub count: usize,
}

impl SiteContent {
    pub fn page_by_path(&self, path: &str) -> Option<&LegacyPage> {
        self.pages.iter().find(|page| same_path(&page.path, path))
    }

    pub fn home_page(&self) -> LegacyPage {
        match self.page_by_path("/") {
            Some(page) => page.clone(),
            None => LegacyPage {
                id: "home-fallback".to_owned(),
                url: self.source.clone(),
                path: "/".to_owned(),
                title: "Mei Energy".to_owned(),
                excerpt: "Dein Fitness-Studio fuer Koerper, Geist und Seele".to_owned(),
                text: "Mei Energy".to_owned(),
                html: "<p>Mei Energy</p>".to_owned(),
                category: "home".to_owned(),
                ..LegacyPage::default()
            },
        }
    }

    /// Pages linked from the menu in menu order, topped up from the corpus to
    /// six entries. The home page is never featured.
    pub fn featured_pages(&self) -> Vec<&LegacyPage> {
        const FEATURED: usize = 6;

        let mut featured: Vec<&LegacyPage> = Vec::new();
        for item in &self.menu_items {
            let Some(path) = item.path.as_deref() else {
                continue;
            };
            if path == "/" {
                continue;
            }
            if let Some(page) = self.page_by_path(path)
                && !featured.iter().any(|p| p.path == page.path)
            {
                featured.push(page);
            }
        }
        if featured.len() >= FEATURED {
            featured.truncate(FEATURED);
            return featured;
        }

        for candidate in self.pages.iter().filter(|page| page.path != "/") {
            if featured.len() >= FEATURED {
                break;
            }
            if featured.iter().any(|p| p.path == candidate.path) {
                continue;
            }
            featured.push(candidate);
        }
        featured
    }

    /// Most recently updated content pages; ties go to the higher quality
    /// score. Listing routes (`/`, `/library`, `/category/*`, `/author/*`) are
    /// skipped.
    pub fn latest_pages(&self, limit: usize) -> Vec<&LegacyPage> {
        let mut candidates: Vec<&LegacyPage> = self
            .pages
            .iter()
            .filter(|page| {
                let path = canonical_path(&page.path);
                path != "/"
                    && path != "/library"
                    && !path.starts_with("/category/")
                    && !path.starts_with("/author/")
            })
            .collect();

        candidates.sort_by(|a, b| {
            parse_date(&b.updated_at)
                .cmp(&parse_date(&a.updated_at))
                .then_with(|| quality_score(b).cmp(&quality_score(a)))
        });
        candidates.truncate(limit.max(1));
        candidates
    }

    pub fn page_groups(&self) -> Vec<PageGroup> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for page in &self.pages {
            let key = if page.category.is_empty() {
                "page"
            } else {
                page.category.as_str()
            };
            *counts.entry(key).or_default() += 1;
        }

        let mut groups: Vec<PageGroup> = counts
            .into_iter()
            .map(|(name, count)| PageGroup {
                name: name.to_owned(),
                count,
            })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        groups
    }

    /// Routes served by the generic page view: everything except the root and
    /// the routes with dedicated views.
    pub fn dynamic_routes<S: AsRef<str>>(&self, dedicated: &[S]) -> Vec<&str> {
        self.routes
            .iter()
            .map(String::as_str)
            .filter(|route| *route != "/")
            .filter(|route| !dedicated.iter().any(|d| same_path(d.as_ref(), route)))
            .collect()
    }
}

/// Milliseconds since the epoch, 0 for blank or unparsable input.
fn parse_date(value: &str) -> i64 {
    let value = value.trim();
    if value.is_empty() {
        return 0;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return parsed.timestamp_millis();
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return parsed.and_utc().timestamp_millis();
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp_millis())
        .unwrap_or(0)
}

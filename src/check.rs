use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;
use serde::Serialize;

use crate::cli::CheckArgs;
use crate::formats::RawCorpus;
use crate::normalize::coerce_string;
use crate::path::canonical_path;

static SPAM_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)casino|jackpot|slot|betting").expect("valid spam regex"));

#[derive(Debug, Clone)]
pub struct CheckThresholds {
    pub min_routes: usize,
    pub min_menu: usize,
    pub min_pages: usize,
    pub required_routes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub ok: bool,
    pub routes: usize,
    pub pages: usize,
    pub menu: usize,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let corpus_path = PathBuf::from(&args.corpus);
    let corpus = crate::resolve::load_corpus(&corpus_path)?;

    let thresholds = CheckThresholds {
        min_routes: args.min_routes,
        min_menu: args.min_menu,
        min_pages: args.min_pages,
        required_routes: args.required_route,
    };
    let summary = check_corpus(&corpus, &thresholds)
        .with_context(|| format!("check corpus: {}", corpus_path.display()))?;

    let json = serde_json::to_string_pretty(&summary).context("serialize check summary")?;
    println!("{json}");
    Ok(())
}

/// Coverage gate for a scraped corpus before it replaces the published one.
pub fn check_corpus(corpus: &RawCorpus, thresholds: &CheckThresholds) -> anyhow::Result<CheckSummary> {
    let routes: Vec<String> = corpus
        .route_paths
        .iter()
        .filter_map(|route| coerce_string(Some(route)))
        .map(|route| canonical_path(&route))
        .collect();

    if routes.len() < thresholds.min_routes {
        anyhow::bail!(
            "route coverage is unexpectedly low: {} < {}",
            routes.len(),
            thresholds.min_routes
        );
    }
    if corpus.primary_menu.len() < thresholds.min_menu {
        anyhow::bail!(
            "main menu is incomplete: {} < {}",
            corpus.primary_menu.len(),
            thresholds.min_menu
        );
    }
    if corpus.pages.len() < thresholds.min_pages {
        anyhow::bail!(
            "content corpus is unexpectedly small: {} < {}",
            corpus.pages.len(),
            thresholds.min_pages
        );
    }

    for required in &thresholds.required_routes {
        let required = canonical_path(required);
        if !routes.contains(&required) {
            anyhow::bail!("required legacy route is missing: {required}");
        }
    }

    for page in &corpus.pages {
        let path = coerce_string(page.path.as_ref()).unwrap_or_default();
        if SPAM_PATH_RE.is_match(&path) {
            anyhow::bail!("spam-like route should not be in migrated dataset: {path}");
        }
    }

    Ok(CheckSummary {
        ok: true,
        routes: routes.len(),
        pages: corpus.pages.len(),
        menu: corpus.primary_menu.len(),
    })
}

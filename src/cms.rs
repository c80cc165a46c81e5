use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::formats::{CmsRow, LegacyPage};
use crate::normalize::{Normalizer, coerce_string, page_id_from_path};
use crate::path::{canonical_path, is_feed_path, same_path};
use crate::text::{clean_text, paragraphs_html};

pub const LEGACY_PAGE_QUERY: &str = r#"*[_type == "legacyPage"]{
  _id,
  _updatedAt,
  title,
  "path": select(defined(path.current) => path.current, "/"),
  excerpt,
  category,
  "heroImageUrl": heroImage.asset->url,
  body
}"#;

static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph break regex"));

#[async_trait]
pub trait OverlaySource: Send + Sync {
    async fn fetch_rows(&self) -> anyhow::Result<Vec<CmsRow>>;
}

/// Best-effort fetch: any error is logged and turned into an empty overlay.
pub async fn fetch_overlay(source: &dyn OverlaySource) -> Vec<CmsRow> {
    match source.fetch_rows().await {
        Ok(rows) => {
            tracing::info!(rows = rows.len(), "cms overlay fetched");
            rows
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "cms overlay unavailable; using base corpus");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmsConfig {
    pub project_id: String,
    pub dataset: String,
    pub token: Option<String>,
    pub api_version: String,
    pub use_cdn: bool,
    /// Replaces `https://<project>.api(cdn).sanity.io`.
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl CmsConfig {
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            token: None,
            api_version: "2025-02-01".to_owned(),
            use_cdn: true,
            base_url: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// `None` unless both a project id and a dataset are configured.
    pub fn from_env() -> Option<Self> {
        let project_id = env_first(&["SANITY_PROJECT_ID", "NEXT_PUBLIC_SANITY_PROJECT_ID"])?;
        let dataset = env_first(&["SANITY_DATASET", "NEXT_PUBLIC_SANITY_DATASET"])?;

        let mut config = Self::new(project_id, dataset);
        config.token = env_first(&["SANITY_API_READ_TOKEN"]);
        if let Some(api_version) = env_first(&["SANITY_API_VERSION"]) {
            config.api_version = api_version;
        }
        config.base_url = env_first(&["LEGACYSITE_SANITY_BASE_URL"]);
        Some(config)
    }

    pub fn query_endpoint(&self) -> String {
        let base = match self.base_url.as_deref() {
            Some(base) => base.trim_end_matches('/').to_owned(),
            None if self.use_cdn => format!("https://{}.apicdn.sanity.io", self.project_id),
            None => format!("https://{}.api.sanity.io", self.project_id),
        };
        let version = self.api_version.trim_start_matches('v');
        format!("{base}/v{version}/data/query/{}", self.dataset)
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty())
}

/// Reads published `legacyPage` documents through the Sanity HTTP query API.
#[derive(Debug, Clone)]
pub struct SanityClient {
    config: CmsConfig,
    http: reqwest::Client,
}

impl SanityClient {
    pub fn new(config: CmsConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build sanity http client")?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl OverlaySource for SanityClient {
    async fn fetch_rows(&self) -> anyhow::Result<Vec<CmsRow>> {
        let endpoint = self.config.query_endpoint();
        let mut request = self
            .http
            .get(&endpoint)
            .query(&[("query", LEGACY_PAGE_QUERY), ("perspective", "published")]);
        if let Some(token) = self.config.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GET {endpoint}"))?;
        let status = response.status();
        let raw = response.text().await.context("read sanity response body")?;
        if !status.is_success() {
            anyhow::bail!("sanity query failed ({status}): {raw}");
        }

        let value: Value = serde_json::from_str(&raw).context("parse sanity response")?;
        let result = value
            .get("result")
            .ok_or_else(|| anyhow::anyhow!("missing `result` in sanity response"))?;
        parse_cms_rows(result)
    }
}

/// Rows exported to a JSON file, either a bare array or a `{"result": [...]}`
/// query response.
#[derive(Debug, Clone)]
pub struct FileOverlay {
    path: PathBuf,
}

impl FileOverlay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OverlaySource for FileOverlay {
    async fn fetch_rows(&self) -> anyhow::Result<Vec<CmsRow>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read overlay: {}", self.path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parse overlay: {}", self.path.display()))?;
        let rows = value.get("result").unwrap_or(&value);
        parse_cms_rows(rows)
    }
}

pub fn parse_cms_rows(value: &Value) -> anyhow::Result<Vec<CmsRow>> {
    let Value::Array(items) = value else {
        anyhow::bail!("cms rows must be an array");
    };
    Ok(items.iter().filter_map(parse_cms_row).collect())
}

pub fn parse_cms_row(value: &Value) -> Option<CmsRow> {
    let object = value.as_object()?;
    let text = |key: &str| {
        coerce_string(object.get(key))
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
    };

    let path = match object.get("path") {
        Some(Value::Object(slug)) => coerce_string(slug.get("current")),
        other => coerce_string(other),
    };

    Some(CmsRow {
        id: text("_id").unwrap_or_default(),
        path: canonical_path(path.as_deref().unwrap_or("/")),
        title: text("title"),
        excerpt: text("excerpt"),
        category: text("category"),
        hero_image_url: text("heroImageUrl"),
        body: object
            .get("body")
            .map(flatten_portable_text)
            .filter(|body| !body.is_empty()),
        updated_at: text("_updatedAt"),
    })
}

/// Plain strings pass through; block arrays become the concatenated span
/// texts of each block, blocks separated by a blank line.
pub fn flatten_portable_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .map(|block| {
                let Some(children) = block.get("children").and_then(Value::as_array) else {
                    return String::new();
                };
                children
                    .iter()
                    .filter_map(|child| child.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_owned(),
        _ => String::new(),
    }
}

/// Overlays CMS rows onto the corpus, field by field. Blank row fields keep
/// the existing value; rows without a local page become new pages. Rows for
/// feed paths are ignored. The result is sorted by path.
pub fn merge_overlay(
    mut pages: Vec<LegacyPage>,
    rows: &[CmsRow],
    normalizer: &Normalizer<'_>,
) -> Vec<LegacyPage> {
    for row in rows {
        let path = canonical_path(&row.path);
        if is_feed_path(&path) {
            tracing::debug!(%path, row = %row.id, "skipping cms row for feed path");
            continue;
        }
        match pages.iter_mut().find(|page| same_path(&page.path, &path)) {
            Some(page) => {
                tracing::debug!(%path, row = %row.id, "merging cms row");
                merge_row(page, row, normalizer);
            }
            None => {
                tracing::debug!(%path, row = %row.id, "creating page from cms row");
                pages.push(page_from_row(&path, row, normalizer));
            }
        }
    }

    pages.sort_by(|a, b| a.path.cmp(&b.path));
    pages
}

fn merge_row(page: &mut LegacyPage, row: &CmsRow, normalizer: &Normalizer<'_>) {
    if let Some(title) = cleaned(row.title.as_deref()) {
        page.title = title;
    }
    if let Some(excerpt) = cleaned(row.excerpt.as_deref()) {
        page.excerpt = excerpt;
    }
    if let Some(category) = cleaned(row.category.as_deref()) {
        page.category = normalizer.clean_category(&category);
    }
    if let Some((text, html)) = row.body.as_deref().and_then(|body| body_markup(body, normalizer)) {
        page.text = text;
        page.html = html;
    }

    let declared = row
        .hero_image_url
        .as_deref()
        .unwrap_or(page.hero_image.as_str())
        .to_owned();
    page.content_images = normalizer.collect_images(&page.html);
    page.hero_image = normalizer.best_hero(&declared, &page.content_images);
}

fn page_from_row(path: &str, row: &CmsRow, normalizer: &Normalizer<'_>) -> LegacyPage {
    let (text, html) = match row.body.as_deref().and_then(|body| body_markup(body, normalizer)) {
        Some(markup) => markup,
        None => (String::new(), normalizer.build_html("", "")),
    };
    let content_images = normalizer.collect_images(&html);
    let hero_image =
        normalizer.best_hero(row.hero_image_url.as_deref().unwrap_or(""), &content_images);

    LegacyPage {
        id: match row.id.as_str() {
            "" => page_id_from_path(path),
            id => id.to_owned(),
        },
        url: String::new(),
        path: path.to_owned(),
        title: cleaned(row.title.as_deref()).unwrap_or_else(|| "Untitled".to_owned()),
        excerpt: cleaned(row.excerpt.as_deref()).unwrap_or_default(),
        text,
        html,
        hero_image,
        content_images,
        updated_at: row.updated_at.clone().unwrap_or_default(),
        category: normalizer.clean_category(row.category.as_deref().unwrap_or("")),
    }
}

/// Plain text and escaped paragraph markup for a flattened body, or `None`
/// when the body has no visible text.
fn body_markup(body: &str, normalizer: &Normalizer<'_>) -> Option<(String, String)> {
    let paragraphs: Vec<String> = PARAGRAPH_BREAK_RE
        .split(body)
        .map(clean_text)
        .filter(|paragraph| !paragraph.is_empty())
        .collect();
    if paragraphs.is_empty() {
        return None;
    }

    let text = paragraphs.join(" ");
    let limit = normalizer.max_paragraphs().min(paragraphs.len());
    Some((text, paragraphs_html(&paragraphs[..limit])))
}

fn cleaned(value: Option<&str>) -> Option<String> {
    value.map(clean_text).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::assets::{AssetResolver, RegexAssetRewriter};
    use crate::config::PipelineConfig;

    fn with_normalizer<T>(f: impl FnOnce(&Normalizer<'_>) -> T) -> T {
        let config = PipelineConfig::default();
        let resolver =
            AssetResolver::new(&config, config.merged_allow_list::<&str>(&[])).expect("resolver");
        let rewriter = RegexAssetRewriter;
        f(&Normalizer::new(&config, &resolver, &rewriter))
    }

    fn base_page() -> LegacyPage {
        LegacyPage {
            id: "kontakt".to_owned(),
            path: "/kontakt".to_owned(),
            title: "Kontakt".to_owned(),
            excerpt: "Schreib uns".to_owned(),
            text: "Alt.".to_owned(),
            html: "<p>Alt.</p>".to_owned(),
            category: "page".to_owned(),
            ..LegacyPage::default()
        }
    }

    #[test]
    fn flatten_portable_text_joins_blocks() {
        let body = json!([
            {"_type": "block", "children": [{"text": "Hallo "}, {"text": "Welt"}]},
            {"_type": "image"},
            {"_type": "block", "children": [{"text": "Zweiter"}, {"marks": []}]},
        ]);
        assert_eq!(flatten_portable_text(&body), "Hallo Welt\n\n\n\nZweiter");
        assert_eq!(flatten_portable_text(&json!("plain")), "plain");
        assert_eq!(flatten_portable_text(&json!(12)), "");
    }

    #[test]
    fn parse_cms_row_normalizes_fields() {
        let row = parse_cms_row(&json!({
            "_id": "legacyPage.kontakt",
            "title": "  ",
            "path": {"current": "kontakt/"},
            "excerpt": "Neu",
            "heroImageUrl": null,
            "body": [{"children": [{"text": "Text"}]}],
        }))
        .expect("row");

        assert_eq!(row.id, "legacyPage.kontakt");
        assert_eq!(row.path, "/kontakt");
        assert_eq!(row.title, None);
        assert_eq!(row.excerpt.as_deref(), Some("Neu"));
        assert_eq!(row.hero_image_url, None);
        assert_eq!(row.body.as_deref(), Some("Text"));
    }

    #[test]
    fn parse_cms_rows_rejects_non_arrays() {
        assert!(parse_cms_rows(&json!({"x": 1})).is_err());
        assert_eq!(parse_cms_rows(&json!([1, {"path": "/a"}])).expect("rows").len(), 1);
    }

    #[test]
    fn overlay_title_replaces_and_blank_excerpt_keeps() {
        let row = CmsRow {
            path: "/kontakt/".to_owned(),
            title: Some("Kontakt & Anfahrt".to_owned()),
            excerpt: Some(String::new()),
            ..CmsRow::default()
        };
        let out = with_normalizer(|n| merge_overlay(vec![base_page()], &[row], n));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Kontakt & Anfahrt");
        assert_eq!(out[0].excerpt, "Schreib uns");
        assert_eq!(out[0].html, "<p>Alt.</p>");
    }

    #[test]
    fn overlay_ignores_feed_rows() {
        let rows = [
            CmsRow {
                path: "/blog/feed".to_owned(),
                title: Some("RSS".to_owned()),
                ..CmsRow::default()
            },
            CmsRow {
                path: "/feed/".to_owned(),
                ..CmsRow::default()
            },
        ];
        let out = with_normalizer(|n| merge_overlay(vec![base_page()], &rows, n));

        assert_eq!(out, vec![base_page()]);
    }

    #[test]
    fn overlay_body_is_escaped_into_paragraphs() {
        let row = CmsRow {
            path: "/kontakt".to_owned(),
            body: Some("Erster <b>Absatz</b>\n\nZweiter & letzter".to_owned()),
            category: Some("Info".to_owned()),
            ..CmsRow::default()
        };
        let out = with_normalizer(|n| merge_overlay(vec![base_page()], &[row], n));

        assert_eq!(
            out[0].html,
            "<p>Erster &lt;b&gt;Absatz&lt;/b&gt;</p><p>Zweiter &amp; letzter</p>"
        );
        assert_eq!(out[0].text, "Erster <b>Absatz</b> Zweiter & letzter");
        assert_eq!(out[0].category, "info");
    }

    #[test]
    fn overlay_hero_is_resolved_and_scored() {
        let row = CmsRow {
            path: "/kontakt".to_owned(),
            hero_image_url: Some("https://meienergy.de/wp-content/uploads/2024/studio.jpg".to_owned()),
            ..CmsRow::default()
        };
        let out = with_normalizer(|n| merge_overlay(vec![base_page()], &[row], n));
        assert_eq!(
            out[0].hero_image,
            "/legacy-assets/meienergy.de/wp-content/uploads/2024/studio.jpg"
        );
    }

    #[test]
    fn overlay_creates_missing_pages() {
        let row = CmsRow {
            id: "legacyPage.neu".to_owned(),
            path: "/neu".to_owned(),
            ..CmsRow::default()
        };
        let out = with_normalizer(|n| merge_overlay(vec![base_page()], &[row], n));

        let paths: Vec<&str> = out.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/kontakt", "/neu"]);
        let created = &out[1];
        assert_eq!(created.id, "legacyPage.neu");
        assert_eq!(created.title, "Untitled");
        assert_eq!(created.category, "page");
        assert_eq!(created.html, PipelineConfig::default().placeholder_html);
    }

    #[test]
    fn query_endpoint_honors_overrides() {
        let mut config = CmsConfig::new("abc123", "production");
        assert_eq!(
            config.query_endpoint(),
            "https://abc123.apicdn.sanity.io/v2025-02-01/data/query/production"
        );
        config.base_url = Some("http://127.0.0.1:9999/".to_owned());
        assert_eq!(
            config.query_endpoint(),
            "http://127.0.0.1:9999/v2025-02-01/data/query/production"
        );
    }

    #[tokio::test]
    async fn missing_overlay_file_degrades_to_empty() {
        let source = FileOverlay::new("/definitely/not/here.json");
        assert!(fetch_overlay(&source).await.is_empty());
    }
}

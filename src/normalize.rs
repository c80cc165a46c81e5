use std::fmt;

use serde_json::Value;
use sha2::Digest as _;

use crate::assets::{AssetResolver, AssetRewriter};
use crate::config::PipelineConfig;
use crate::formats::{LegacyPage, RawPage};
use crate::path::canonical_path;
use crate::text::{clean_text, synthesize_html};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageField {
    Id,
    Url,
    Path,
    Title,
    Excerpt,
    Text,
    Html,
    HeroImage,
    UpdatedAt,
    Category,
}

impl fmt::Display for PageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Id => "id",
            Self::Url => "url",
            Self::Path => "path",
            Self::Title => "title",
            Self::Excerpt => "excerpt",
            Self::Text => "text",
            Self::Html => "html",
            Self::HeroImage => "heroImage",
            Self::UpdatedAt => "updatedAt",
            Self::Category => "category",
        };
        f.write_str(name)
    }
}

/// A parsed page plus the fields that were absent, blank or mistyped in the
/// raw record and therefore got a default.
#[derive(Debug, Clone)]
pub struct NormalizedPage {
    pub page: LegacyPage,
    pub defaulted: Vec<PageField>,
}

pub struct Normalizer<'a> {
    config: &'a PipelineConfig,
    resolver: &'a AssetResolver,
    rewriter: &'a dyn AssetRewriter,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        resolver: &'a AssetResolver,
        rewriter: &'a dyn AssetRewriter,
    ) -> Self {
        Self {
            config,
            resolver,
            rewriter,
        }
    }

    pub fn resolver(&self) -> &AssetResolver {
        self.resolver
    }

    pub fn max_paragraphs(&self) -> usize {
        self.config.max_paragraphs.max(1)
    }

    pub fn normalize(&self, raw: &RawPage) -> NormalizedPage {
        let mut defaulted = Vec::new();
        let mut field = |value: &Option<Value>, name: PageField| {
            let coerced = coerce_string(value.as_ref());
            if coerced.as_deref().is_none_or(|s| s.trim().is_empty()) {
                defaulted.push(name);
            }
            coerced.unwrap_or_default()
        };

        let raw_id = field(&raw.id, PageField::Id);
        let raw_url = field(&raw.url, PageField::Url);
        let raw_path = field(&raw.path, PageField::Path);
        let raw_title = field(&raw.title, PageField::Title);
        let raw_excerpt = field(&raw.excerpt, PageField::Excerpt);
        let raw_text = field(&raw.text, PageField::Text);
        let raw_html = field(&raw.html, PageField::Html);
        let raw_hero = field(&raw.hero_image, PageField::HeroImage);
        let raw_updated_at = field(&raw.updated_at, PageField::UpdatedAt);
        let raw_category = field(&raw.category, PageField::Category);

        let path = canonical_path(&raw_path);
        let id = match raw_id.trim() {
            "" => page_id_from_path(&path),
            id => id.to_owned(),
        };

        let text = clean_text(&raw_text);
        let category = self.clean_category(&raw_category);
        let html = self.build_html(&raw_html, &text);
        let content_images = self.rewriter.collect_images(&html, self.resolver);
        let hero_image = self.best_hero(&raw_hero, &content_images);

        if !defaulted.is_empty() {
            tracing::debug!(
                %path,
                defaulted = %join_fields(&defaulted),
                "raw page fields defaulted"
            );
        }

        NormalizedPage {
            page: LegacyPage {
                id,
                url: raw_url.trim().to_owned(),
                path,
                title: clean_text(&raw_title),
                excerpt: clean_text(&raw_excerpt),
                text,
                html,
                hero_image,
                content_images,
                updated_at: raw_updated_at.trim().to_owned(),
                category,
            },
            defaulted,
        }
    }

    /// Cleaned source markup, or paragraphs synthesized from `text` when the
    /// markup is blank after cleanup.
    pub fn build_html(&self, raw_html: &str, text: &str) -> String {
        let html = self.rewriter.rewrite_html(raw_html, self.resolver);
        if !html.trim().is_empty() {
            return html;
        }
        synthesize_html(
            text,
            self.config.max_paragraphs,
            &self.config.placeholder_html,
        )
    }

    pub fn collect_images(&self, html: &str) -> Vec<String> {
        self.rewriter.collect_images(html, self.resolver)
    }

    /// Best useful image among the declared hero and the content images,
    /// without fallbacks.
    pub fn best_hero(&self, declared: &str, content_images: &[String]) -> String {
        let candidates = std::iter::once(declared).chain(content_images.iter().map(String::as_str));
        self.resolver.best_image(candidates).unwrap_or_default()
    }

    pub fn clean_category(&self, raw: &str) -> String {
        let category = clean_text(raw).to_lowercase();
        if category.is_empty() {
            "page".to_owned()
        } else {
            category
        }
    }
}

/// Strings pass through; numbers and booleans are stringified; null, arrays
/// and objects count as missing.
pub fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub fn page_id_from_path(path: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(canonical_path(path).as_bytes());
    let digest = hasher.finalize();
    format!("p_{}", hex::encode(digest))
}

fn join_fields(fields: &[PageField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Context as _;
use regex::{Captures, Regex, RegexSet, RegexSetBuilder};
use url::Url;

use crate::config::PipelineConfig;
use crate::path::canonical_path;

pub const LOCAL_ASSET_PREFIX: &str = "/legacy-assets/";

/// Score given to blank, `data:` and denylisted candidates.
pub const REJECTED_SCORE: i32 = -1000;

static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid digit run regex"));

/// Rewrites legacy asset URLs into the local-asset namespace and ranks image
/// candidates.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    local_host: String,
    allow_list: Vec<String>,
    upload_prefixes: Vec<String>,
    upload_markers: Vec<String>,
    denylist: RegexSet,
    thumbnails: RegexSet,
    extensions: Vec<String>,
    keywords: Vec<String>,
    min_recent_year: u16,
    hero_by_path: BTreeMap<String, String>,
    hero_by_category: BTreeMap<String, String>,
    default_hero: String,
}

impl AssetResolver {
    /// `allow_list` is the effective host allow-list (see
    /// [`PipelineConfig::merged_allow_list`]).
    pub fn new(config: &PipelineConfig, allow_list: Vec<String>) -> anyhow::Result<Self> {
        let source = Url::parse(config.source.trim())
            .with_context(|| format!("parse source url: {}", config.source))?;
        let local_host = source
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("source url must have host: {source}"))?
            .to_ascii_lowercase();

        let denylist = RegexSetBuilder::new(&config.image_denylist)
            .case_insensitive(true)
            .build()
            .context("compile image denylist")?;
        let thumbnails = RegexSetBuilder::new(&config.thumbnail_patterns)
            .case_insensitive(true)
            .build()
            .context("compile thumbnail patterns")?;

        Ok(Self {
            local_host,
            allow_list,
            upload_prefixes: config.upload_prefixes.clone(),
            upload_markers: lowercase_all(&config.upload_markers),
            denylist,
            thumbnails,
            extensions: lowercase_all(&config.image_extensions),
            keywords: lowercase_all(&config.relevance_keywords),
            min_recent_year: config.min_recent_year,
            hero_by_path: config
                .hero_fallbacks_by_path
                .iter()
                .map(|(path, url)| (canonical_path(path), url.clone()))
                .collect(),
            hero_by_category: config
                .hero_fallbacks_by_category
                .iter()
                .map(|(category, url)| (category.to_lowercase(), url.clone()))
                .collect(),
            default_hero: config.default_hero_image.clone(),
        })
    }

    pub fn allow_list(&self) -> &[String] {
        &self.allow_list
    }

    pub fn is_allowed_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.allow_list.iter().any(|allowed| *allowed == host)
    }

    /// Empty for blank and `data:` input; otherwise the local-asset form when
    /// the URL is a legacy upload or on an allow-listed host, else the input
    /// (protocol-relative URLs upgraded to `https:`).
    pub fn resolve(&self, url_like: &str) -> String {
        let raw = url_like.trim();
        if raw.is_empty() || is_data_url(raw) {
            return String::new();
        }
        if raw.starts_with(LOCAL_ASSET_PREFIX) {
            return raw.to_owned();
        }

        let raw = upgrade_protocol_relative(raw);
        if self.is_root_relative_upload(&raw) {
            return format!("{LOCAL_ASSET_PREFIX}{}{raw}", self.local_host);
        }

        let Ok(url) = Url::parse(&raw) else {
            return raw;
        };
        match url.host_str() {
            Some(host) if self.is_allowed_host(host) => {
                format!("{LOCAL_ASSET_PREFIX}{}{}", host.to_ascii_lowercase(), url.path())
            }
            _ => raw,
        }
    }

    /// Like [`AssetResolver::resolve`] but only rewrites links that point at
    /// legacy uploads; page links keep their absolute form.
    pub fn resolve_link(&self, url_like: &str) -> String {
        let raw = url_like.trim();
        if raw.is_empty() || is_data_url(raw) {
            return raw.to_owned();
        }
        let upgraded = upgrade_protocol_relative(raw);
        if self.is_upload(&upgraded) {
            return self.resolve(&upgraded);
        }
        upgraded
    }

    fn is_root_relative_upload(&self, url: &str) -> bool {
        url.starts_with('/')
            && !url.starts_with("//")
            && self
                .upload_prefixes
                .iter()
                .any(|prefix| url.starts_with(prefix.as_str()))
    }

    fn is_upload(&self, url: &str) -> bool {
        if self.is_root_relative_upload(url) {
            return true;
        }
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        parsed.host_str().is_some_and(|host| self.is_allowed_host(host))
            && self
                .upload_prefixes
                .iter()
                .any(|prefix| parsed.path().starts_with(prefix.as_str()))
    }

    pub fn is_decorative(&self, url: &str) -> bool {
        self.denylist.is_match(url)
    }

    pub fn image_candidate_score(&self, url: &str) -> i32 {
        let value = url.trim().to_lowercase();
        if value.is_empty() || is_data_url(&value) || self.is_decorative(&value) {
            return REJECTED_SCORE;
        }

        let path_part = value.split(['?', '#']).next().unwrap_or_default();
        let mut score = 0;

        if value.contains(LOCAL_ASSET_PREFIX)
            || self
                .upload_markers
                .iter()
                .any(|marker| value.contains(marker.as_str()))
        {
            score += 40;
        }

        let extension = path_part
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.contains('/'));
        if extension.is_some_and(|ext| self.extensions.iter().any(|known| known == ext)) {
            score += 25;
        }

        if DIGIT_RUN_RE.find_iter(&value).any(|run| {
            let run = run.as_str();
            run.len() == 4
                && run.starts_with("20")
                && run
                    .parse::<u16>()
                    .is_ok_and(|year| year >= self.min_recent_year)
        }) {
            score += 6;
        }

        if self.keywords.iter().any(|keyword| value.contains(keyword.as_str())) {
            score += 8;
        }

        if self.thumbnails.is_match(path_part) {
            score -= 16;
        }

        score
    }

    pub fn is_useful_image(&self, url: &str) -> bool {
        self.image_candidate_score(url) > 0
    }

    /// Highest-scoring useful candidate after resolution. The first one wins
    /// on equal scores.
    pub fn best_image<'a, I>(&self, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(i32, String)> = None;
        for candidate in candidates {
            let resolved = self.resolve(candidate);
            if resolved.is_empty() {
                continue;
            }
            let score = self.image_candidate_score(&resolved);
            if score <= 0 {
                continue;
            }
            if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
                best = Some((score, resolved));
            }
        }
        best.map(|(_, url)| url)
    }

    pub fn select_hero(
        &self,
        path: &str,
        category: &str,
        declared: &str,
        content_images: &[String],
    ) -> String {
        let candidates = std::iter::once(declared).chain(content_images.iter().map(String::as_str));
        self.best_image(candidates)
            .unwrap_or_else(|| self.fallback_hero(path, category))
    }

    pub fn fallback_hero(&self, path: &str, category: &str) -> String {
        self.hero_by_path
            .get(&canonical_path(path))
            .or_else(|| self.hero_by_category.get(&category.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| self.default_hero.clone())
    }
}

pub fn upgrade_protocol_relative(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_owned(),
    }
}

fn is_data_url(url: &str) -> bool {
    url.get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:"))
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

/// Rewrites asset references inside legacy markup and discovers the images it
/// contains. Implementations may work on strings or on a parsed tree.
pub trait AssetRewriter {
    fn rewrite_html(&self, html: &str, resolver: &AssetResolver) -> String;

    /// Useful images referenced by `src`, `data-src`, `data-lazy-src` and
    /// `srcset`, resolved and deduplicated in document order.
    fn collect_images(&self, html: &str, resolver: &AssetResolver) -> Vec<String>;
}

static SRCSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrcset=("[^"]*"|'[^']*')"#).expect("valid srcset regex")
});
static URL_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(data-lazy-src|data-src|src|href)=("[^"]*"|'[^']*')"#)
        .expect("valid url attribute regex")
});
static IMAGE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(data-lazy-src|data-src|srcset|src)=("[^"]*"|'[^']*')"#)
        .expect("valid image attribute regex")
});
static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->")
        .expect("valid block regex")
});
static NOISE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\s(?:style|data-elementor-type|data-elementor-id|aria-hidden)=(?:"[^"]*"|'[^']*')|\s(?:width|height)=(?:"[^"]*"|'[^']*'|[^\s>]+)"#,
    )
    .expect("valid noise attribute regex")
});
static EMPTY_ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let filler = r"(?:\s|&nbsp;|<br\s*/?\s*>)*";
    Regex::new(&format!(
        r"(?i)<p>{filler}</p>|<div>{filler}</div>|<span>{filler}</span>"
    ))
    .expect("valid empty element regex")
});
static BR_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:<br\s*/?\s*>\s*){3,}").expect("valid br regex"));
static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").expect("valid img regex"));

/// Regex-based rewriter tuned to the WordPress/Elementor export.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexAssetRewriter;

impl AssetRewriter for RegexAssetRewriter {
    fn rewrite_html(&self, html: &str, resolver: &AssetResolver) -> String {
        if html.trim().is_empty() {
            return String::new();
        }

        let out = SRCSET_RE.replace_all(html, |caps: &Captures<'_>| {
            let (quote, value) = unquote(&caps[1]);
            format!("srcset={quote}{}{quote}", rewrite_srcset(value, resolver))
        });
        let out = URL_ATTR_RE.replace_all(&out, |caps: &Captures<'_>| {
            let attr = &caps[1];
            let (quote, value) = unquote(&caps[2]);
            let rewritten = if attr.eq_ignore_ascii_case("href") {
                resolver.resolve_link(value)
            } else {
                rewrite_asset_value(value, resolver)
            };
            format!("{attr}={quote}{rewritten}{quote}")
        });

        let out = BLOCK_RE.replace_all(&out, "");
        let out = NOISE_ATTR_RE.replace_all(&out, "");
        let out = EMPTY_ELEMENT_RE.replace_all(&out, "");
        let out = BR_RUN_RE.replace_all(&out, "<br /><br />");
        let out = IMG_TAG_RE.replace_all(&out, |caps: &Captures<'_>| {
            let tag = &caps[0];
            let decorative = IMAGE_ATTR_RE
                .captures_iter(tag)
                .any(|attr| resolver.is_decorative(unquote(&attr[2]).1));
            if decorative {
                String::new()
            } else {
                tag.to_owned()
            }
        });

        out.trim().to_owned()
    }

    fn collect_images(&self, html: &str, resolver: &AssetResolver) -> Vec<String> {
        let mut images: Vec<String> = Vec::new();
        for caps in IMAGE_ATTR_RE.captures_iter(html) {
            let (_, value) = unquote(&caps[2]);
            let candidates: Vec<&str> = if caps[1].eq_ignore_ascii_case("srcset") {
                value
                    .split(',')
                    .filter_map(|entry| entry.split_whitespace().next())
                    .collect()
            } else {
                vec![value]
            };

            for candidate in candidates {
                let resolved = resolver.resolve(candidate);
                if resolved.is_empty()
                    || !resolver.is_useful_image(&resolved)
                    || images.contains(&resolved)
                {
                    continue;
                }
                images.push(resolved);
            }
        }
        images
    }
}

fn unquote(quoted: &str) -> (char, &str) {
    let quote = if quoted.starts_with('\'') { '\'' } else { '"' };
    let inner = quoted
        .get(1..quoted.len().saturating_sub(1))
        .unwrap_or_default();
    (quote, inner)
}

fn rewrite_asset_value(value: &str, resolver: &AssetResolver) -> String {
    let resolved = resolver.resolve(value);
    if resolved.is_empty() {
        value.to_owned()
    } else {
        resolved
    }
}

fn rewrite_srcset(value: &str, resolver: &AssetResolver) -> String {
    value
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?;
            let url = rewrite_asset_value(url, resolver);
            Some(match parts.next() {
                Some(descriptor) => format!("{url} {descriptor}"),
                None => url,
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AssetResolver {
        let config = PipelineConfig::default();
        let allow_list = config.merged_allow_list::<&str>(&[]);
        AssetResolver::new(&config, allow_list).expect("default resolver")
    }

    fn resolver_without_allow_list() -> AssetResolver {
        AssetResolver::new(&PipelineConfig::default(), Vec::new()).expect("resolver")
    }

    #[test]
    fn resolve_upgrades_and_rewrites_allow_listed_hosts() {
        let open = resolver_without_allow_list();
        assert_eq!(open.resolve("//meienergy.de/x.jpg"), "https://meienergy.de/x.jpg");

        let resolver = resolver();
        assert_eq!(
            resolver.resolve("https://meienergy.de/x.jpg"),
            "/legacy-assets/meienergy.de/x.jpg"
        );
        assert_eq!(
            resolver.resolve("//meienergy.de/x.jpg"),
            "/legacy-assets/meienergy.de/x.jpg"
        );
    }

    #[test]
    fn resolve_rejects_data_urls() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("data:image/png;base64,AAAA"), "");
        assert_eq!(resolver.resolve("DATA:image/gif;base64,R0l"), "");
        assert_eq!(resolver.resolve("   "), "");
    }

    #[test]
    fn resolve_rewrites_root_relative_uploads() {
        let resolver = resolver_without_allow_list();
        assert_eq!(
            resolver.resolve("/wp-content/uploads/2023/05/yoga.jpg"),
            "/legacy-assets/meienergy.de/wp-content/uploads/2023/05/yoga.jpg"
        );
    }

    #[test]
    fn resolve_passes_through_other_urls() {
        let resolver = resolver();
        let local = "/legacy-assets/meienergy.de/a.png";
        assert_eq!(resolver.resolve(local), local);
        assert_eq!(
            resolver.resolve("https://cdn.example.org/a.png?x=1"),
            "https://cdn.example.org/a.png?x=1"
        );
        assert_eq!(resolver.resolve("not a url"), "not a url");
        assert_eq!(resolver.resolve("/kontakt"), "/kontakt");
    }

    #[test]
    fn resolve_link_keeps_page_links_absolute() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve_link("//meienergy.de/kontakt"),
            "https://meienergy.de/kontakt"
        );
        assert_eq!(
            resolver.resolve_link("https://meienergy.de/wp-content/uploads/plan.pdf"),
            "/legacy-assets/meienergy.de/wp-content/uploads/plan.pdf"
        );
    }

    #[test]
    fn score_rejects_decorative_images() {
        let resolver = resolver();
        for url in [
            "",
            "data:image/png;base64,AAAA",
            "/legacy-assets/meienergy.de/wp-content/uploads/mei-energy-logo.png",
            "https://meienergy.de/favicon.ico",
            "/wp-content/plugins/wpforms-lite/assets/submit-spin.svg",
            "/wp-content/uploads/award.png",
        ] {
            assert_eq!(resolver.image_candidate_score(url), REJECTED_SCORE, "url={url}");
            assert!(!resolver.is_useful_image(url), "url={url}");
        }
    }

    #[test]
    fn score_accumulates_signals() {
        let resolver = resolver();
        // uploads + extension + year + keyword
        assert_eq!(
            resolver.image_candidate_score(
                "/legacy-assets/meienergy.de/wp-content/uploads/2023/05/yoga-kurs.jpg"
            ),
            40 + 25 + 6 + 8
        );
        // thumbnail variant loses 16
        assert_eq!(
            resolver.image_candidate_score(
                "/legacy-assets/meienergy.de/wp-content/uploads/2023/05/yoga-kurs-300x200.jpg"
            ),
            40 + 25 + 6 + 8 - 16
        );
        assert_eq!(resolver.image_candidate_score("https://cdn.example.org/a.png"), 25);
        assert_eq!(resolver.image_candidate_score("https://cdn.example.org/a"), 0);
        assert_eq!(resolver.image_candidate_score("/wp-content/uploads/2012/a.gif"), 65);
    }

    #[test]
    fn score_sees_every_year_segment() {
        let resolver = resolver();
        assert_eq!(
            resolver.image_candidate_score("https://cdn.example.org/2012/2024/x.jpg"),
            25 + 6
        );
        assert_eq!(
            resolver.image_candidate_score("https://cdn.example.org/2012/x-20245.jpg"),
            25
        );
    }

    #[test]
    fn score_gives_uploads_bonus_only_to_uploads() {
        let resolver = resolver();
        assert_eq!(
            resolver.image_candidate_score("https://cdn.example.org/wp-content/themes/x/bg.jpg"),
            25
        );
        assert_eq!(
            resolver.image_candidate_score("https://cdn.example.org/wp-content/uploads/bg.jpg"),
            40 + 25
        );
    }

    #[test]
    fn select_hero_prefers_highest_useful_candidate() {
        let resolver = resolver();
        let images = vec![
            "/legacy-assets/meienergy.de/wp-content/uploads/team-150x150.jpg".to_owned(),
            "/legacy-assets/meienergy.de/wp-content/uploads/2024/team.jpg".to_owned(),
        ];
        assert_eq!(
            resolver.select_hero("/team", "page", "https://meienergy.de/logo.png", &images),
            "/legacy-assets/meienergy.de/wp-content/uploads/2024/team.jpg"
        );
    }

    #[test]
    fn select_hero_falls_back_when_everything_is_decorative() {
        let resolver = resolver();
        let images = vec!["/wp-content/uploads/footer-logo.png".to_owned()];
        assert_eq!(
            resolver.select_hero("/kontakt/", "page", "/favicon.ico", &images),
            "/legacy-assets/meienergy.de/wp-content/uploads/kontakt.jpg"
        );
        let hero = resolver.select_hero("/anything", "page", "/logo.svg", &images);
        assert_eq!(hero, PipelineConfig::default().default_hero_image);
        assert!(!hero.contains("logo"));
    }

    #[test]
    fn fallback_hero_uses_category_table() -> anyhow::Result<()> {
        let mut config = PipelineConfig::default();
        config
            .hero_fallbacks_by_category
            .insert("Kurse".to_owned(), "/kurse.jpg".to_owned());
        let resolver = AssetResolver::new(&config, Vec::new())?;
        assert_eq!(resolver.fallback_hero("/x", "kurse"), "/kurse.jpg");
        Ok(())
    }

    #[test]
    fn new_rejects_invalid_denylist_pattern() {
        let config = PipelineConfig {
            image_denylist: vec!["(".to_owned()],
            ..PipelineConfig::default()
        };
        assert!(AssetResolver::new(&config, Vec::new()).is_err());
    }

    #[test]
    fn rewrite_html_rewrites_attributes_and_strips_noise() {
        let resolver = resolver();
        let html = r#"<script>alert(1)</script><!-- c -->
<p style="color:red">Hallo</p><p>&nbsp;</p>
<img src="//meienergy.de/wp-content/uploads/mei-energy-logo.png" width="10">
<img data-src='/wp-content/uploads/2023/yoga.jpg' srcset="/wp-content/uploads/a.jpg 1x, //meienergy.de/b.jpg 2x" height=20>
<a href="//meienergy.de/kontakt">Kontakt</a><br><br><br><br>"#;

        let out = RegexAssetRewriter.rewrite_html(html, &resolver);
        assert!(!out.contains("<script"));
        assert!(!out.contains("<!--"));
        assert!(!out.contains("style="));
        assert!(!out.contains("width="));
        assert!(!out.contains("height="));
        assert!(!out.contains("<p>&nbsp;</p>"));
        assert!(!out.contains("logo"));
        assert!(out.contains("<p>Hallo</p>"));
        assert!(out.contains("data-src='/legacy-assets/meienergy.de/wp-content/uploads/2023/yoga.jpg'"));
        assert!(out.contains(
            r#"srcset="/legacy-assets/meienergy.de/wp-content/uploads/a.jpg 1x, /legacy-assets/meienergy.de/b.jpg 2x""#
        ));
        assert!(out.contains(r#"href="https://meienergy.de/kontakt""#));
        assert!(out.contains("<br /><br />"));
        assert!(!out.contains("<br /><br /><br"));
    }

    #[test]
    fn rewrite_html_keeps_data_urls_in_markup() {
        let resolver = resolver();
        let out = RegexAssetRewriter.rewrite_html(r#"<img src="data:image/gif;base64,R0l">"#, &resolver);
        assert_eq!(out, r#"<img src="data:image/gif;base64,R0l">"#);
    }

    #[test]
    fn collect_images_dedups_and_filters() {
        let resolver = resolver();
        let html = r#"<img src="https://meienergy.de/wp-content/uploads/2023/studio.jpg">
<img data-lazy-src="/wp-content/uploads/2023/studio.jpg">
<img src="data:image/png;base64,AAAA" data-src="/wp-content/uploads/kurs.png">
<img srcset="/wp-content/uploads/logo.png 1x, /wp-content/uploads/team.webp 2x">"#;

        let images = RegexAssetRewriter.collect_images(html, &resolver);
        assert_eq!(
            images,
            vec![
                "/legacy-assets/meienergy.de/wp-content/uploads/2023/studio.jpg",
                "/legacy-assets/meienergy.de/wp-content/uploads/kurs.png",
                "/legacy-assets/meienergy.de/wp-content/uploads/team.webp",
            ]
        );
    }
}

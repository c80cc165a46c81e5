use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Everything the pipeline used to read from module-level constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Origin of the legacy site. Its host owns rewritten upload paths.
    pub source: String,
    pub host_allow_list: Vec<String>,
    /// Root-relative prefixes that identify legacy uploads, e.g. `/wp-content/`.
    pub upload_prefixes: Vec<String>,
    /// Path fragments that earn an image the uploads bonus when scoring.
    pub upload_markers: Vec<String>,
    /// Regex patterns (matched case-insensitively) for decorative images.
    pub image_denylist: Vec<String>,
    pub image_extensions: Vec<String>,
    pub relevance_keywords: Vec<String>,
    /// Regex patterns for thumbnail, cropped and scaled image variants.
    pub thumbnail_patterns: Vec<String>,
    pub min_recent_year: u16,
    pub hero_fallbacks_by_path: BTreeMap<String, String>,
    pub hero_fallbacks_by_category: BTreeMap<String, String>,
    pub default_hero_image: String,
    pub aliases: Vec<AliasRule>,
    pub synthetic_routes: Vec<String>,
    pub max_paragraphs: usize,
    pub placeholder_html: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasRule {
    pub path: String,
    pub title: String,
    /// Candidate source paths, tried in order.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Used when none of `sources` exists.
    #[serde(default)]
    pub source_category: Option<String>,
    pub id_suffix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: "https://meienergy.de".to_owned(),
            host_allow_list: strings(&["meienergy.de", "www.meienergy.de"]),
            upload_prefixes: strings(&["/wp-content/"]),
            upload_markers: strings(&["/wp-content/uploads/"]),
            image_denylist: strings(&[
                "logo",
                "favicon",
                "spinner",
                "submit-spin",
                "borlabs",
                "wpforms-lite",
                "elementor",
                "/plugins/",
                r"award\.png",
                "badge",
            ]),
            image_extensions: strings(&["jpg", "jpeg", "png", "webp", "gif", "avif"]),
            relevance_keywords: strings(&[
                "fitness", "kurs", "training", "yoga", "pilates", "studio", "team", "reha",
                "zumba", "sport", "gesund",
            ]),
            thumbnail_patterns: strings(&[
                r"-\d{2,4}x\d{2,4}\.[a-z0-9]+$",
                "thumb",
                "cropped",
                "-scaled",
            ]),
            min_recent_year: 2018,
            hero_fallbacks_by_path: BTreeMap::from([
                (
                    "/kursuebersicht".to_owned(),
                    "/legacy-assets/meienergy.de/wp-content/uploads/kursuebersicht.jpg".to_owned(),
                ),
                (
                    "/kontakt".to_owned(),
                    "/legacy-assets/meienergy.de/wp-content/uploads/kontakt.jpg".to_owned(),
                ),
            ]),
            hero_fallbacks_by_category: BTreeMap::new(),
            default_hero_image: "/legacy-assets/meienergy.de/wp-content/uploads/studio.jpg"
                .to_owned(),
            aliases: vec![
                AliasRule {
                    path: "/feedback".to_owned(),
                    title: "Feedback".to_owned(),
                    sources: strings(&["/fit-testimonials", "/testimonials-cat/testimonials-v1"]),
                    source_category: Some("testimonials".to_owned()),
                    id_suffix: "feedback".to_owned(),
                },
                AliasRule {
                    path: "/datenschutz".to_owned(),
                    title: "Datenschutz".to_owned(),
                    sources: strings(&["/datenschutzerklaerung"]),
                    source_category: None,
                    id_suffix: "datenschutz".to_owned(),
                },
            ],
            synthetic_routes: strings(&["/library", "/cookie", "/datenschutz"]),
            max_paragraphs: 32,
            placeholder_html: "<p>Fuer diese Seite liegt kein strukturierter Inhalt vor.</p>"
                .to_owned(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read pipeline config: {}", path.display()))?;
        serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse pipeline config: {}", path.display()))
    }

    /// Configured allow-list plus extra hosts (the corpus' own list), lowercased
    /// and deduplicated in first-seen order.
    pub fn merged_allow_list<S: AsRef<str>>(&self, extra: &[S]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let hosts = self
            .host_allow_list
            .iter()
            .map(String::as_str)
            .chain(extra.iter().map(|s| s.as_ref()));
        for host in hosts {
            let host = host.trim().to_ascii_lowercase();
            if host.is_empty() || out.contains(&host) {
                continue;
            }
            out.push(host);
        }
        out
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() -> anyhow::Result<()> {
        let config: PipelineConfig = serde_yaml::from_str(
            "host_allow_list: [example.org]\ndefault_hero_image: /x.jpg\n",
        )?;
        assert_eq!(config.host_allow_list, vec!["example.org"]);
        assert_eq!(config.default_hero_image, "/x.jpg");
        assert_eq!(config.max_paragraphs, 32);
        assert_eq!(config.aliases.len(), 2);
        Ok(())
    }

    #[test]
    fn merged_allow_list_lowercases_and_dedups() {
        let config = PipelineConfig {
            host_allow_list: vec!["meienergy.de".to_owned()],
            ..PipelineConfig::default()
        };
        let merged = config.merged_allow_list(&["MeiEnergy.de", "cdn.example.org", " "]);
        assert_eq!(merged, vec!["meienergy.de", "cdn.example.org"]);
    }

    #[test]
    fn load_reads_yaml_file() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("pipeline.yaml");
        std::fs::write(&path, "synthetic_routes: [/library]\n")?;
        let config = PipelineConfig::load(&path)?;
        assert_eq!(config.synthetic_routes, vec!["/library"]);
        Ok(())
    }
}

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The scraped `site-structure.json` document. Every field tolerates being
/// absent or mistyped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCorpus {
    #[serde(default)]
    pub generated_at: Option<Value>,
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub host_allow_list: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub primary_menu: Vec<RawMenuEntry>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub route_paths: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub pages: Vec<RawPage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub url: Option<Value>,
    #[serde(default)]
    pub path: Option<Value>,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub excerpt: Option<Value>,
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default)]
    pub html: Option<Value>,
    #[serde(default)]
    pub hero_image: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMenuEntry {
    #[serde(default)]
    pub label: Option<Value>,
    #[serde(default)]
    pub href: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPage {
    pub id: String,
    pub url: String,
    pub path: String,
    pub title: String,
    pub excerpt: String,
    pub text: String,
    pub html: String,
    pub hero_image: String,
    pub content_images: Vec<String>,
    pub updated_at: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalMenuItem {
    pub label: String,
    pub href: String,
    pub path: Option<String>,
    pub external: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContent {
    pub generated_at: String,
    pub source: String,
    pub source_label: String,
    pub host_allow_list: Vec<String>,
    pub menu: Vec<MenuEntry>,
    pub menu_items: Vec<InternalMenuItem>,
    pub pages: Vec<LegacyPage>,
    pub routes: Vec<String>,
}

/// One `legacyPage` row from the CMS, with `body` already flattened to text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmsRow {
    pub id: String,
    pub path: String,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    pub hero_image_url: Option<String>,
    pub body: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type")]
    pub kind: String,
    pub title: String,
    pub route_path: String,
    pub path: CmsSlug,
    pub excerpt: String,
    pub category: String,
    pub body: Vec<PortableTextBlock>,
    pub hero_image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsSlug {
    #[serde(rename = "_type")]
    pub kind: String,
    pub current: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableTextBlock {
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(rename = "_key")]
    pub key: String,
    pub style: String,
    pub mark_defs: Vec<Value>,
    pub children: Vec<PortableTextSpan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortableTextSpan {
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(rename = "_key")]
    pub key: String,
    pub marks: Vec<String>,
    pub text: String,
}

/// Accepts a missing/null/non-array value as empty and replaces elements that
/// do not deserialize with `T::default()`.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .map(|item| serde_json::from_value(item).unwrap_or_default())
        .collect())
}

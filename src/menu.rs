use std::collections::BTreeSet;

use url::Url;

use crate::assets::upgrade_protocol_relative;
use crate::formats::{InternalMenuItem, MenuEntry, RawMenuEntry};
use crate::normalize::coerce_string;
use crate::path::canonical_path;
use crate::text::clean_text;

/// Validates navigation entries against the resolved routes of the site.
#[derive(Debug, Clone, Copy)]
pub struct MenuSanitizer<'a> {
    allow_list: &'a [String],
}

impl<'a> MenuSanitizer<'a> {
    pub fn new(allow_list: &'a [String]) -> Self {
        Self { allow_list }
    }

    /// Cleans labels and hrefs, drops duplicates and internal links to unknown
    /// routes, and guarantees a leading `Home` entry for `/`.
    pub fn sanitize(&self, entries: &[RawMenuEntry], routes: &BTreeSet<String>) -> Vec<MenuEntry> {
        let mut out: Vec<MenuEntry> = Vec::new();

        for entry in entries {
            let label = clean_text(&coerce_string(entry.label.as_ref()).unwrap_or_default());
            let href = clean_href(&coerce_string(entry.href.as_ref()).unwrap_or_default());
            if label.is_empty() || href.is_empty() {
                continue;
            }

            if out.iter().any(|e| e.label == label && e.href == href) {
                continue;
            }

            if let Some(internal) = self.internal_path(&href)
                && !routes.contains(&internal)
            {
                tracing::debug!(%label, %href, "dropping menu entry for unknown route");
                continue;
            }

            out.push(MenuEntry { label, href });
        }

        if !out
            .iter()
            .any(|entry| self.internal_path(&entry.href).as_deref() == Some("/"))
        {
            out.insert(
                0,
                MenuEntry {
                    label: "Home".to_owned(),
                    href: "/".to_owned(),
                },
            );
        }

        out
    }

    /// Canonical route for local paths and links on allow-listed hosts;
    /// `None` for external targets.
    pub fn internal_path(&self, href: &str) -> Option<String> {
        let value = href.trim();
        if value.is_empty() {
            return None;
        }
        if value.starts_with('/') && !value.starts_with("//") {
            return Some(canonical_path(value));
        }

        let url = Url::parse(&upgrade_protocol_relative(value)).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();
        if !self.allow_list.iter().any(|allowed| *allowed == host) {
            return None;
        }
        Some(canonical_path(url.path()))
    }

    pub fn to_internal_item(&self, entry: &MenuEntry) -> InternalMenuItem {
        let path = self.internal_path(&entry.href);
        InternalMenuItem {
            label: entry.label.clone(),
            href: entry.href.clone(),
            external: path.is_none(),
            path,
        }
    }
}

/// Empty for rejected links (`javascript:`, unparsable); `mailto:`/`tel:`
/// unchanged; local paths canonicalized; absolute URLs without query and
/// fragment.
pub fn clean_href(value: &str) -> String {
    let href = value.trim();
    if href.is_empty() {
        return String::new();
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return href.to_owned();
    }
    if lower.starts_with("javascript:") {
        return String::new();
    }
    if href.starts_with('/') && !href.starts_with("//") {
        return canonical_path(href);
    }

    match Url::parse(&upgrade_protocol_relative(href)) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.set_query(None);
            url.to_string()
        }
        Err(_) => String::new(),
    }
}

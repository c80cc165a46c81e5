use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;

use crate::cli::ExportCmsArgs;
use crate::config::PipelineConfig;
use crate::formats::{CmsDocument, CmsSlug, LegacyPage, PortableTextBlock, PortableTextSpan};
use crate::path::canonical_path;
use crate::site::Pipeline;

const MAX_BLOCKS: usize = 120;

static NON_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9/]+").expect("valid slug regex"));
static BLOCK_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("valid block break regex"));

pub fn run(args: ExportCmsArgs) -> anyhow::Result<()> {
    let corpus_path = PathBuf::from(&args.corpus);
    let out_path = PathBuf::from(&args.out);

    if out_path.exists() {
        anyhow::bail!("cms export output already exists: {}", out_path.display());
    }

    let config = match args.config.as_deref() {
        Some(path) => PipelineConfig::load(&PathBuf::from(path))?,
        None => PipelineConfig::default(),
    };
    let corpus = crate::resolve::load_corpus(&corpus_path)?;
    let pages = Pipeline::new(&config)
        .normalized_pages(&corpus)
        .context("normalize corpus")?;

    if pages.is_empty() {
        tracing::info!("no pages to export");
        return Ok(());
    }

    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create cms export dir: {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&out_path)
        .with_context(|| format!("create cms export: {}", out_path.display()))?;
    let mut out = BufWriter::new(file);
    for document in cms_documents(&pages) {
        serde_json::to_writer(&mut out, &document).context("serialize cms document")?;
        out.write_all(b"\n").context("write cms document newline")?;
    }
    out.flush().context("flush cms export")?;

    tracing::info!(documents = pages.len(), out = %out_path.display(), "exported cms documents");
    Ok(())
}

pub fn cms_documents(pages: &[LegacyPage]) -> Vec<CmsDocument> {
    pages.iter().map(to_cms_document).collect()
}

pub fn to_cms_document(page: &LegacyPage) -> CmsDocument {
    let path = canonical_path(&page.path);
    let slug = if path == "/" {
        "home".to_owned()
    } else {
        path[1..].to_owned()
    };
    let body_source = [&page.text, &page.excerpt, &page.title]
        .into_iter()
        .find(|value| !value.is_empty())
        .map(String::as_str)
        .unwrap_or_default();

    CmsDocument {
        id: to_doc_id(&path),
        kind: "legacyPage".to_owned(),
        title: if page.title.is_empty() {
            "Untitled".to_owned()
        } else {
            page.title.clone()
        },
        route_path: path,
        path: CmsSlug {
            kind: "slug".to_owned(),
            current: slug,
        },
        excerpt: page.excerpt.clone(),
        category: page.category.clone(),
        body: to_portable_text(body_source),
        hero_image_url: page.hero_image.clone(),
    }
}

/// `legacyPage.home` for the root, otherwise the path slugged into one
/// lowercase, dash-separated token.
pub fn to_doc_id(path: &str) -> String {
    let path = canonical_path(path);
    if path == "/" {
        return "legacyPage.home".to_owned();
    }

    let lowered = path[1..].to_lowercase();
    let slugged = NON_SLUG_RE.replace_all(&lowered, "-");
    let slugged = slugged.replace('/', "-");
    let slugged = slugged.trim_matches('-');
    let slugged = if slugged.is_empty() { "page" } else { slugged };
    format!("legacyPage.{slugged}")
}

pub fn to_portable_text(value: &str) -> Vec<PortableTextBlock> {
    BLOCK_BREAK_RE
        .split(value)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .take(MAX_BLOCKS)
        .enumerate()
        .map(|(index, part)| PortableTextBlock {
            kind: "block".to_owned(),
            key: format!("p{index}"),
            style: "normal".to_owned(),
            mark_defs: Vec::new(),
            children: vec![PortableTextSpan {
                kind: "span".to_owned(),
                key: format!("s{index}"),
                marks: Vec::new(),
                text: part.to_owned(),
            }],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::flatten_portable_text;

    #[test]
    fn to_doc_id_slugs_paths() {
        assert_eq!(to_doc_id("/"), "legacyPage.home");
        assert_eq!(to_doc_id("/Ueber-Uns/"), "legacyPage.ueber-uns");
        assert_eq!(to_doc_id("/kurse/yoga_abend"), "legacyPage.kurse-yoga-abend");
        assert_eq!(to_doc_id("/ä"), "legacyPage.page");
    }

    #[test]
    fn portable_text_roundtrips_through_flatten() -> anyhow::Result<()> {
        let blocks = to_portable_text("Erster Absatz\n\n\nZweiter Absatz\n\n  ");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].key, "p1");
        assert_eq!(blocks[1].children[0].key, "s1");

        let value = serde_json::to_value(&blocks)?;
        assert_eq!(value[0]["_type"], "block");
        assert!(value[0]["markDefs"].is_array());
        assert_eq!(flatten_portable_text(&value), "Erster Absatz\n\nZweiter Absatz");
        Ok(())
    }

    #[test]
    fn portable_text_is_capped() {
        let text = (0..130).map(|i| format!("Absatz {i}")).collect::<Vec<_>>().join("\n\n");
        assert_eq!(to_portable_text(&text).len(), MAX_BLOCKS);
    }

    #[test]
    fn cms_document_falls_back_to_excerpt_and_untitled() -> anyhow::Result<()> {
        let page = LegacyPage {
            path: "/kontakt".to_owned(),
            excerpt: "Ruf an".to_owned(),
            category: "page".to_owned(),
            ..LegacyPage::default()
        };
        let document = to_cms_document(&page);
        assert_eq!(document.title, "Untitled");
        assert_eq!(document.path.current, "kontakt");
        assert_eq!(document.body[0].children[0].text, "Ruf an");

        let value = serde_json::to_value(&document)?;
        assert_eq!(value["_id"], "legacyPage.kontakt");
        assert_eq!(value["_type"], "legacyPage");
        assert_eq!(value["routePath"], "/kontakt");
        assert_eq!(value["path"]["_type"], "slug");
        Ok(())
    }
}

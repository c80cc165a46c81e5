use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::ResolveArgs;
use crate::cms::{CmsConfig, FileOverlay, OverlaySource, SanityClient};
use crate::config::PipelineConfig;
use crate::formats::{RawCorpus, SiteContent};
use crate::site::Pipeline;

pub async fn run(args: ResolveArgs) -> anyhow::Result<()> {
    let corpus_path = PathBuf::from(&args.corpus);
    let out_path = PathBuf::from(&args.out);

    if out_path.exists() && !args.force {
        anyhow::bail!("site content output already exists: {}", out_path.display());
    }

    let config = match args.config.as_deref() {
        Some(path) => PipelineConfig::load(Path::new(path))?,
        None => PipelineConfig::default(),
    };
    let corpus = load_corpus(&corpus_path)?;

    let overlay = overlay_source(&args)?;
    let content = Pipeline::new(&config)
        .run_with_overlay(&corpus, overlay.as_deref())
        .await
        .context("resolve site content")?;

    write_site_content(&out_path, &content, args.force)?;
    tracing::info!(
        pages = content.pages.len(),
        routes = content.routes.len(),
        menu = content.menu.len(),
        source_label = %content.source_label,
        out = %out_path.display(),
        "resolved site content"
    );
    Ok(())
}

/// A missing or unreadable corpus is an error; a malformed one is not, as long
/// as the top level is a JSON object.
pub fn load_corpus(path: &Path) -> anyhow::Result<RawCorpus> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read corpus: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse corpus: {}", path.display()))
}

fn overlay_source(args: &ResolveArgs) -> anyhow::Result<Option<Box<dyn OverlaySource>>> {
    if let Some(path) = args.overlay.as_deref() {
        return Ok(Some(Box::new(FileOverlay::new(path))));
    }
    if !args.cms {
        return Ok(None);
    }

    match CmsConfig::from_env() {
        Some(config) => {
            let client = SanityClient::new(config).context("init sanity client")?;
            Ok(Some(Box::new(client)))
        }
        None => {
            tracing::warn!("--cms given but SANITY_PROJECT_ID/SANITY_DATASET are not set; skipping overlay");
            Ok(None)
        }
    }
}

pub fn write_site_content(out_path: &Path, content: &SiteContent, force: bool) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let file = options
        .open(out_path)
        .with_context(|| format!("create site content: {}", out_path.display()))?;

    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, content).context("serialize site content")?;
    out.write_all(b"\n").context("write site content newline")?;
    out.flush().context("flush site content")?;
    Ok(())
}

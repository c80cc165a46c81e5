use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve a scraped corpus into site content for the renderer.
    Resolve(ResolveArgs),
    /// Fail unless a scraped corpus covers the expected site.
    Check(CheckArgs),
    /// Write normalized pages as CMS documents (JSONL).
    ExportCms(ExportCmsArgs),
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Scraped corpus (`site-structure.json`).
    #[arg(long)]
    pub corpus: String,

    /// Output path for the resolved site content (JSON).
    #[arg(long)]
    pub out: String,

    /// Pipeline configuration (YAML). Built-in defaults when omitted.
    #[arg(long)]
    pub config: Option<String>,

    /// CMS rows exported to a JSON file, applied as the overlay.
    #[arg(long, conflicts_with = "cms")]
    pub overlay: Option<String>,

    /// Fetch the overlay from Sanity (configured via `SANITY_*` env vars).
    #[arg(long, default_value_t = false)]
    pub cms: bool,

    /// Overwrite an existing output file.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Scraped corpus (`site-structure.json`).
    #[arg(long)]
    pub corpus: String,

    /// Minimum number of route paths.
    #[arg(long, default_value_t = 50)]
    pub min_routes: usize,

    /// Minimum number of primary menu entries.
    #[arg(long, default_value_t = 8)]
    pub min_menu: usize,

    /// Minimum number of pages.
    #[arg(long, default_value_t = 50)]
    pub min_pages: usize,

    /// Route that must be present (repeatable).
    #[arg(
        long,
        default_values = ["/", "/ueber-uns", "/kursuebersicht", "/unsere-angebote", "/kontakt"]
    )]
    pub required_route: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ExportCmsArgs {
    /// Scraped corpus (`site-structure.json`).
    #[arg(long)]
    pub corpus: String,

    /// Output path for CMS documents (JSONL).
    #[arg(long)]
    pub out: String,

    /// Pipeline configuration (YAML). Built-in defaults when omitted.
    #[arg(long)]
    pub config: Option<String>,
}

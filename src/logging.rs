use anyhow::Context as _;

const DEFAULT_FILTER: &str = "legacysite=info,warn";

/// `RUST_LOG` wins; otherwise pipeline progress at info and everything else at
/// warn. Logs go to stderr so stdout stays free for command output.
pub fn init() -> anyhow::Result<()> {
    init_with_filter(DEFAULT_FILTER)
}

pub fn init_with_filter(default_filter: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
        .with_context(|| format!("build log filter: {default_filter}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

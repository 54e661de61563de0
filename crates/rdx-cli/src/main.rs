//! 🚀 rdx-cli — the front door, the bouncer, the maitre d' of rdx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Parse flags, set up logging, load config, let the library do the heavy lifting,
//! then either print a tidy summary or explain, cause by cause, what went wrong. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL};
use rdx::MigrationResult;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "rdx.toml";

/// 🚚 Reindex Elasticsearch indices from a source cluster into a destination cluster.
#[derive(Debug, Parser)]
#[command(name = "rdx", version, about)]
struct Cli {
    /// TOML config file. Defaults to ./rdx.toml when it exists.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated logical index names. Overrides `indices` from the config.
    #[arg(long, value_delimiter = ',')]
    indices: Vec<String>,

    /// Reuse an existing destination alias or index instead of refusing.
    #[arg(long)]
    overwrite: bool,
}

/// 🔌 Does this error chain smell like "the cluster isn't there"?
fn looks_like_connection_trouble(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let cause_str = cause.to_string();
        cause_str.contains("error sending request")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
    })
}

/// 🍽️ One row per index. Mismatched counts get a ⚠️, not a failure.
fn summary_table(results: &[MigrationResult]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "index", "physical", "source", "destination", "streamed", "pages", "batches", "",
    ]);
    for result in results {
        let verdict = if result.counts_match() { "✅" } else { "⚠️" };
        table.add_row(vec![
            Cell::new(&result.index),
            Cell::new(&result.physical_index),
            Cell::new(result.source_count).set_alignment(CellAlignment::Right),
            Cell::new(result.destination_count).set_alignment(CellAlignment::Right),
            Cell::new(result.documents_streamed).set_alignment(CellAlignment::Right),
            Cell::new(result.pages).set_alignment(CellAlignment::Right),
            Cell::new(result.batches).set_alignment(CellAlignment::Right),
            Cell::new(verdict),
        ]);
    }
    table
}

/// 🔍 `--config` if given, otherwise `rdx.toml` if it is sitting right here, otherwise env only.
fn resolve_config_path(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path));
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    let exists = fallback.try_exists().with_context(|| {
        format!(
            "💀 Couldn't check whether '{}' exists. Permissions? Cosmic rays? Use --config with an absolute path.",
            fallback.display()
        )
    })?;
    Ok(exists.then_some(fallback))
}

async fn run(cli: Cli) -> Result<Vec<MigrationResult>> {
    let config_path = resolve_config_path(cli.config)?;
    let mut app_config = rdx::app_config::load_config(config_path.as_deref()).context(
        "💀 In rdx-cli, main, we couldn't load the config. Make sure you didn't forget something obvious, like source_config or destination_config",
    )?;

    // -- 🎛️ flags beat the file
    if !cli.indices.is_empty() {
        app_config.indices = cli.indices;
    }
    app_config.overwrite |= cli.overwrite;

    rdx::run(app_config).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(results) => {
            info!("📋 reindex summary\n{}", summary_table(&results));
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
            }
            if looks_like_connection_trouble(&err) {
                error!(
                    "🔧 hint: looks like a cluster isn't reachable. \
                    Double-check that Elasticsearch is actually running at the configured url. \
                    If you're using Docker, try `docker ps` to see what's up, or \
                    `docker compose up -d` to resurrect it. ☕"
                );
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: u64, destination: u64) -> MigrationResult {
        MigrationResult {
            index: "accounts".into(),
            physical_index: "accounts-000001".into(),
            source_count: source,
            destination_count: destination,
            documents_streamed: source,
            pages: 1,
            batches: 1,
        }
    }

    #[test]
    fn the_one_where_flags_parse_into_a_list() {
        let cli = Cli::parse_from(["rdx", "--indices", "accounts,blocks", "--overwrite"]);
        assert_eq!(cli.indices, vec!["accounts", "blocks"]);
        assert!(cli.overwrite);
        assert!(cli.config.is_none());
    }

    #[test]
    fn the_one_where_the_summary_flags_a_mismatch() {
        let rendered = summary_table(&[result(3, 3), result(3, 2)]).to_string();
        assert!(rendered.contains("accounts-000001"));
        assert!(rendered.contains("✅"));
        assert!(rendered.contains("⚠️"));
    }

    #[test]
    fn the_one_where_refused_connections_get_a_hint() {
        let err = anyhow::anyhow!("tcp connect error: Connection refused")
            .context("💀 Could not connect to the source cluster");
        assert!(looks_like_connection_trouble(&err));
        assert!(!looks_like_connection_trouble(&anyhow::anyhow!("mapping exploded")));
    }

    #[test]
    fn the_one_where_an_explicit_config_path_wins() -> Result<()> {
        let path = resolve_config_path(Some(PathBuf::from("/tmp/custom.toml")))?;
        assert_eq!(path, Some(PathBuf::from("/tmp/custom.toml")));
        Ok(())
    }
}

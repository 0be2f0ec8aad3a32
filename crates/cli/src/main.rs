#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kpal_api::ClusterCatalog;
use kpal_core::{Filter, Resource};
use kpal_kubehub::KubeconfigCatalog;
use kpal_palette::PaletteConfig;
use kpal_search::{rank_with_limit, FilterSet, RESULT_LIMIT};
use tracing::info;

mod repl;

#[derive(Parser, Debug)]
#[command(name = "kpalctl", version, about = "kpal command palette CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Per-request timeout for cross-context calls
    #[arg(long = "timeout-ms", global = true, env = "KPAL_REQUEST_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank resources from a JSON file against a query
    Search {
        /// JSON array of resources ({kind, name, namespace?, uid?, apiVersion?})
        file: PathBuf,
        /// Free-text query; empty lists everything
        #[arg(default_value = "")]
        query: String,
        /// Attribute filter, e.g. "ns:web" or "kind:Pod" (repeatable)
        #[arg(long = "filter", action = ArgAction::Append)]
        filters: Vec<String>,
        #[arg(long = "limit", default_value_t = RESULT_LIMIT)]
        limit: usize,
    },
    /// Drive a palette from stdin: each line replaces the buffer, `:up` `:down` `:tab` `:enter` `:esc` `:open` `:close` are keys
    Repl {
        /// Serve resources from a JSON file
        #[arg(long = "file", conflicts_with = "kube")]
        file: Option<PathBuf>,
        /// Serve resources from the cluster of the current (or given) kubeconfig context
        #[arg(long = "kube", action = ArgAction::SetTrue)]
        kube: bool,
        #[arg(long = "context", requires = "kube")]
        context: Option<String>,
        /// Answer yes to delete confirmations
        #[arg(long = "yes", action = ArgAction::SetTrue)]
        yes: bool,
        #[arg(long = "prefix", env = "KPAL_COMMAND_PREFIX")]
        prefix: Option<String>,
    },
    /// List clusters from the local kubeconfig
    Clusters,
}

fn init_tracing() {
    let env = std::env::var("KPAL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries command output
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KPAL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KPAL_METRICS_ADDR; expected host:port");
        }
    }
}

pub(crate) fn load_resources(path: &Path) -> Result<Vec<Resource>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let items: Vec<Resource> = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(items)
}

fn parse_filters(raw: &[String]) -> Result<FilterSet> {
    let mut set = FilterSet::new();
    for f in raw {
        let Some(filter) = Filter::parse(f) else {
            bail!("invalid filter {f:?}; expected kind:, namespace: or node: followed by a value");
        };
        set.add(filter);
    }
    Ok(set)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let mut cfg = PaletteConfig::from_env();
    if let Some(ms) = cli.timeout_ms {
        cfg.request_timeout = Duration::from_millis(ms);
    }

    match cli.command {
        Commands::Search { file, query, filters, limit } => {
            let items = load_resources(&file)?;
            let set = parse_filters(&filters)?;
            let visible = set.apply(&items);
            let hits = rank_with_limit(&visible, &query, limit);
            info!(items = items.len(), visible = visible.len(), hits = hits.len(), query = %query, "search invoked");
            match cli.output {
                Output::Human => {
                    println!("{:<7} RESOURCE", "SCORE");
                    for h in hits.iter() {
                        println!("{:<7.2} {}", h.score, visible[h.idx].display());
                    }
                }
                Output::Json => {
                    #[derive(serde::Serialize)]
                    struct Row<'a> { resource: &'a Resource, score: f32 }
                    let rows: Vec<_> = hits.iter().map(|h| Row { resource: visible[h.idx], score: h.score }).collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
        Commands::Repl { file, kube, context, yes, prefix } => {
            if let Some(p) = prefix.filter(|p| !p.is_empty() && !p.chars().any(char::is_whitespace)) {
                cfg.command_prefix = p;
            }
            let source = match (file, kube) {
                (Some(path), _) => repl::Source::File(path),
                (None, true) => repl::Source::Kube(context),
                (None, false) => bail!("repl needs --file <json> or --kube"),
            };
            repl::run(source, cfg, yes, cli.output).await?;
        }
        Commands::Clusters => {
            let clusters = KubeconfigCatalog.list_clusters().await?;
            match cli.output {
                Output::Human => {
                    println!("{:<30} NAME", "ID");
                    for c in clusters {
                        println!("{:<30} {}", c.id, c.name);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&clusters)?),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_parse_with_aliases() {
        let set = parse_filters(&["ns:web".to_string(), "KIND:Pod".to_string()]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(parse_filters(&["label:app".to_string()]).is_err());
        assert!(parse_filters(&["kind:".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_repl_flags() {
        let cli = Cli::parse_from(["kpalctl", "-o", "json", "repl", "--file", "r.json", "--yes"]);
        assert_eq!(cli.output, Output::Json);
        assert!(matches!(cli.command, Commands::Repl { yes: true, kube: false, .. }));
        assert!(Cli::try_parse_from(["kpalctl", "repl", "--file", "r.json", "--kube"]).is_err());
    }
}

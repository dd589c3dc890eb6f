//! CLI entry point for corpora-fetch: exercise the archive proxy and the
//! exports without running the HTTP server.

use clap::{Parser, Subcommand};
use corpora_gateway::config::{load_config, Config};
use corpora_gateway::credentials::CredentialProvider;
use corpora_gateway::export::{self, Window};
use corpora_gateway::gateway::{self, Fetched, ListingLinks};
use futures_util::TryStreamExt;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "corpora-fetch", about = "Corpora gateway command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the listing of a prefix, or dump an object to stdout
    Fetch {
        #[arg(long, default_value = "corpora-gateway.yaml")]
        config: PathBuf,
        /// Bucket to read (defaults to archive.bucket)
        #[arg(long)]
        bucket: Option<String>,
        /// Object key or prefix
        #[arg(long)]
        path: String,
    },
    /// Export present rows of the downloadable table
    Export {
        #[arg(long, default_value = "corpora-gateway.yaml")]
        config: PathBuf,
        /// tsv (index export) or json (search)
        #[arg(long, default_value = "tsv")]
        format: String,
        /// Key substring to search for
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long)]
        offset: Option<String>,
        #[arg(long)]
        row_count: Option<String>,
        #[arg(long, default_value = "-")]
        output: String,
    },
}

fn read_config(path: &PathBuf) -> Option<Config> {
    match load_config(path) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            None
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let rc = match cli.command {
        Commands::Fetch {
            config,
            bucket,
            path,
        } => run_fetch(config, bucket, path),
        Commands::Export {
            config,
            format,
            query,
            offset,
            row_count,
            output,
        } => run_export(config, format, query, offset, row_count, output),
    };
    std::process::exit(rc);
}

fn run_fetch(config: PathBuf, bucket: Option<String>, path: String) -> i32 {
    let Some(config) = read_config(&config) else {
        return 1;
    };
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return 1;
        }
    };

    runtime.block_on(async move {
        let archive = match corpora_gateway::storage::open_archive(&config.archive).await {
            Ok(a) => a,
            Err(e) => {
                eprintln!("Error opening archive: {}", e);
                return 1;
            }
        };
        let bucket = bucket.unwrap_or_else(|| config.archive.bucket.clone());

        let fetched = match gateway::fetch(archive.as_ref(), &bucket, &path).await {
            Ok(f) => f,
            Err(e) => {
                eprintln!("{}", e);
                return 1;
            }
        };

        match fetched {
            Fetched::Object { body, .. } => {
                let mut stdout = std::io::stdout().lock();
                let mut chunks = body.chunks;
                loop {
                    match chunks.try_next().await {
                        Ok(Some(chunk)) => {
                            if let Err(e) = stdout.write_all(&chunk) {
                                eprintln!("Error writing output: {}", e);
                                return 1;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            eprintln!("Error reading object: {}", e);
                            return 1;
                        }
                    }
                }
                0
            }
            Fetched::Listing(listing) => {
                let bypass = config
                    .archive
                    .use_bypass
                    .then(|| config.archive.bypass_url.clone());
                let links = ListingLinks::new(&format!("/{}", listing.prefix), bypass);
                println!("{}", gateway::render_listing(&listing, &links));
                0
            }
            Fetched::EmptyPrefix(key) => {
                println!("<html><body>{}: not found</body></html>", key);
                0
            }
        }
    })
}

fn run_export(
    config: PathBuf,
    format: String,
    query: String,
    offset: Option<String>,
    row_count: Option<String>,
    output: String,
) -> i32 {
    let Some(config) = read_config(&config) else {
        return 1;
    };
    let db = match CredentialProvider::from_config(&config.database).database() {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error resolving database credentials: {}", e);
            return 1;
        }
    };

    let result = match format.as_str() {
        "tsv" => {
            let window = Window::for_index(&config.export, offset.as_deref(), row_count.as_deref());
            export::export_index(&db, window).and_then(|r| export::to_tsv(&r))
        }
        "json" => {
            let window =
                Window::for_search(&config.export, offset.as_deref(), row_count.as_deref());
            export::search(&db, &query, window).and_then(|r| export::to_json(&r))
        }
        other => {
            eprintln!("Error: unsupported format: {}", other);
            return 1;
        }
    };

    match result {
        Ok(text) => {
            if output == "-" {
                print!("{}", text);
            } else {
                if let Err(e) = std::fs::write(&output, text) {
                    eprintln!("Error writing output: {}", e);
                    return 1;
                }
                eprintln!("Exported to {}", output);
            }
            0
        }
        Err(e) => {
            eprintln!("Error exporting: {}", e);
            1
        }
    }
}

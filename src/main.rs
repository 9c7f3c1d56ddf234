use clap::{Parser, Subcommand};
use flickrtag::cache::PhotoCache;
use flickrtag::config::{self, FlickrTagConfig};
use flickrtag::document::{self, Collection, Document};
use flickrtag::{FlickrTag, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Release builds report the crate version, anything else `dev@<hash>`.
fn version_string() -> &'static str {
    if env!("ON_RELEASE_TAG") == "true" {
        return env!("CARGO_PKG_VERSION");
    }
    let hash = env!("GIT_HASH");
    if hash.is_empty() {
        return "dev@unknown";
    }
    let dirty = if env!("GIT_DIRTY") == "true" { "+dirty" } else { "" };
    // Called once, from the clap attribute.
    Box::leak(format!("dev@{hash}{dirty}").into_boxed_str())
}

#[derive(Parser)]
#[command(name = "flickrtag")]
#[command(about = "Embed Flickr photos in static site documents")]
#[command(long_about = "\
Embed Flickr photos in static site documents

Write a marker on its own line in any Markdown or HTML document:

  [flickr:id=52123456789]
  [flickr:id=52123456789,title=Harbour at dusk]

and the build replaces it with a captioned image linking to the photo page.
Photo metadata is fetched from the Flickr API once and cached on disk.

Content structure:

  content/
  ├── flickrtag.toml               # Config (API key, cache, rendering)
  ├── templates/flickr.html        # Optional override template
  ├── 2024-06-harbour.md           # Article
  └── pages/
      └── about.md                 # Page (anything under pages/)

Run 'flickrtag gen-config' to generate a documented flickrtag.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    /// Config file (default: <source>/flickrtag.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace markers in every document and write the site
    Build,
    /// Fetch metadata for uncached photos without writing documents
    Fetch,
    /// List markers per document with their cache status (no network)
    Check,
    /// Print a stock flickrtag.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.source.join(config::CONFIG_FILENAME));
    let site_config = config::load_config(&config_path)?;
    let documents = load_documents(&cli.source, &site_config)?;

    match cli.command {
        Command::Build => {
            println!("==> Building {}", cli.source.display());
            let plugin = FlickrTag::initialize(site_config, &cli.source)?;
            for collection in Collection::ALL {
                let mut batch: Vec<Document> = documents
                    .iter()
                    .filter(|d| d.collection == collection)
                    .cloned()
                    .collect();
                if batch.is_empty() {
                    continue;
                }
                let report = plugin.collection_generated(&mut batch)?;
                output::print_pass_report(collection, &report);
                document::write_documents(&batch, &cli.output)?;
            }
            println!("==> Build complete: {}", cli.output.display());
        }
        Command::Fetch => {
            let plugin = FlickrTag::initialize(site_config, &cli.source)?;
            let refresh = plugin.refresh(&documents)?;
            println!(
                "Cache: {} ({})",
                refresh.stats,
                plugin.config().cache.location.display()
            );
        }
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            let cache = PhotoCache::load(&site_config.cache.location);
            output::print_check_output(&documents, &cache);
        }
        Command::GenConfig => unreachable!("GenConfig handled above"),
    }

    Ok(())
}

/// Initialize logging: 0 = warn, 1 = info, 2+ = debug.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::new("flickrtag=warn"),
        1 => EnvFilter::new("flickrtag=info"),
        _ => EnvFilter::new("flickrtag=debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Load the content directory, leaving out the template directory.
fn load_documents(
    source: &Path,
    config: &FlickrTagConfig,
) -> Result<Vec<Document>, document::DocumentError> {
    let templates_dir = source.join(&config.render.templates_dir);
    document::load_documents(source, &[templates_dir])
}

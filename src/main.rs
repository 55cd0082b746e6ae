use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalogue_importer::cache::{CachedImporter, FileUnitCache, UnitCache};
use catalogue_importer::client::{CatalogueClient, HttpCatalogueClient};
use catalogue_importer::config::ImportConfig;
use catalogue_importer::db;
use catalogue_importer::error::ImportError;
use catalogue_importer::importers::{importer_for, Importer, IMPORTER_SLUGS};
use catalogue_importer::services::ImportService;

/// Import unit catalogues from university handbooks into SQLite.
#[derive(Debug, Parser)]
#[command(name = "catalogue-importer", version)]
struct Cli {
    /// Universities to import, e.g. `monash unsw`.
    universities: Vec<String>,

    /// Import every known university.
    #[arg(long, conflicts_with = "universities")]
    all: bool,

    /// Print the known university slugs and exit.
    #[arg(long)]
    list: bool,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    inter_batch_delay_ms: Option<u64>,

    #[arg(long)]
    max_throttle_retries: Option<u32>,

    /// Academic year to request from sources that are year-scoped.
    #[arg(long)]
    year: Option<i32>,

    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Ignore any configured cache directory.
    #[arg(long)]
    no_cache: bool,
}

impl Cli {
    fn apply(&self, config: &mut ImportConfig) -> Result<(), ImportError> {
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(batch_size) = self.batch_size {
            if batch_size == 0 {
                return Err(ImportError::Config("--batch-size must be at least 1".to_string()));
            }
            config.fetch.batch_size = batch_size;
        }
        if let Some(delay) = self.inter_batch_delay_ms {
            config.fetch.inter_batch_delay = Duration::from_millis(delay);
        }
        if let Some(retries) = self.max_throttle_retries {
            config.fetch.max_throttle_retries = retries;
        }
        if let Some(year) = self.year {
            config.base_year = year;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if self.no_cache {
            config.cache_dir = None;
        }
        Ok(())
    }

    fn selected(&self) -> Result<Vec<String>, ImportError> {
        if self.all {
            return Ok(IMPORTER_SLUGS.iter().map(|slug| slug.to_string()).collect());
        }
        if self.universities.is_empty() {
            return Err(ImportError::Config(format!(
                "no university selected, pass --all or one of: {}",
                IMPORTER_SLUGS.join(", ")
            )));
        }
        Ok(self.universities.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "catalogue_importer=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if cli.list {
        for slug in IMPORTER_SLUGS {
            println!("{}", slug);
        }
        return Ok(());
    }

    let mut config = ImportConfig::new_from_env()?;
    cli.apply(&mut config)?;

    let client: Arc<dyn CatalogueClient> = Arc::new(HttpCatalogueClient::new(&config)?);
    let cache: Option<Arc<dyn UnitCache>> = config
        .cache_dir
        .clone()
        .map(|dir| Arc::new(FileUnitCache::new(dir)) as Arc<dyn UnitCache>);

    // Resolve every slug before touching the database.
    let mut importers: Vec<Box<dyn Importer>> = Vec::new();
    for slug in cli.selected()? {
        let importer = importer_for(&slug, client.clone(), &config)?;
        importers.push(match &cache {
            Some(cache) => Box::new(CachedImporter::new(importer, cache.clone())),
            None => importer,
        });
    }

    let pool = db::connect(&config.database_url).await?;
    info!("Connected to {}", config.database_url);
    let service = ImportService::new(pool);

    let mut failed = Vec::new();
    for importer in &importers {
        let name = importer.info().name.clone();
        match service.run(importer.as_ref()).await {
            Ok(stats) => info!("Import finished: {:?}", stats),
            Err(e) => {
                error!(university = %name, error = %e, "Import aborted");
                failed.push(name);
            }
        }
    }

    if !failed.is_empty() {
        return Err(format!("import failed for: {}", failed.join(", ")).into());
    }

    Ok(())
}

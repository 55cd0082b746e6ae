pub mod adelaide;
pub mod anu;
pub mod melbourne;
pub mod monash;
pub mod normalize;
pub mod queensland;
pub mod sydney;
pub mod unsw;
pub mod western_australia;

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::CatalogueClient;
use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::models::{ImportUnit, UniversityInfo};

pub use adelaide::AdelaideImporter;
pub use anu::AnuImporter;
pub use melbourne::MelbourneImporter;
pub use monash::MonashImporter;
pub use queensland::QueenslandImporter;
pub use sydney::SydneyImporter;
pub use unsw::UnswImporter;
pub use western_australia::WesternAustraliaImporter;

/// One institution's catalogue source.
///
/// `get_units` returns every unit it could recover. A single course that
/// cannot be fetched or parsed is logged and left out; only a failure to
/// read the course index itself is returned as an error. Implementations
/// never write to the database.
#[async_trait]
pub trait Importer: Send + Sync {
    fn info(&self) -> &UniversityInfo;

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError>;
}

pub const IMPORTER_SLUGS: &[&str] = &[
    "monash",
    "melbourne",
    "adelaide",
    "anu",
    "unsw",
    "queensland",
    "sydney",
    "western-australia",
];

pub fn importer_for(
    slug: &str,
    client: Arc<dyn CatalogueClient>,
    config: &ImportConfig,
) -> Result<Box<dyn Importer>, ImportError> {
    let importer: Box<dyn Importer> = match slug {
        "monash" => Box::new(MonashImporter::new(client, config.fetch.clone())),
        "melbourne" => Box::new(MelbourneImporter::new(
            client,
            config.fetch.clone(),
            config.base_year,
            config.melbourne_user_id.clone(),
        )),
        "adelaide" => Box::new(AdelaideImporter::new(client, config.base_year)),
        "anu" => Box::new(AnuImporter::new(client)),
        "unsw" => Box::new(UnswImporter::new(client, config.base_year)),
        "queensland" => Box::new(QueenslandImporter::new(client)),
        "sydney" => Box::new(SydneyImporter::new(
            client,
            config.fetch.clone(),
            config.base_year,
            config.sydney_bearer_token.clone(),
        )),
        "western-australia" => Box::new(WesternAustraliaImporter::new(client)),
        other => {
            return Err(ImportError::Config(format!(
                "unknown university '{}', expected one of: {}",
                other,
                IMPORTER_SLUGS.join(", ")
            )));
        }
    };
    Ok(importer)
}

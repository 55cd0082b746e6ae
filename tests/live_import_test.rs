use std::sync::Arc;

use catalogue_importer::client::{CatalogueClient, HttpCatalogueClient};
use catalogue_importer::config::ImportConfig;
use catalogue_importer::db;
use catalogue_importer::importers::importer_for;
use catalogue_importer::services::ImportService;

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored --test-threads=1
async fn test_live_import_from_anu() {
    dotenvy::dotenv().ok();

    let config = ImportConfig::new_from_env().expect("Failed to load import config");
    let client: Arc<dyn CatalogueClient> =
        Arc::new(HttpCatalogueClient::new(&config).expect("Failed to create HTTP client"));
    let pool = db::connect_in_memory().await.expect("Failed to create database");

    let importer = importer_for("anu", client, &config).expect("anu importer");
    let stats = ImportService::new(pool)
        .run(importer.as_ref())
        .await
        .expect("live import failed");

    println!("Imported: {:?}", stats);
    assert!(stats.units_fetched > 0);
    assert!(stats.units_upserted > 0);
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;

use catalogue_importer::cache::{CachedImporter, MemoryUnitCache, UnitCache};
use catalogue_importer::client::{CatalogueClient, FixtureClient, UpstreamResponse};
use catalogue_importer::config::ImportConfig;
use catalogue_importer::db::{self, repository};
use catalogue_importer::db::repository::Dimension;
use catalogue_importer::error::ImportError;
use catalogue_importer::importers::{importer_for, Importer};
use catalogue_importer::models::{ImportUnit, Offering, UniversityInfo};
use catalogue_importer::services::ImportService;

/// Returns a fixed unit list and counts how often it was asked.
struct StaticImporter {
    info: UniversityInfo,
    units: Vec<ImportUnit>,
    calls: Arc<AtomicUsize>,
}

impl StaticImporter {
    fn new(name: &str, units: Vec<ImportUnit>) -> Self {
        Self {
            info: UniversityInfo::new(name, "https://handbook.example.edu/units/"),
            units,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Importer for StaticImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.units.clone())
    }
}

fn unit(code: &str, name: &str, offerings: &[(&str, &str)]) -> ImportUnit {
    ImportUnit {
        code: code.to_string(),
        name: name.to_string(),
        level: "1".to_string(),
        credit_points: 6.0,
        faculty_name: "Faculty of Science".to_string(),
        offerings: offerings
            .iter()
            .map(|(location, period)| Offering::new(*location, *period))
            .collect(),
    }
}

async fn setup_test_db() -> SqlitePool {
    db::connect_in_memory().await.expect("Failed to create test db")
}

async fn university_id(pool: &SqlitePool, name: &str) -> i64 {
    repository::find_university_by_name(pool, name)
        .await
        .expect("query university")
        .expect("university missing")
        .id
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let pool = setup_test_db().await;
    let service = ImportService::new(pool.clone());
    let importer = StaticImporter::new(
        "Monash University",
        vec![
            unit("FIT1008", "Introduction to Computer Science", &[("Clayton", "S1-01"), ("Malaysia", "S2-01")]),
            unit("FIT2004", "Algorithms and Data Structures", &[("Clayton", "S2-01")]),
        ],
    );

    let first = service.run(&importer).await.expect("first import");
    let second = service.run(&importer).await.expect("second import");
    assert_eq!(first, second);

    let id = university_id(&pool, "Monash University").await;
    let units = repository::fetch_units(&pool, id).await.unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(repository::fetch_dimension(&pool, Dimension::Campus, id).await.unwrap().len(), 2);
    assert_eq!(repository::fetch_dimension(&pool, Dimension::Semester, id).await.unwrap().len(), 2);
    assert_eq!(repository::fetch_dimension(&pool, Dimension::Faculty, id).await.unwrap().len(), 1);

    let fit1008 = units.iter().find(|u| u.code == "FIT1008").expect("FIT1008");
    assert_eq!(repository::fetch_unit_campuses(&pool, fit1008.id).await.unwrap().len(), 2);
    assert_eq!(repository::fetch_unit_semesters(&pool, fit1008.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_offerings_are_replaced_not_merged() {
    let pool = setup_test_db().await;
    let service = ImportService::new(pool.clone());

    let before = StaticImporter::new("Monash University", vec![unit("FIT1045", "Introduction to Programming", &[("CampusA", "Sem1")])]);
    service.run(&before).await.expect("first import");

    let after = StaticImporter::new("Monash University", vec![unit("FIT1045", "Introduction to Programming", &[("CampusB", "Sem2")])]);
    service.run(&after).await.expect("second import");

    let id = university_id(&pool, "Monash University").await;
    let stored = repository::find_unit(&pool, id, "FIT1045").await.unwrap().expect("unit missing");

    let campuses = repository::fetch_unit_campuses(&pool, stored.id).await.unwrap();
    let semesters = repository::fetch_unit_semesters(&pool, stored.id).await.unwrap();
    assert_eq!(campuses.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["CampusB"]);
    assert_eq!(semesters.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["Sem2"]);

    // The old labels stay in the dimension tables, only the links go.
    let all_campuses = repository::fetch_dimension(&pool, Dimension::Campus, id).await.unwrap();
    assert_eq!(all_campuses.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["CampusA", "CampusB"]);
    assert_eq!(repository::fetch_dimension(&pool, Dimension::Semester, id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_same_code_at_two_universities() {
    let pool = setup_test_db().await;
    let service = ImportService::new(pool.clone());

    let a = StaticImporter::new("University A", vec![unit("COMP101", "Programming A", &[("Main", "Semester 1")])]);
    let b = StaticImporter::new("University B", vec![unit("COMP101", "Programming B", &[("Main", "Semester 1")])]);
    service.run(&a).await.expect("import A");
    service.run(&b).await.expect("import B");

    let id_a = university_id(&pool, "University A").await;
    let id_b = university_id(&pool, "University B").await;
    assert_ne!(id_a, id_b);

    let unit_a = repository::find_unit(&pool, id_a, "COMP101").await.unwrap().expect("A missing");
    let unit_b = repository::find_unit(&pool, id_b, "COMP101").await.unwrap().expect("B missing");
    assert_ne!(unit_a.id, unit_b.id);
    assert_eq!(unit_a.name, "Programming A");
    assert_eq!(unit_b.name, "Programming B");

    // Same campus label, but scoped per university.
    let campus_a = repository::fetch_unit_campuses(&pool, unit_a.id).await.unwrap();
    let campus_b = repository::fetch_unit_campuses(&pool, unit_b.id).await.unwrap();
    assert_ne!(campus_a[0].id, campus_b[0].id);
}

#[tokio::test]
async fn test_unrepresentable_credit_points_use_sentinel() {
    let pool = setup_test_db().await;
    let service = ImportService::new(pool.clone());

    let mut broken = unit("MATH1001", "Calculus", &[("Camperdown", "Semester 1")]);
    broken.credit_points = f64::NAN;
    service
        .run(&StaticImporter::new("University of Sydney", vec![broken]))
        .await
        .expect("import");

    let id = university_id(&pool, "University of Sydney").await;
    let stored = repository::find_unit(&pool, id, "MATH1001").await.unwrap().expect("unit missing");
    assert_eq!(stored.credit_points, -1.0);
}

#[tokio::test]
async fn test_unoffered_and_nameless_units_are_skipped() {
    let pool = setup_test_db().await;
    let service = ImportService::new(pool.clone());

    let importer = StaticImporter::new(
        "University of Queensland",
        vec![
            unit("CSSE1001", "Introduction to Software Engineering", &[("St Lucia", "Semester 1, 2025")]),
            unit("CSSE9999", "Retired Course", &[]),
            unit("CSSE0000", "", &[("St Lucia", "Semester 2, 2025")]),
        ],
    );

    let stats = service.run(&importer).await.expect("import");
    assert_eq!(stats.units_upserted, 1);
    assert_eq!(stats.units_skipped, 2);

    let id = university_id(&pool, "University of Queensland").await;
    let units = repository::fetch_units(&pool, id).await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].code, "CSSE1001");
}

#[tokio::test]
async fn test_bulk_adapter_end_to_end() {
    let pool = setup_test_db().await;
    let service = ImportService::new(pool.clone());

    let body = json!({ "Items": [
        { "CourseCode": "COMP1100", "Name": "Programming as Problem Solving", "Session": "First Semester/Second Semester", "Units": 6, "ModeOfDelivery": "In Person" },
        { "CourseCode": "COMP8830", "Name": "Research Project", "Session": "", "Units": 12, "ModeOfDelivery": "In Person" }
    ] });
    let client: Arc<dyn CatalogueClient> =
        Arc::new(FixtureClient::new().respond("GetCourses", UpstreamResponse::ok(body.to_string())));
    let importer = importer_for("anu", client, &ImportConfig::default()).expect("anu importer");

    let stats = service.run(importer.as_ref()).await.expect("import");

    assert_eq!(stats.university, "Australian National University");
    assert_eq!(stats.units_fetched, 2);
    assert_eq!(stats.units_upserted, 1);
    assert_eq!(stats.semester_links, 2);

    let id = university_id(&pool, "Australian National University").await;
    let stored = repository::find_unit(&pool, id, "COMP1100").await.unwrap().expect("unit missing");
    assert_eq!(stored.level, "NA");
    assert_eq!(stored.credit_points, 6.0);
}

#[tokio::test]
async fn test_cached_run_skips_the_adapter() {
    let pool = setup_test_db().await;
    let service = ImportService::new(pool.clone());
    let cache: Arc<dyn UnitCache> = Arc::new(MemoryUnitCache::new());

    let inner = StaticImporter::new("University of Adelaide", vec![unit("COMP SCI 1102", "Object Oriented Programming", &[("North Terrace", "Semester 1")])]);
    let calls = inner.calls.clone();
    let importer = CachedImporter::new(Box::new(inner), cache.clone());

    let first = service.run(&importer).await.expect("first import");
    let second = service.run(&importer).await.expect("second import");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
    assert!(cache.has("university-of-adelaide").await.unwrap());
}

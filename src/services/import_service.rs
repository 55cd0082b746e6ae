use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::repository::{self, Dimension, UnitRecord};
use crate::error::ImportError;
use crate::importers::Importer;
use crate::models::{ImportUnit, UniversityInfo};

/// Writes adapter output into the catalogue tables.
pub struct ImportService {
    db: SqlitePool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ImportStats {
    pub university: String,
    pub units_fetched: usize,
    pub units_upserted: usize,
    pub units_skipped: usize,
    pub campuses: usize,
    pub semesters: usize,
    pub faculties: usize,
    pub campus_links: usize,
    pub semester_links: usize,
}

impl ImportService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Runs one importer end to end. Adapter failures abort before anything
    /// is written.
    pub async fn run(&self, importer: &dyn Importer) -> Result<ImportStats, ImportError> {
        let info = importer.info();
        info!(university = %info.name, "Starting import...");

        let units = importer.get_units().await?;
        info!(university = %info.name, count = units.len(), "Fetched units, reconciling");

        self.reconcile(info, &units).await
    }

    pub async fn reconcile(&self, info: &UniversityInfo, units: &[ImportUnit]) -> Result<ImportStats, ImportError> {
        let mut stats = ImportStats {
            university: info.name.clone(),
            units_fetched: units.len(),
            ..ImportStats::default()
        };

        info!(university = %info.name, "Step 1: Upserting university");
        let university_id = repository::upsert_university(&self.db, info).await?;

        info!(university = %info.name, "Step 2: Upserting campuses, semesters and faculties");
        let campuses = self
            .upsert_labels(
                Dimension::Campus,
                units.iter().flat_map(|u| u.offerings.iter().map(|o| o.location.as_str())),
                university_id,
            )
            .await?;
        let semesters = self
            .upsert_labels(
                Dimension::Semester,
                units.iter().flat_map(|u| u.offerings.iter().map(|o| o.period.as_str())),
                university_id,
            )
            .await?;
        let faculties = self
            .upsert_labels(
                Dimension::Faculty,
                units.iter().map(|u| u.faculty_name.as_str()),
                university_id,
            )
            .await?;
        stats.campuses = campuses.len();
        stats.semesters = semesters.len();
        stats.faculties = faculties.len();

        info!(university = %info.name, "Step 3: Upserting units");
        for unit in units {
            if !unit.has_identity() {
                warn!(university = %info.name, code = %unit.code, "Skipping unit without code or name");
                stats.units_skipped += 1;
                continue;
            }
            if !unit.is_offered() {
                warn!(university = %info.name, code = %unit.code, "Skipping unit with no offerings");
                stats.units_skipped += 1;
                continue;
            }

            let campus_ids: BTreeSet<i64> = unit
                .offerings
                .iter()
                .filter_map(|o| campuses.get(o.location.as_str()).copied())
                .collect();
            let semester_ids: BTreeSet<i64> = unit
                .offerings
                .iter()
                .filter_map(|o| semesters.get(o.period.as_str()).copied())
                .collect();
            let campus_ids: Vec<i64> = campus_ids.into_iter().collect();
            let semester_ids: Vec<i64> = semester_ids.into_iter().collect();

            let record = UnitRecord {
                code: &unit.code,
                name: &unit.name,
                level: &unit.level,
                credit_points: unit.storable_credit_points(),
                faculty_id: faculties.get(unit.faculty_name.as_str()).copied(),
                university_id,
            };

            let mut tx = self.db.begin().await?;
            let unit_id = repository::upsert_unit(&mut *tx, &record).await?;
            repository::replace_unit_offerings(&mut *tx, unit_id, &campus_ids, &semester_ids).await?;
            tx.commit().await?;

            debug!(code = %unit.code, unit_id, campuses = campus_ids.len(), semesters = semester_ids.len(), "Unit stored");
            stats.units_upserted += 1;
            stats.campus_links += campus_ids.len();
            stats.semester_links += semester_ids.len();
        }

        info!(
            university = %info.name,
            upserted = stats.units_upserted,
            skipped = stats.units_skipped,
            "Import completed successfully"
        );
        Ok(stats)
    }

    async fn upsert_labels<'a>(
        &self,
        dimension: Dimension,
        labels: impl Iterator<Item = &'a str>,
        university_id: i64,
    ) -> Result<HashMap<&'a str, i64>, ImportError> {
        let distinct: BTreeSet<&str> = labels.filter(|label| !label.trim().is_empty()).collect();

        let mut ids = HashMap::with_capacity(distinct.len());
        for label in distinct {
            let id = repository::upsert_dimension(&self.db, dimension, label, university_id).await?;
            ids.insert(label, id);
        }
        Ok(ids)
    }
}

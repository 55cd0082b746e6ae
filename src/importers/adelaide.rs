use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::client::CatalogueClient;
use crate::error::ImportError;
use crate::importers::Importer;
use crate::importers::normalize::{credit_points_or, label_or, non_empty, typed_rows, NOT_AVAILABLE, UNKNOWN_LABEL};
use crate::models::{ImportUnit, Offering, UniversityInfo};

const ADELAIDE_API_URL: &str = "https://courseplanner-api.adelaide.edu.au/api/course-planner-query/v1/";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    query: QueryRows,
}

#[derive(Debug, Deserialize)]
struct QueryRows {
    #[serde(default)]
    rows: Vec<Value>,
}

/// One row per class offering; a course appears once per term and campus.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct CourseRow {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    catalog_nbr: Option<String>,
    #[serde(default)]
    course_title: Option<String>,
    #[serde(default)]
    units: Option<Value>,
    #[serde(default)]
    campus: Option<String>,
    #[serde(default)]
    term_descr: Option<String>,
}

impl CourseRow {
    fn course_code(&self) -> Option<String> {
        let subject = non_empty(self.subject.as_deref()?)?;
        let number = non_empty(self.catalog_nbr.as_deref()?)?;
        Some(format!("{} {}", subject, number))
    }
}

pub struct AdelaideImporter {
    info: UniversityInfo,
    client: Arc<dyn CatalogueClient>,
    year: i32,
}

impl AdelaideImporter {
    pub fn new(client: Arc<dyn CatalogueClient>, year: i32) -> Self {
        Self {
            info: UniversityInfo::new("University of Adelaide", "https://www.adelaide.edu.au/course-outlines/"),
            client,
            year,
        }
    }
}

/// Folds offering rows into one unit per `SUBJECT CATALOG_NBR`, keeping the
/// order in which courses first appear.
fn group_rows(rows: Vec<CourseRow>) -> Vec<ImportUnit> {
    let mut units: Vec<ImportUnit> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some(code) = row.course_code() else {
            continue;
        };
        let offering = Offering::new(
            label_or(row.campus.as_deref(), UNKNOWN_LABEL),
            label_or(row.term_descr.as_deref(), UNKNOWN_LABEL),
        );

        match positions.get(&code) {
            Some(&position) => units[position].offerings.push(offering),
            None => {
                positions.insert(code.clone(), units.len());
                units.push(ImportUnit {
                    code,
                    name: row.course_title.as_deref().map(str::trim).unwrap_or_default().to_string(),
                    level: NOT_AVAILABLE.to_string(),
                    credit_points: credit_points_or(row.units.as_ref(), 0.0),
                    faculty_name: NOT_AVAILABLE.to_string(),
                    offerings: vec![offering],
                });
            }
        }
    }

    units
}

#[async_trait]
impl Importer for AdelaideImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        info!(university = %self.info.name, "Starting unit import process");

        let url = format!(
            "{}?target=/system/COURSE_SEARCH/queryx&virtual=Y&year={}&course_title=&pagenbr=1&pagesize=10000",
            ADELAIDE_API_URL, self.year
        );
        let response = self
            .client
            .get(&url, &[("Content-Type", "application/json")])
            .await
            .map_err(|e| ImportError::IndexUnavailable(format!("course search: {}", e)))?;
        if !response.is_success() {
            return Err(ImportError::IndexUnavailable(format!(
                "course search returned {}",
                response.status
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .map_err(|e| ImportError::IndexUnavailable(format!("malformed course search: {}", e)))?;
        let row_count = parsed.data.query.rows.len();
        let units = group_rows(typed_rows(parsed.data.query.rows, &self.info.name));

        info!(university = %self.info.name, rows = row_count, total = units.len(), "Import process completed");
        Ok(units)
    }
}

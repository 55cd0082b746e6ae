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

const UNSW_API_URL: &str = "https://courseoutlines.unsw.edu.au/v1/publicsitecourseoutlines/search";

#[derive(Debug, Deserialize)]
struct OutlineSearch {
    response: OutlineResults,
}

#[derive(Debug, Deserialize)]
struct OutlineResults {
    #[serde(default)]
    results: Vec<Value>,
}

/// One course outline per course, term and location.
#[derive(Debug, Deserialize)]
struct CourseOutline {
    #[serde(rename = "integrat_coursecode", default)]
    code: Option<String>,
    #[serde(rename = "integrat_coursename", default)]
    name: Option<String>,
    #[serde(rename = "integrat_unitsofcredit", default)]
    units_of_credit: Option<Value>,
    #[serde(rename = "integrat_owningacademicunit", default)]
    owning_unit: Option<String>,
    #[serde(rename = "integrat_location", default)]
    location: Option<String>,
    #[serde(rename = "integrat_term", default)]
    term: Option<String>,
}

pub struct UnswImporter {
    info: UniversityInfo,
    client: Arc<dyn CatalogueClient>,
    year: i32,
}

impl UnswImporter {
    pub fn new(client: Arc<dyn CatalogueClient>, year: i32) -> Self {
        Self {
            info: UniversityInfo::new(
                "University of New South Wales",
                format!("https://www.handbook.unsw.edu.au/undergraduate/courses/{}/", year),
            ),
            client,
            year,
        }
    }
}

fn merge_outlines(outlines: Vec<CourseOutline>) -> Vec<ImportUnit> {
    let mut units: Vec<ImportUnit> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for outline in outlines {
        let Some(code) = outline.code.as_deref().and_then(non_empty) else {
            continue;
        };
        let offering = Offering::new(
            label_or(outline.location.as_deref(), UNKNOWN_LABEL),
            label_or(outline.term.as_deref(), UNKNOWN_LABEL),
        );

        match positions.get(&code) {
            Some(&position) => {
                let offerings = &mut units[position].offerings;
                if !offerings.contains(&offering) {
                    offerings.push(offering);
                }
            }
            None => {
                positions.insert(code.clone(), units.len());
                units.push(ImportUnit {
                    code,
                    name: outline.name.as_deref().map(str::trim).unwrap_or_default().to_string(),
                    level: NOT_AVAILABLE.to_string(),
                    credit_points: credit_points_or(outline.units_of_credit.as_ref(), 0.0),
                    faculty_name: label_or(outline.owning_unit.as_deref(), NOT_AVAILABLE),
                    offerings: vec![offering],
                });
            }
        }
    }

    units
}

#[async_trait]
impl Importer for UnswImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        info!(university = %self.info.name, "Starting unit import process");

        let url = format!("{}?pageNumber=1&top=10000&year={}", UNSW_API_URL, self.year);
        let response = self
            .client
            .get(&url, &[("Content-Type", "application/json")])
            .await
            .map_err(|e| ImportError::IndexUnavailable(format!("course outline search: {}", e)))?;
        if !response.is_success() {
            return Err(ImportError::IndexUnavailable(format!(
                "course outline search returned {}",
                response.status
            )));
        }

        let search: OutlineSearch = response
            .json()
            .map_err(|e| ImportError::IndexUnavailable(format!("malformed course outline search: {}", e)))?;
        let units = merge_outlines(typed_rows(search.response.results, &self.info.name));

        info!(university = %self.info.name, total = units.len(), "Import process completed");
        Ok(units)
    }
}

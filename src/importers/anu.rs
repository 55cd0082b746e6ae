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

const ANU_API_URL: &str = "https://programsandcourses.anu.edu.au/data/CourseSearch/GetCourses";

#[derive(Debug, Deserialize)]
struct CourseSearch {
    #[serde(rename = "Items", default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AnuCourse {
    #[serde(default)]
    course_code: Option<String>,
    #[serde(default)]
    name: Option<String>,
    /// Slash-separated list of sessions, e.g. "First Semester/Second Semester".
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    units: Option<Value>,
    #[serde(default)]
    mode_of_delivery: Option<String>,
}

impl AnuCourse {
    fn into_unit(self) -> Option<ImportUnit> {
        let code = non_empty(self.course_code.as_deref()?)?;
        let location = label_or(self.mode_of_delivery.as_deref(), UNKNOWN_LABEL);
        let offerings = self
            .session
            .as_deref()
            .unwrap_or_default()
            .split('/')
            .filter_map(non_empty)
            .map(|period| Offering::new(location.clone(), period))
            .collect();

        Some(ImportUnit {
            code,
            name: self.name.as_deref().map(str::trim).unwrap_or_default().to_string(),
            level: NOT_AVAILABLE.to_string(),
            credit_points: credit_points_or(self.units.as_ref(), 0.0),
            faculty_name: NOT_AVAILABLE.to_string(),
            offerings,
        })
    }
}

pub struct AnuImporter {
    info: UniversityInfo,
    client: Arc<dyn CatalogueClient>,
}

impl AnuImporter {
    pub fn new(client: Arc<dyn CatalogueClient>) -> Self {
        Self {
            info: UniversityInfo::new(
                "Australian National University",
                "https://programsandcourses.anu.edu.au/course/",
            ),
            client,
        }
    }
}

#[async_trait]
impl Importer for AnuImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        info!(university = %self.info.name, "Starting unit import process");

        let url = format!("{}?ShowAll=true&PageIndex=0&MaxPageSize=10&PageSize=Infinity", ANU_API_URL);
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

        let search: CourseSearch = response
            .json()
            .map_err(|e| ImportError::IndexUnavailable(format!("malformed course search: {}", e)))?;
        let units: Vec<ImportUnit> = typed_rows(search.items, &self.info.name)
            .into_iter()
            .filter_map(AnuCourse::into_unit)
            .collect();

        info!(university = %self.info.name, total = units.len(), "Import process completed");
        Ok(units)
    }
}

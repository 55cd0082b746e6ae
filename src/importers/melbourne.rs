use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::CatalogueClient;
use crate::config::FetchConfig;
use crate::error::ImportError;
use crate::importers::Importer;
use crate::importers::normalize::{credit_points_or, label_or, str_from_value, NOT_AVAILABLE, UNKNOWN_LABEL};
use crate::models::{ImportUnit, Offering, UniversityInfo};
use crate::services::fetch_engine::{BatchFetcher, FetchOutcome};

const COURSE_PLANNER_API_URL: &str = "https://course-planner.unimelb.edu.au/apis/v1";
const SUBJECT_PAGE_SIZE: usize = 2000;

#[derive(Debug, Deserialize)]
struct PlanCreationConfig {
    #[serde(default)]
    courses: Vec<PlanCourse>,
}

#[derive(Debug, Deserialize)]
struct PlanCourse {
    code: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SubjectSearch {
    #[serde(default)]
    results: Vec<Subject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subject {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    points: Option<Value>,
    #[serde(default)]
    level: Option<Value>,
    #[serde(default)]
    area_of_study: Vec<AreaOfStudy>,
    #[serde(default)]
    availability: Option<Vec<Availability>>,
}

#[derive(Debug, Deserialize)]
struct AreaOfStudy {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Availability {
    #[serde(default)]
    campus: Option<String>,
    #[serde(default)]
    study_period: Option<String>,
}

impl Subject {
    fn into_unit(self) -> Option<ImportUnit> {
        let code = self.code.as_deref().map(str::trim).filter(|c| !c.is_empty())?.to_string();
        let name = self.name.as_deref().map(str::trim).unwrap_or_default().to_string();

        let offerings = self
            .availability
            .unwrap_or_default()
            .into_iter()
            .map(|slot| {
                Offering::new(
                    label_or(slot.campus.as_deref(), UNKNOWN_LABEL),
                    label_or(slot.study_period.as_deref(), UNKNOWN_LABEL),
                )
            })
            .collect();

        Some(ImportUnit {
            code,
            name,
            level: str_from_value(self.level.as_ref()).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            credit_points: credit_points_or(self.points.as_ref(), 0.0),
            faculty_name: label_or(
                self.area_of_study.first().and_then(|area| area.description.as_deref()),
                UNKNOWN_LABEL,
            ),
            offerings,
        })
    }
}

/// Reads the Course Planner: one bulk call lists every course, then the
/// subjects of each course are queried separately.
pub struct MelbourneImporter {
    info: UniversityInfo,
    client: Arc<dyn CatalogueClient>,
    fetcher: BatchFetcher,
    year: i32,
    user_id: String,
}

impl MelbourneImporter {
    pub fn new(client: Arc<dyn CatalogueClient>, fetch: FetchConfig, year: i32, user_id: String) -> Self {
        Self {
            info: UniversityInfo::new("University of Melbourne", "https://handbook.unimelb.edu.au/subjects/"),
            client,
            fetcher: BatchFetcher::new(fetch),
            year,
            user_id,
        }
    }

    fn subject_url(&self, course_code: &str) -> String {
        let query = json!({
            "text": "",
            "level": [],
            "studyPeriod": [],
            "areaOfStudy": [],
            "courseRecordIds": [],
            "onlyBreadth": false,
            "onlyDiscipline": true,
            "satisfyRequisites": false,
            "points": ["6.25", "12.5", "18.75", "25"],
            "courseCodes": [course_code],
            "courseEffectiveYear": self.year,
        });
        let sort = json!({ "code": "ASC" });
        let paging = json!({ "page": 0, "pageSize": SUBJECT_PAGE_SIZE });

        format!(
            "{}/subject?year={}&query={}&sort={}&paging={}",
            COURSE_PLANNER_API_URL,
            self.year,
            encode(&query),
            encode(&sort),
            encode(&paging)
        )
    }

    async fn fetch_courses(&self) -> Result<Vec<PlanCourse>, ImportError> {
        let url = format!("{}/planCreationConfig", COURSE_PLANNER_API_URL);
        let response = self
            .client
            .get(&url, &[("x-user-id", self.user_id.as_str())])
            .await
            .map_err(|e| ImportError::IndexUnavailable(format!("plan creation config: {}", e)))?;

        if !response.is_success() {
            return Err(ImportError::IndexUnavailable(format!(
                "plan creation config returned {}",
                response.status
            )));
        }

        let config: PlanCreationConfig = response
            .json()
            .map_err(|e| ImportError::IndexUnavailable(format!("malformed plan creation config: {}", e)))?;
        Ok(config.courses)
    }

    async fn fetch_course_subjects(&self, course_code: String) -> Result<FetchOutcome<Vec<ImportUnit>>, ImportError> {
        let url = self.subject_url(&course_code);
        let response = self
            .client
            .get(&url, &[("x-user-id", self.user_id.as_str())])
            .await?;

        if !response.is_success() {
            return Err(ImportError::Upstream {
                status: response.status,
                url,
            });
        }

        let search: SubjectSearch = response.json()?;
        let units: Vec<ImportUnit> = search.results.into_iter().filter_map(Subject::into_unit).collect();
        info!(course = %course_code, count = units.len(), "Found units for course");
        Ok(FetchOutcome::Found(units))
    }
}

fn encode(value: &Value) -> String {
    url::form_urlencoded::byte_serialize(value.to_string().as_bytes()).collect()
}

#[async_trait]
impl Importer for MelbourneImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        info!(university = %self.info.name, "Starting unit import process");
        if self.user_id.is_empty() {
            warn!(university = %self.info.name, "MELBOURNE_USER_ID is not set, requests may be rejected");
        }

        let courses = self.fetch_courses().await?;
        info!(university = %self.info.name, count = courses.len(), "Found course IDs to process");
        for course in courses.iter().filter(|course| course.name.is_empty()) {
            warn!(course = %course.code, "Course has no name");
        }

        let codes: Vec<String> = courses.into_iter().map(|course| course.code).collect();
        let per_course = self
            .fetcher
            .fetch_all(&codes, |code| self.fetch_course_subjects(code))
            .await?;

        // The same subject is listed under every course that offers it.
        let mut seen = HashSet::new();
        let units: Vec<ImportUnit> = per_course
            .into_iter()
            .flatten()
            .filter(|unit| seen.insert(unit.code.clone()))
            .collect();

        info!(university = %self.info.name, total = units.len(), "Import process completed");
        Ok(units)
    }
}

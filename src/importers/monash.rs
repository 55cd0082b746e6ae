use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{CatalogueClient, UpstreamResponse};
use crate::config::FetchConfig;
use crate::error::ImportError;
use crate::importers::Importer;
use crate::importers::normalize::{credit_points_or, label_or, number_from_value, UNKNOWN_LABEL};
use crate::models::{ImportUnit, Offering, UniversityInfo};
use crate::services::fetch_engine::{BatchFetcher, FetchOutcome};

const COURSELOOP_API_URL: &str = "https://api-ap-southeast-2.prod.courseloop.com/publisher/search-all";
const COURSELOOP_SITE_ID: &str = "monash-prod-pres";
const COURSELOOP_PAGE_SIZE: usize = 100;
const HANDBOOK_API_URL: &str = "https://handbook.monash.edu/_next/data";
const HANDBOOK_BUILD_ID: &str = "x72Bg6G_Gp9JqA01tHcsD";
const DEFAULT_CREDIT_POINTS: f64 = 6.0;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    total: usize,
}

/// Codes found in the CourseLoop index, split by content type.
#[derive(Debug, Default)]
pub struct CourseIndex {
    pub unit_codes: Vec<String>,
    pub areas_of_study: Vec<String>,
    pub courses: Vec<String>,
}

impl CourseIndex {
    fn add(&mut self, result: &Value) {
        let (Some(uri), Some(code)) = (
            result.get("uri").and_then(Value::as_str),
            result.get("code").and_then(Value::as_str),
        ) else {
            return;
        };
        let code = code.trim().to_string();
        if code.is_empty() {
            return;
        }
        match uri.split('/').nth(2) {
            Some("units") => self.unit_codes.push(code),
            Some("aos") => self.areas_of_study.push(code),
            Some("courses") => self.courses.push(code),
            _ => {}
        }
    }
}

pub struct MonashImporter {
    info: UniversityInfo,
    client: Arc<dyn CatalogueClient>,
    fetcher: BatchFetcher,
}

impl MonashImporter {
    pub fn new(client: Arc<dyn CatalogueClient>, fetch: FetchConfig) -> Self {
        Self {
            info: UniversityInfo::new("Monash University", "https://handbook.monash.edu/current/units/"),
            client,
            fetcher: BatchFetcher::new(fetch),
        }
    }

    pub async fn fetch_index(&self) -> Result<CourseIndex, ImportError> {
        info!(university = %self.info.name, "Fetching unit index from CourseLoop");
        let mut index = CourseIndex::default();
        let mut start = 0;

        loop {
            let url = format!(
                "{}?from={}&query=&searchType=advanced&siteId={}&siteYear=current&size={}",
                COURSELOOP_API_URL, start, COURSELOOP_SITE_ID, COURSELOOP_PAGE_SIZE
            );
            debug!(start, "Fetching index page");

            let response = self.client.get(&url, &[]).await.map_err(|e| {
                ImportError::IndexUnavailable(format!("index page at {}: {}", start, e))
            })?;
            if !response.is_success() {
                return Err(ImportError::IndexUnavailable(format!(
                    "index page at {} returned {}",
                    start, response.status
                )));
            }
            let page: SearchPage = response.json().map_err(|e| {
                ImportError::IndexUnavailable(format!("malformed index page at {}: {}", start, e))
            })?;

            let data = page.data.unwrap_or_default();
            for result in &data.results {
                index.add(result);
            }

            start += COURSELOOP_PAGE_SIZE;
            if start >= data.total {
                break;
            }
        }

        let mut seen = HashSet::new();
        index.unit_codes.retain(|code| seen.insert(code.clone()));

        info!(
            units = index.unit_codes.len(),
            areas_of_study = index.areas_of_study.len(),
            courses = index.courses.len(),
            "Index fetch completed"
        );
        Ok(index)
    }

    async fn fetch_unit(&self, code: String) -> Result<FetchOutcome<ImportUnit>, ImportError> {
        let url = format!(
            "{}/{}/current/units/{}.json?year=current&catchAll=current&catchAll=units&catchAll={}",
            HANDBOOK_API_URL, HANDBOOK_BUILD_ID, code, code
        );
        let response = self.client.get(&url, &[]).await?;

        // CourseLoop answers rate limiting with 403 Forbidden, never 429.
        if looks_throttled(&response) {
            return Ok(FetchOutcome::Throttled);
        }
        if response.status == 404 {
            return Ok(FetchOutcome::Missing);
        }
        if !response.is_success() {
            return Err(ImportError::Upstream {
                status: response.status,
                url,
            });
        }

        let data: Value = response.json()?;
        match data.pointer("/pageProps/pageContent").and_then(parse_unit) {
            Some(unit) => {
                debug!(code = %unit.code, name = %unit.name, "Fetched unit");
                Ok(FetchOutcome::Found(unit))
            }
            None => Ok(FetchOutcome::Missing),
        }
    }
}

fn looks_throttled(response: &UpstreamResponse) -> bool {
    if response.status == 403 {
        return true;
    }
    serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|body| body.get("status").and_then(Value::as_u64))
        == Some(403)
}

fn parse_unit(content: &Value) -> Option<ImportUnit> {
    let code = content.get("code")?.as_str()?.trim().to_string();
    let name = content.get("title")?.as_str()?.trim().to_string();

    // Handbook levels are 1-based and never above 9.
    let level = content
        .pointer("/level/value")
        .and_then(number_from_value)
        .map(f64::trunc)
        .filter(|level| (1.0..=9.0).contains(level))
        .map(|level| (level as i64 - 1).to_string())
        .unwrap_or_else(|| "0".to_string());

    let offerings = content
        .get("unit_offering")
        .and_then(Value::as_array)
        .map(|offerings| {
            offerings
                .iter()
                .map(|offering| {
                    Offering::new(
                        label_or(offering.pointer("/location/value").and_then(Value::as_str), UNKNOWN_LABEL),
                        label_or(
                            offering.pointer("/teaching_period/value").and_then(Value::as_str),
                            UNKNOWN_LABEL,
                        ),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ImportUnit {
        code,
        name,
        level,
        credit_points: credit_points_or(content.get("credit_points"), DEFAULT_CREDIT_POINTS),
        faculty_name: label_or(content.pointer("/school/value").and_then(Value::as_str), UNKNOWN_LABEL),
        offerings,
    })
}

#[async_trait]
impl Importer for MonashImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        let index = self.fetch_index().await?;
        info!(
            university = %self.info.name,
            count = index.unit_codes.len(),
            "Found unit codes to process"
        );

        let units = self
            .fetcher
            .fetch_all(&index.unit_codes, |code| self.fetch_unit(code))
            .await?;

        if units.len() < index.unit_codes.len() {
            warn!(
                university = %self.info.name,
                missing = index.unit_codes.len() - units.len(),
                "Some units could not be fetched"
            );
        }
        info!(university = %self.info.name, total = units.len(), "Import process completed");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::client::FixtureClient;

    fn fast_fetch() -> FetchConfig {
        FetchConfig {
            batch_size: 2,
            inter_batch_delay: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_throttle_retries: 3,
        }
    }

    fn index_page(codes: &[&str], total: usize) -> UpstreamResponse {
        let results: Vec<Value> = codes
            .iter()
            .map(|code| json!({ "uri": format!("/current/units/{}", code), "code": code }))
            .collect();
        UpstreamResponse::ok(json!({ "data": { "results": results, "total": total } }).to_string())
    }

    fn unit_page(code: &str, level: &str, credit_points: Value) -> UpstreamResponse {
        UpstreamResponse::ok(
            json!({
                "pageProps": {
                    "pageContent": {
                        "code": format!(" {} ", code),
                        "title": "Algorithms and Data Structures ",
                        "level": { "value": level },
                        "credit_points": credit_points,
                        "school": { "value": "Faculty of Information Technology" },
                        "unit_offering": [
                            { "location": { "value": "Clayton" }, "teaching_period": { "value": "First semester" } },
                            { "location": { "value": "Malaysia" }, "teaching_period": { "value": "Second semester" } }
                        ]
                    }
                }
            })
            .to_string(),
        )
    }

    #[test]
    fn test_parse_unit_decrements_level_and_trims() {
        let content = json!({
            "code": "FIT1008 ",
            "title": " Algorithms",
            "level": { "value": "1" },
            "credit_points": "6",
            "unit_offering": [{ "location": { "value": " Clayton " } }]
        });

        let unit = parse_unit(&content).expect("unit");
        assert_eq!(unit.code, "FIT1008");
        assert_eq!(unit.name, "Algorithms");
        assert_eq!(unit.level, "0");
        assert_eq!(unit.credit_points, 6.0);
        assert_eq!(unit.faculty_name, "Unknown");
        assert_eq!(unit.offerings, vec![Offering::new("Clayton", "Unknown")]);
    }

    #[test]
    fn test_parse_unit_uses_defaults_for_garbage() {
        let content = json!({
            "code": "FIT9999",
            "title": "Mystery",
            "level": { "value": "postgrad" },
            "credit_points": "lots",
        });

        let unit = parse_unit(&content).expect("unit");
        assert_eq!(unit.level, "0");
        assert_eq!(unit.credit_points, 6.0);
        assert!(unit.offerings.is_empty());
    }

    #[test]
    fn test_parse_unit_rejects_implausible_levels() {
        for value in [json!(-1e19), json!(1e300), json!(0), json!("12")] {
            let content = json!({ "code": "FIT1", "title": "X", "level": { "value": value } });
            let unit = parse_unit(&content).expect("unit");
            assert_eq!(unit.level, "0");
        }

        let content = json!({ "code": "FIT3", "title": "X", "level": { "value": 3.0 } });
        assert_eq!(parse_unit(&content).expect("unit").level, "2");
    }

    #[test]
    fn test_throttle_is_detected_from_body() {
        assert!(looks_throttled(&UpstreamResponse::new(403, "")));
        assert!(looks_throttled(&UpstreamResponse::ok(r#"{"status":403,"message":"Forbidden"}"#)));
        assert!(!looks_throttled(&UpstreamResponse::ok(r#"{"pageProps":{}}"#)));
    }

    #[tokio::test]
    async fn test_index_pages_until_total() {
        let client = Arc::new(
            FixtureClient::new()
                .respond("from=0&", index_page(&["FIT1008", "FIT2014"], 150))
                .respond("from=100&", index_page(&["FIT1008", "FIT3155"], 150)),
        );
        let importer = MonashImporter::new(client.clone(), fast_fetch());

        let index = importer.fetch_index().await.expect("index");
        assert_eq!(index.unit_codes, vec!["FIT1008", "FIT2014", "FIT3155"]);
        assert_eq!(client.request_count("search-all"), 2);
    }

    #[tokio::test]
    async fn test_unreachable_index_is_fatal() {
        let client = Arc::new(FixtureClient::new().respond("search-all", UpstreamResponse::new(502, "")));
        let importer = MonashImporter::new(client, fast_fetch());

        let result = importer.get_units().await;
        assert!(matches!(result, Err(ImportError::IndexUnavailable(_))));
    }

    #[tokio::test]
    async fn test_get_units_skips_failed_details() {
        let client = Arc::new(
            FixtureClient::new()
                .respond("search-all", index_page(&["FIT1008", "FIT2014", "FIT3155", "FIT9999", "FIT1045"], 5))
                .respond("units/FIT1008.json", unit_page("FIT1008", "1", json!(6)))
                .fail("units/FIT2014.json", "connection reset")
                .respond("units/FIT3155.json", UpstreamResponse::ok("<html>not json</html>"))
                .respond("units/FIT1045.json", UpstreamResponse::new(403, ""))
                .respond("units/FIT1045.json", unit_page("FIT1045", "1", json!("six"))),
        );
        let importer = MonashImporter::new(client.clone(), fast_fetch());

        let mut units = importer.get_units().await.expect("partial failures are not fatal");
        units.sort_by(|a, b| a.code.cmp(&b.code));

        let codes: Vec<&str> = units.iter().map(|u| u.code.as_str()).collect();
        assert_eq!(codes, vec!["FIT1008", "FIT1045"]);
        assert_eq!(units[1].credit_points, 6.0);
        assert_eq!(units[0].offerings.len(), 2);
        assert_eq!(client.request_count("units/FIT1045.json"), 2);
    }
}

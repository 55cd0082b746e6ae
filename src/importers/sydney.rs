use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::client::CatalogueClient;
use crate::config::FetchConfig;
use crate::error::ImportError;
use crate::importers::Importer;
use crate::importers::normalize::{element_text, first_text, leading_number, non_empty, selector, NOT_AVAILABLE};
use crate::models::{ImportUnit, Offering, UniversityInfo};
use crate::services::fetch_engine::{BatchFetcher, FetchOutcome};

const COVEO_API_URL: &str = "https://universityofsydneyproduction10somjans.org.coveo.com/rest/search/v2?organizationId=universityofsydneyproduction10somjans";
const UNITS_BASE_URL: &str = "https://www.sydney.edu.au/units/";
const SEARCH_PAGE_SIZE: usize = 10_000;

static UNIT_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/units/([A-Z]{4}\d{4})").expect("valid unit uri pattern"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    click_uri: Option<String>,
}

/// Discovers unit codes through the site search, then scrapes each unit page.
pub struct SydneyImporter {
    info: UniversityInfo,
    client: Arc<dyn CatalogueClient>,
    fetcher: BatchFetcher,
    year: i32,
    bearer_token: String,
}

impl SydneyImporter {
    pub fn new(client: Arc<dyn CatalogueClient>, fetch: FetchConfig, year: i32, bearer_token: String) -> Self {
        Self {
            info: UniversityInfo::new("University of Sydney", UNITS_BASE_URL),
            client,
            fetcher: BatchFetcher::new(fetch),
            year,
            bearer_token,
        }
    }

    async fn fetch_unit_codes(&self) -> Result<Vec<String>, ImportError> {
        let payload = json!({
            "q": self.year.to_string(),
            "firstResult": 0,
            "numberOfResults": SEARCH_PAGE_SIZE,
            "fieldsToInclude": [],
        });
        let authorization = format!("Bearer {}", self.bearer_token);

        let response = self
            .client
            .post_json(COVEO_API_URL, &[("Authorization", authorization.as_str())], &payload)
            .await
            .map_err(|e| ImportError::IndexUnavailable(format!("unit search: {}", e)))?;
        if !response.is_success() {
            return Err(ImportError::IndexUnavailable(format!(
                "unit search returned {}",
                response.status
            )));
        }

        let search: SearchResponse = response
            .json()
            .map_err(|e| ImportError::IndexUnavailable(format!("malformed unit search: {}", e)))?;

        let mut seen = HashSet::new();
        let codes = search
            .results
            .iter()
            .filter_map(|result| {
                let uri = result.uri.as_deref().or(result.click_uri.as_deref())?;
                UNIT_URI.captures(uri).map(|captures| captures[1].to_string())
            })
            .filter(|code| seen.insert(code.clone()))
            .collect();
        Ok(codes)
    }

    async fn fetch_unit(&self, code: String) -> Result<FetchOutcome<ImportUnit>, ImportError> {
        let url = self.info.unit_url(&code);
        let response = self.client.get(&url, &[]).await?;

        if !response.is_success() {
            warn!(code = %code, status = response.status, "Unit page not found");
            return Ok(FetchOutcome::Missing);
        }

        parse_unit_page(&code, &response.body).map(FetchOutcome::Found)
    }
}

fn parse_unit_page(code: &str, html: &str) -> Result<ImportUnit, ImportError> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let page_title = selector("h1.pageTitle")?;
    let detail_row = selector("table.table-striped.table-bordered tr")?;
    let header = selector("th")?;
    let value = selector("td")?;
    let school = selector("h4.b-title--first.fw-normal")?;
    let session_row = selector("#current-year tbody tr, #future-year tbody tr")?;

    // "COMP2123: Data Structures and Algorithms"
    let title = first_text(root, &page_title);
    let name = match title.split_once(':') {
        Some((_, rest)) => rest.trim().to_string(),
        None => title,
    };

    let mut credit_points = 0.0;
    let mut level = NOT_AVAILABLE.to_string();
    for row in document.select(&detail_row) {
        let value_text = first_text(row, &value);
        match first_text(row, &header).as_str() {
            "Credit points" => credit_points = leading_number(&value_text).unwrap_or(0.0),
            "Study level" if !value_text.is_empty() => level = value_text,
            _ => {}
        }
    }

    let mut offerings = Vec::new();
    for row in document.select(&session_row) {
        let cells: Vec<_> = row.select(&value).collect();
        if cells.len() < 3 {
            continue;
        }
        // The session cell also holds a tooltip; only its leading text counts.
        let session = cells[0].text().find_map(non_empty);
        let location = element_text(cells[2]);
        if let Some(session) = session {
            if !location.is_empty() {
                offerings.push(Offering::new(location, session));
            }
        }
    }

    Ok(ImportUnit {
        code: code.to_string(),
        name,
        level,
        credit_points,
        faculty_name: non_empty(&first_text(root, &school)).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        offerings,
    })
}

#[async_trait]
impl Importer for SydneyImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        if self.bearer_token.is_empty() {
            warn!(university = %self.info.name, "SYDNEY_BEARER_TOKEN is not set, search will likely be rejected");
        }

        let codes = self.fetch_unit_codes().await?;
        info!(university = %self.info.name, count = codes.len(), "Found unit codes to process");

        let units = self
            .fetcher
            .fetch_all(&codes, |code| self.fetch_unit(code))
            .await?;

        info!(university = %self.info.name, total = units.len(), "Import process completed");
        Ok(units)
    }
}

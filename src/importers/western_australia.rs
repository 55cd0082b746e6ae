use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::info;

use crate::client::CatalogueClient;
use crate::error::ImportError;
use crate::importers::Importer;
use crate::importers::normalize::{element_text, first_text, leading_number, selector, NOT_AVAILABLE};
use crate::models::{ImportUnit, Offering, UniversityInfo};

const UWA_SEARCH_URL: &str = "https://www.handbooks.uwa.edu.au/search/?type=units&searchtext=";

/// Listing headings look like "Foundations of Computer Science [CITS1001]".
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\[([^\]]+)\]$").expect("valid heading pattern"));

pub struct WesternAustraliaImporter {
    info: UniversityInfo,
    client: Arc<dyn CatalogueClient>,
}

impl WesternAustraliaImporter {
    pub fn new(client: Arc<dyn CatalogueClient>) -> Self {
        Self {
            info: UniversityInfo::new(
                "University of Western Australia",
                "https://www.handbooks.uwa.edu.au/unitdetails?code=",
            ),
            client,
        }
    }
}

/// Collects the `<dd>` values following each `<dt>` label of an item.
fn definition_lists(item: ElementRef<'_>, terms: &Selector) -> HashMap<String, Vec<String>> {
    let mut fields: HashMap<String, Vec<String>> = HashMap::new();
    let mut current: Option<String> = None;

    for element in item.select(terms) {
        let text = element_text(element);
        match element.value().name() {
            "dt" => current = Some(text.trim_end_matches(':').trim().to_string()),
            _ => {
                if let Some(label) = &current {
                    if !text.is_empty() {
                        fields.entry(label.clone()).or_default().push(text);
                    }
                }
            }
        }
    }

    fields
}

fn parse_listing(html: &str) -> Result<Vec<ImportUnit>, ImportError> {
    let document = Html::parse_document(html);
    let item = selector("#filter-target > li.filter-item")?;
    let heading = selector("h4")?;
    let terms = selector("dt, dd")?;

    let mut units = Vec::new();
    for li in document.select(&item) {
        let title = first_text(li, &heading);
        let Some(captures) = HEADING.captures(&title) else {
            continue;
        };
        let name = captures[1].trim().to_string();
        let code = captures[2].trim().to_string();

        let fields = definition_lists(li, &terms);
        let values = |label: &str| fields.get(label).cloned().unwrap_or_default();

        let locations = values("Location");
        let periods = values("Availability");
        let offerings = locations
            .iter()
            .flat_map(|location| {
                periods
                    .iter()
                    .map(move |period| Offering::new(location.as_str(), period.as_str()))
            })
            .collect();

        let unit = ImportUnit {
            code,
            name,
            level: values("Level of study").join(", "),
            credit_points: values("Credit points")
                .first()
                .and_then(|raw| leading_number(raw))
                .unwrap_or(0.0),
            faculty_name: values("School")
                .into_iter()
                .next()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            offerings,
        };
        if unit.has_identity() {
            units.push(unit);
        }
    }

    Ok(units)
}

#[async_trait]
impl Importer for WesternAustraliaImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        let response = self
            .client
            .get(UWA_SEARCH_URL, &[])
            .await
            .map_err(|e| ImportError::IndexUnavailable(format!("unit search page: {}", e)))?;
        if !response.is_success() {
            return Err(ImportError::IndexUnavailable(format!(
                "unit search page returned {}",
                response.status
            )));
        }

        let units = parse_listing(&response.body)?;
        info!(university = %self.info.name, total = units.len(), "Extracted units");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <ul id="filter-target">
          <li class="filter-item">
            <h4>Foundations of Computer Science [CITS1001]</h4>
            <dl>
              <dt>Credit points:</dt><dd>6</dd>
              <dt>Level of study:</dt><dd>Undergraduate</dd><dd>Level 1</dd>
              <dt>School:</dt><dd>Physics, Mathematics and Computing</dd>
              <dt>Location:</dt><dd>UWA (Perth)</dd><dd>Online</dd>
              <dt>Availability:</dt><dd>Semester 1</dd><dd>Semester 2</dd>
            </dl>
          </li>
          <li class="filter-item">
            <h4>Thesis</h4>
          </li>
          <li class="filter-item">
            <h4>Research Project [PHYS5001]</h4>
            <dl><dt>Credit points:</dt><dd>variable</dd></dl>
          </li>
        </ul>
    "#;

    #[test]
    fn test_offerings_are_cross_product() {
        let units = parse_listing(LISTING).expect("parse");

        assert_eq!(units.len(), 2);
        let cits = &units[0];
        assert_eq!(cits.code, "CITS1001");
        assert_eq!(cits.name, "Foundations of Computer Science");
        assert_eq!(cits.level, "Undergraduate, Level 1");
        assert_eq!(cits.credit_points, 6.0);
        assert_eq!(cits.faculty_name, "Physics, Mathematics and Computing");
        assert_eq!(cits.offerings.len(), 4);
        assert!(cits.offerings.contains(&Offering::new("Online", "Semester 2")));

        let phys = &units[1];
        assert_eq!(phys.credit_points, 0.0);
        assert_eq!(phys.faculty_name, "NA");
        assert_eq!(phys.level, "");
        assert!(phys.offerings.is_empty());
    }
}

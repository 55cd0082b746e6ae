use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use tracing::info;

use crate::client::CatalogueClient;
use crate::error::ImportError;
use crate::importers::Importer;
use crate::importers::normalize::{element_text, first_text, leading_number, selector, NOT_AVAILABLE};
use crate::models::{ImportUnit, Offering, UniversityInfo};

const UQ_SEARCH_URL: &str = "https://programs-courses.uq.edu.au/search.html?keywords=+&searchType=course";

/// Scrapes the course search listing, which carries every course with its
/// current offerings on a single page.
pub struct QueenslandImporter {
    info: UniversityInfo,
    client: Arc<dyn CatalogueClient>,
}

impl QueenslandImporter {
    pub fn new(client: Arc<dyn CatalogueClient>) -> Self {
        Self {
            info: UniversityInfo::new(
                "University of Queensland",
                "https://programs-courses.uq.edu.au/course.html?course_code=",
            ),
            client,
        }
    }
}

fn parse_listing(html: &str) -> Result<Vec<ImportUnit>, ImportError> {
    let document = Html::parse_document(html);
    let course = selector("ul.listing > li")?;
    let code = selector("a.code")?;
    let title = selector("a.title")?;
    let level = selector(".course-level")?;
    let units = selector(".course-units")?;
    let row = selector("table tbody tr")?;
    let cell = selector("td")?;

    let mut parsed = Vec::new();
    for item in document.select(&course) {
        let mut offerings = Vec::new();
        for tr in item.select(&row) {
            let cells: Vec<String> = tr.select(&cell).map(element_text).collect();
            if cells.len() < 3 {
                continue;
            }
            let (period, location) = (&cells[0], &cells[1]);
            if !period.is_empty() && !location.is_empty() && !period.contains("View all") {
                offerings.push(Offering::new(location.as_str(), period.as_str()));
            }
        }

        let unit = ImportUnit {
            code: first_text(item, &code),
            name: first_text(item, &title),
            level: first_text(item, &level),
            credit_points: leading_number(&first_text(item, &units)).unwrap_or(0.0),
            faculty_name: NOT_AVAILABLE.to_string(),
            offerings,
        };
        if unit.has_identity() {
            parsed.push(unit);
        }
    }

    Ok(parsed)
}

#[async_trait]
impl Importer for QueenslandImporter {
    fn info(&self) -> &UniversityInfo {
        &self.info
    }

    async fn get_units(&self) -> Result<Vec<ImportUnit>, ImportError> {
        let response = self
            .client
            .get(UQ_SEARCH_URL, &[])
            .await
            .map_err(|e| ImportError::IndexUnavailable(format!("course search page: {}", e)))?;
        if !response.is_success() {
            return Err(ImportError::IndexUnavailable(format!(
                "course search page returned {}",
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
    use crate::client::{FixtureClient, UpstreamResponse};

    const LISTING: &str = r##"
        <html><body>
        <ul class="listing">
          <li>
            <a class="code" href="/course.html?course_code=CSSE1001">CSSE1001</a>
            <a class="title" href="#">Introduction to Software Engineering</a>
            <span class="course-level">Undergraduate</span>
            <span class="course-units">2 units</span>
            <table><tbody>
              <tr><td>Semester 1, 2025</td><td>St Lucia</td><td>Internal</td></tr>
              <tr><td>Semester 2, 2025</td><td>External</td><td>External</td></tr>
              <tr><td>View all offerings</td><td>-</td><td>-</td></tr>
              <tr><td>Short row</td></tr>
            </tbody></table>
          </li>
          <li>
            <a class="code" href="#">MATH9999</a>
            <a class="title" href="#">Retired Course</a>
            <span class="course-level">Postgraduate Coursework</span>
            <span class="course-units">n/a</span>
          </li>
          <li><a class="title" href="#">No code here</a></li>
        </ul>
        </body></html>
    "##;

    #[test]
    fn test_parse_listing() {
        let units = parse_listing(LISTING).expect("parse");

        assert_eq!(units.len(), 2);
        let csse = &units[0];
        assert_eq!(csse.code, "CSSE1001");
        assert_eq!(csse.name, "Introduction to Software Engineering");
        assert_eq!(csse.level, "Undergraduate");
        assert_eq!(csse.credit_points, 2.0);
        assert_eq!(
            csse.offerings,
            vec![
                Offering::new("St Lucia", "Semester 1, 2025"),
                Offering::new("External", "Semester 2, 2025"),
            ]
        );

        let retired = &units[1];
        assert_eq!(retired.credit_points, 0.0);
        assert!(retired.offerings.is_empty());
    }

    #[tokio::test]
    async fn test_get_units_reads_search_page() {
        let client = Arc::new(FixtureClient::new().respond("search.html", UpstreamResponse::ok(LISTING)));
        let units = QueenslandImporter::new(client).get_units().await.expect("import");
        assert_eq!(units.len(), 2);
    }
}

use serde::{Deserialize, Serialize};

/// Credit points stored when an upstream value cannot be represented.
pub const UNKNOWN_CREDIT_POINTS: f64 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub location: String,
    pub period: String,
}

impl Offering {
    pub fn new(location: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            period: period.into(),
        }
    }
}

/// A unit as normalized by a source adapter, before it reaches storage.
///
/// `level` is a string since some institutions publish a number,
/// others a description such as "Undergraduate".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportUnit {
    pub code: String,
    pub name: String,
    pub level: String,
    pub credit_points: f64,
    pub faculty_name: String,
    #[serde(default)]
    pub offerings: Vec<Offering>,
}

impl ImportUnit {
    pub fn is_offered(&self) -> bool {
        !self.offerings.is_empty()
    }

    pub fn has_identity(&self) -> bool {
        !self.code.trim().is_empty() && !self.name.trim().is_empty()
    }

    pub fn storable_credit_points(&self) -> f64 {
        if self.credit_points.is_finite() {
            self.credit_points
        } else {
            UNKNOWN_CREDIT_POINTS
        }
    }
}

/// Identity of the institution an importer reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniversityInfo {
    pub name: String,
    pub handbook_url: String,
}

impl UniversityInfo {
    pub fn new(name: impl Into<String>, handbook_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handbook_url: handbook_url.into(),
        }
    }

    pub fn unit_url(&self, code: &str) -> String {
        format!("{}{}", self.handbook_url, code)
    }
}

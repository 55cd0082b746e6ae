use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct University {
    pub id: i64,
    pub name: String,
    pub handbook_url: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Unit {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub level: String,
    pub credit_points: f64,
    pub faculty_id: Option<i64>,
    pub university_id: i64,
}

/// A row of one of the university-scoped label tables.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DimensionRow {
    pub id: i64,
    pub name: String,
    pub university_id: i64,
}

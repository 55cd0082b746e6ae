use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{DimensionRow, Unit, University, UniversityInfo};

/// University-scoped label tables discovered from adapter output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Faculty,
    Campus,
    Semester,
}

impl Dimension {
    fn table(self) -> &'static str {
        match self {
            Dimension::Faculty => "faculties",
            Dimension::Campus => "campuses",
            Dimension::Semester => "semesters",
        }
    }
}

/// Unit attributes written on every import, keyed by `(code, university_id)`.
#[derive(Debug, Clone)]
pub struct UnitRecord<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub level: &'a str,
    pub credit_points: f64,
    pub faculty_id: Option<i64>,
    pub university_id: i64,
}

pub async fn upsert_university(db: &SqlitePool, info: &UniversityInfo) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO universities (name, handbook_url)
        VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET handbook_url = excluded.handbook_url
        RETURNING id
        "#,
    )
    .bind(&info.name)
    .bind(&info.handbook_url)
    .fetch_one(db)
    .await
}

pub async fn find_university_by_name(
    db: &SqlitePool,
    name: &str,
) -> Result<Option<University>, sqlx::Error> {
    sqlx::query_as::<_, University>(
        "SELECT id, name, handbook_url FROM universities WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(db)
    .await
}

pub async fn upsert_dimension(
    db: &SqlitePool,
    dimension: Dimension,
    name: &str,
    university_id: i64,
) -> Result<i64, sqlx::Error> {
    // The no-op update makes RETURNING yield the existing id on conflict.
    let sql = format!(
        r#"
        INSERT INTO {} (name, university_id)
        VALUES (?1, ?2)
        ON CONFLICT(name, university_id) DO UPDATE SET name = excluded.name
        RETURNING id
        "#,
        dimension.table()
    );

    sqlx::query_scalar(&sql)
        .bind(name)
        .bind(university_id)
        .fetch_one(db)
        .await
}

pub async fn fetch_dimension(
    db: &SqlitePool,
    dimension: Dimension,
    university_id: i64,
) -> Result<Vec<DimensionRow>, sqlx::Error> {
    let sql = format!(
        "SELECT id, name, university_id FROM {} WHERE university_id = ? ORDER BY name",
        dimension.table()
    );

    sqlx::query_as::<_, DimensionRow>(&sql)
        .bind(university_id)
        .fetch_all(db)
        .await
}

pub async fn upsert_unit(conn: &mut SqliteConnection, unit: &UnitRecord<'_>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO units (code, name, level, credit_points, faculty_id, university_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(code, university_id) DO UPDATE SET
            name = excluded.name,
            level = excluded.level,
            credit_points = excluded.credit_points,
            faculty_id = excluded.faculty_id
        RETURNING id
        "#,
    )
    .bind(unit.code)
    .bind(unit.name)
    .bind(unit.level)
    .bind(unit.credit_points)
    .bind(unit.faculty_id)
    .bind(unit.university_id)
    .fetch_one(&mut *conn)
    .await
}

/// Replaces every campus and semester link of a unit with the given ids.
pub async fn replace_unit_offerings(
    conn: &mut SqliteConnection,
    unit_id: i64,
    campus_ids: &[i64],
    semester_ids: &[i64],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM unit_campuses WHERE unit_id = ?")
        .bind(unit_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM unit_semesters WHERE unit_id = ?")
        .bind(unit_id)
        .execute(&mut *conn)
        .await?;

    for campus_id in campus_ids {
        sqlx::query("INSERT OR IGNORE INTO unit_campuses (unit_id, campus_id) VALUES (?, ?)")
            .bind(unit_id)
            .bind(campus_id)
            .execute(&mut *conn)
            .await?;
    }

    for semester_id in semester_ids {
        sqlx::query("INSERT OR IGNORE INTO unit_semesters (unit_id, semester_id) VALUES (?, ?)")
            .bind(unit_id)
            .bind(semester_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

pub async fn find_unit(
    db: &SqlitePool,
    university_id: i64,
    code: &str,
) -> Result<Option<Unit>, sqlx::Error> {
    sqlx::query_as::<_, Unit>(
        "SELECT id, code, name, level, credit_points, faculty_id, university_id FROM units WHERE university_id = ? AND code = ?",
    )
    .bind(university_id)
    .bind(code)
    .fetch_optional(db)
    .await
}

pub async fn fetch_units(db: &SqlitePool, university_id: i64) -> Result<Vec<Unit>, sqlx::Error> {
    sqlx::query_as::<_, Unit>(
        "SELECT id, code, name, level, credit_points, faculty_id, university_id FROM units WHERE university_id = ? ORDER BY code",
    )
    .bind(university_id)
    .fetch_all(db)
    .await
}

pub async fn fetch_unit_campuses(db: &SqlitePool, unit_id: i64) -> Result<Vec<DimensionRow>, sqlx::Error> {
    sqlx::query_as::<_, DimensionRow>(
        r#"
        SELECT c.id, c.name, c.university_id
        FROM unit_campuses uc
        JOIN campuses c ON c.id = uc.campus_id
        WHERE uc.unit_id = ?
        ORDER BY c.name
        "#,
    )
    .bind(unit_id)
    .fetch_all(db)
    .await
}

pub async fn fetch_unit_semesters(db: &SqlitePool, unit_id: i64) -> Result<Vec<DimensionRow>, sqlx::Error> {
    sqlx::query_as::<_, DimensionRow>(
        r#"
        SELECT s.id, s.name, s.university_id
        FROM unit_semesters us
        JOIN semesters s ON s.id = us.semester_id
        WHERE us.unit_id = ?
        ORDER BY s.name
        "#,
    )
    .bind(unit_id)
    .fetch_all(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    fn monash() -> UniversityInfo {
        UniversityInfo::new("Monash University", "https://handbook.monash.edu/current/units/")
    }

    #[tokio::test]
    async fn test_upsert_university_is_idempotent() {
        let pool = connect_in_memory().await.expect("Failed to create test db");

        let first = upsert_university(&pool, &monash()).await.unwrap();
        let mut moved = monash();
        moved.handbook_url = "https://handbook.monash.edu/2026/units/".to_string();
        let second = upsert_university(&pool, &moved).await.unwrap();

        assert_eq!(first, second);
        let stored = find_university_by_name(&pool, "Monash University")
            .await
            .unwrap()
            .expect("university missing");
        assert_eq!(stored.handbook_url, "https://handbook.monash.edu/2026/units/");
    }

    #[tokio::test]
    async fn test_dimension_upsert_returns_existing_id() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let university_id = upsert_university(&pool, &monash()).await.unwrap();

        let a = upsert_dimension(&pool, Dimension::Campus, "Clayton", university_id).await.unwrap();
        let b = upsert_dimension(&pool, Dimension::Campus, "Clayton", university_id).await.unwrap();
        let c = upsert_dimension(&pool, Dimension::Campus, "Malaysia", university_id).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        let campuses = fetch_dimension(&pool, Dimension::Campus, university_id).await.unwrap();
        assert_eq!(campuses.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_unit_offerings_drops_old_links() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let university_id = upsert_university(&pool, &monash()).await.unwrap();
        let clayton = upsert_dimension(&pool, Dimension::Campus, "Clayton", university_id).await.unwrap();
        let malaysia = upsert_dimension(&pool, Dimension::Campus, "Malaysia", university_id).await.unwrap();
        let sem1 = upsert_dimension(&pool, Dimension::Semester, "S1-01", university_id).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let record = UnitRecord {
            code: "FIT2014",
            name: "Theory of Computation",
            level: "1",
            credit_points: 6.0,
            faculty_id: None,
            university_id,
        };
        let unit_id = upsert_unit(&mut *conn, &record).await.unwrap();
        replace_unit_offerings(&mut *conn, unit_id, &[clayton], &[sem1]).await.unwrap();
        replace_unit_offerings(&mut *conn, unit_id, &[malaysia], &[]).await.unwrap();
        drop(conn);

        let campuses = fetch_unit_campuses(&pool, unit_id).await.unwrap();
        assert_eq!(campuses.len(), 1);
        assert_eq!(campuses[0].name, "Malaysia");
        assert!(fetch_unit_semesters(&pool, unit_id).await.unwrap().is_empty());
    }
}

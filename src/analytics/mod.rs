//! Structured analytics over the backing SQLite store
//!
//! The router consults this engine for everything that is not semantic
//! search: counts, group-by aggregations, simple field statistics, and
//! side-by-side comparisons. Filter dimensions are allowlisted column
//! names; values are always bound parameters.

use crate::error::Result;
use crate::pool::ConnectionPool;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),
}

/// One bucket of a group-by or comparison result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: String,
    pub count: u64,
}

/// Simple numeric summary of one field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub count: u64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Exact computation backend for structured query types
///
/// Implementations must be bounded in time; the router treats a returned
/// error as a degraded answer, never a crash.
pub trait AnalyticsEngine: Send + Sync {
    /// Count rows of a target matching the filters
    fn count(&self, target: &str, filters: &BTreeMap<String, String>) -> Result<u64>;

    /// Group rows by a dimension and count each bucket, largest first
    fn aggregate(
        &self,
        target: &str,
        group_by: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<GroupCount>>;

    /// Numeric summary of a field across matching rows
    fn statistics(
        &self,
        target: &str,
        field: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<FieldStatistics>;

    /// Count matching rows for each named value of a dimension
    fn compare(
        &self,
        target: &str,
        dimension: &str,
        values: &[String],
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<GroupCount>>;
}

/// Columns that may appear in WHERE, GROUP BY, or statistics clauses
const ALLOWED_DIMENSIONS: &[&str] = &[
    "district",
    "province",
    "party",
    "gender",
    "constituency",
    "age",
];

fn table_for(target: &str) -> std::result::Result<&'static str, AnalyticsError> {
    match target {
        "candidates" => Ok("candidates"),
        "voting_centers" => Ok("voting_centers"),
        other => Err(AnalyticsError::UnknownTarget(other.to_string())),
    }
}

fn check_dimension(dimension: &str) -> std::result::Result<(), AnalyticsError> {
    if ALLOWED_DIMENSIONS.contains(&dimension) {
        Ok(())
    } else {
        Err(AnalyticsError::UnknownDimension(dimension.to_string()))
    }
}

/// Build a WHERE clause from allowlisted filter dimensions
///
/// Unknown dimensions are skipped rather than rejected: the gazetteer may
/// extract entities (such as `target`) that are not table columns.
fn where_clause(filters: &BTreeMap<String, String>) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    for (dimension, value) in filters {
        if ALLOWED_DIMENSIONS.contains(&dimension.as_str()) {
            conditions.push(format!("{} = ? COLLATE NOCASE", dimension));
            params.push(Value::Text(value.clone()));
        }
    }

    if conditions.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), params)
    }
}

/// Default analytics engine over the pooled SQLite store
pub struct SqliteAnalytics {
    pool: Arc<ConnectionPool>,
}

impl SqliteAnalytics {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Create the candidate and voting-center tables if absent
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.pool.acquire()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS candidates (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                age INTEGER,
                gender TEXT,
                party TEXT,
                district TEXT,
                province TEXT,
                constituency TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_candidates_district ON candidates(district);
            CREATE INDEX IF NOT EXISTS idx_candidates_party ON candidates(party);

            CREATE TABLE IF NOT EXISTS voting_centers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                district TEXT,
                province TEXT,
                constituency TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_centers_district ON voting_centers(district);",
        )?;
        Ok(())
    }
}

impl AnalyticsEngine for SqliteAnalytics {
    fn count(&self, target: &str, filters: &BTreeMap<String, String>) -> Result<u64> {
        let table = table_for(target).map_err(anyhow::Error::from)?;
        let (clause, params) = where_clause(filters);

        let conn = self.pool.acquire()?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", table, clause);
        let count: i64 = conn.query_row(&sql, rusqlite::params_from_iter(params), |row| {
            row.get(0)
        })?;

        tracing::debug!("count({}, {:?}) = {}", target, filters, count);
        Ok(count as u64)
    }

    fn aggregate(
        &self,
        target: &str,
        group_by: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<GroupCount>> {
        let table = table_for(target).map_err(anyhow::Error::from)?;
        check_dimension(group_by).map_err(anyhow::Error::from)?;
        let (clause, params) = where_clause(filters);

        let conn = self.pool.acquire()?;
        let sql = if clause.is_empty() {
            format!(
                "SELECT {dim}, COUNT(*) FROM {table} WHERE {dim} IS NOT NULL \
                 GROUP BY {dim} ORDER BY COUNT(*) DESC, {dim} ASC",
                dim = group_by,
                table = table
            )
        } else {
            format!(
                "SELECT {dim}, COUNT(*) FROM {table}{clause} AND {dim} IS NOT NULL \
                 GROUP BY {dim} ORDER BY COUNT(*) DESC, {dim} ASC",
                dim = group_by,
                table = table,
                clause = clause
            )
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok(GroupCount {
                key: row.get::<_, String>(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    fn statistics(
        &self,
        target: &str,
        field: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<FieldStatistics> {
        let table = table_for(target).map_err(anyhow::Error::from)?;
        check_dimension(field).map_err(anyhow::Error::from)?;
        let (clause, params) = where_clause(filters);

        let conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT COUNT({field}), AVG({field}), MIN({field}), MAX({field}) FROM {table}{clause}",
            field = field,
            table = table,
            clause = clause
        );

        let stats = conn.query_row(&sql, rusqlite::params_from_iter(params), |row| {
            Ok(FieldStatistics {
                count: row.get::<_, i64>(0)? as u64,
                mean: row.get::<_, Option<f64>>(1)?,
                min: row.get::<_, Option<f64>>(2)?,
                max: row.get::<_, Option<f64>>(3)?,
            })
        })?;

        Ok(stats)
    }

    fn compare(
        &self,
        target: &str,
        dimension: &str,
        values: &[String],
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<GroupCount>> {
        check_dimension(dimension).map_err(anyhow::Error::from)?;

        let mut results = Vec::with_capacity(values.len());
        for value in values {
            let mut scoped = filters.clone();
            scoped.insert(dimension.to_string(), value.clone());
            let count = self.count(target, &scoped)?;
            results.push(GroupCount {
                key: value.clone(),
                count,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use tempfile::TempDir;

    fn test_analytics() -> (TempDir, SqliteAnalytics) {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(
            ConnectionPool::new(
                &dir.path().join("test.db"),
                &PoolConfig {
                    size: 2,
                    acquire_timeout_ms: 1000,
                    max_idle_secs: 300,
                },
            )
            .unwrap(),
        );
        let analytics = SqliteAnalytics::new(pool);
        analytics.init_schema().unwrap();

        {
            let conn = analytics.pool.acquire().unwrap();
            conn.execute_batch(
                "INSERT INTO candidates (name, age, gender, party, district, province) VALUES
                    ('A', 34, 'female', 'Congress', 'Kaski', 'Gandaki'),
                    ('B', 45, 'male', 'Congress', 'Kaski', 'Gandaki'),
                    ('C', 29, 'female', 'UML', 'Kaski', 'Gandaki'),
                    ('D', 52, 'male', 'UML', 'Chitwan', 'Bagmati'),
                    ('E', 38, 'female', 'Maoist Centre', 'Chitwan', 'Bagmati');",
            )
            .unwrap();
        }

        (dir, analytics)
    }

    #[test]
    fn test_count_with_filters() {
        let (_dir, analytics) = test_analytics();

        let all = analytics.count("candidates", &BTreeMap::new()).unwrap();
        assert_eq!(all, 5);

        let mut filters = BTreeMap::new();
        filters.insert("district".to_string(), "kaski".to_string());
        let kaski = analytics.count("candidates", &filters).unwrap();
        assert_eq!(kaski, 3);

        filters.insert("gender".to_string(), "female".to_string());
        let kaski_female = analytics.count("candidates", &filters).unwrap();
        assert_eq!(kaski_female, 2);
    }

    #[test]
    fn test_unknown_filter_dimension_skipped() {
        let (_dir, analytics) = test_analytics();

        let mut filters = BTreeMap::new();
        filters.insert("target".to_string(), "candidates".to_string());
        let count = analytics.count("candidates", &filters).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_aggregate_by_party() {
        let (_dir, analytics) = test_analytics();

        let groups = analytics
            .aggregate("candidates", "party", &BTreeMap::new())
            .unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].count, 2);
        // Ties between Congress and UML break alphabetically.
        assert_eq!(groups[0].key, "Congress");
        assert_eq!(groups[1].key, "UML");
    }

    #[test]
    fn test_statistics_on_age() {
        let (_dir, analytics) = test_analytics();

        let mut filters = BTreeMap::new();
        filters.insert("district".to_string(), "kaski".to_string());
        let stats = analytics
            .statistics("candidates", "age", &filters)
            .unwrap();

        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, Some(29.0));
        assert_eq!(stats.max, Some(45.0));
        assert!((stats.mean.unwrap() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_parties() {
        let (_dir, analytics) = test_analytics();

        let results = analytics
            .compare(
                "candidates",
                "party",
                &["Congress".to_string(), "UML".to_string()],
                &BTreeMap::new(),
            )
            .unwrap();

        assert_eq!(results[0].key, "Congress");
        assert_eq!(results[0].count, 2);
        assert_eq!(results[1].key, "UML");
        assert_eq!(results[1].count, 2);
    }

    #[test]
    fn test_unknown_target_rejected() {
        let (_dir, analytics) = test_analytics();
        assert!(analytics.count("ballots", &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_unknown_dimension_rejected() {
        let (_dir, analytics) = test_analytics();
        assert!(analytics
            .aggregate("candidates", "name; DROP TABLE candidates", &BTreeMap::new())
            .is_err());
    }
}

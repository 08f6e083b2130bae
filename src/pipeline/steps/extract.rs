use super::{PipelineStep, StepResult};
use crate::constants::{MERGED_DATA_TABLE, STEP_DB_CONNECTION, STEP_EXTRACT, TCONST};
use crate::error::{EtlError, Result};
use crate::sources::{load_source, SourceFetcher, SourceSpec};
use crate::storage::TableStore;
use crate::table::Table;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Fetches title basics and title ratings, inner-joins them on `tconst`
/// and writes the merged snapshot.
pub struct ExtractStep {
    fetcher: Arc<dyn SourceFetcher>,
    basics: SourceSpec,
    ratings: SourceSpec,
}

impl ExtractStep {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, basics: SourceSpec, ratings: SourceSpec) -> Self {
        Self {
            fetcher,
            basics,
            ratings,
        }
    }
}

#[async_trait]
impl PipelineStep for ExtractStep {
    async fn execute(&self, store: &dyn TableStore) -> Result<StepResult> {
        let basics = load_source(&*self.fetcher, &self.basics).await?;
        let ratings = load_source(&*self.fetcher, &self.ratings).await?;
        let rows_in = basics.len();

        let merged = inner_join(&basics, &ratings, TCONST)
            .map_err(|message| EtlError::source_unavailable(&self.ratings.name, message))?;
        if merged.is_empty() {
            // Kept as a pass-through: an empty merge is written like any other
            warn!(
                "Join of {} ({} rows) and {} ({} rows) produced no rows",
                self.basics.name,
                basics.len(),
                self.ratings.name,
                ratings.len()
            );
        }

        store.replace_table(MERGED_DATA_TABLE, &merged).await?;

        let message = format!(
            "Merged {} basics rows with {} ratings rows into {} rows",
            basics.len(),
            ratings.len(),
            merged.len()
        );
        info!("✅ {}", message);
        Ok(StepResult::new(rows_in, merged.len(), message))
    }

    fn step_name(&self) -> &'static str {
        STEP_EXTRACT
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![STEP_DB_CONNECTION]
    }
}

/// Inner join on `key`.
///
/// Output columns are every left column followed by the right columns other than
/// `key`. Rows come out in left order; a left row matching several right rows
/// yields one output row per match, in right order. Null keys never match.
pub fn inner_join(left: &Table, right: &Table, key: &str) -> std::result::Result<Table, String> {
    let left_key = left
        .column_index(key)
        .ok_or_else(|| format!("left table has no '{key}' column"))?;
    let right_key = right
        .column_index(key)
        .ok_or_else(|| format!("right table has no '{key}' column"))?;

    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows().iter().enumerate() {
        if let Some(k) = row[right_key].as_str() {
            index.entry(k).or_default().push(i);
        }
    }

    let right_columns: Vec<usize> = (0..right.columns().len()).filter(|&i| i != right_key).collect();
    let columns = left
        .columns()
        .iter()
        .cloned()
        .chain(right_columns.iter().map(|&i| right.columns()[i].clone()));
    let mut joined = Table::new(columns);

    for row in left.rows() {
        let Some(matches) = row[left_key].as_str().and_then(|k| index.get(k)) else {
            continue;
        };
        for &r in matches {
            let right_row = &right.rows()[r];
            let mut out = row.clone();
            out.extend(right_columns.iter().map(|&i| right_row[i].clone()));
            joined.push_row(out);
        }
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn basics() -> Table {
        let mut t = Table::new(["tconst", "primaryTitle"]);
        t.push_row(vec![Value::text("tt1"), Value::text("Carmencita")]);
        t.push_row(vec![Value::text("tt2"), Value::text("Le clown et ses chiens")]);
        t.push_row(vec![Value::text("tt3"), Value::text("Pauvre Pierrot")]);
        t
    }

    fn ratings() -> Table {
        let mut t = Table::new(["tconst", "averageRating", "numVotes"]);
        t.push_row(vec![Value::text("tt3"), Value::Real(6.5), Value::Integer(1900)]);
        t.push_row(vec![Value::text("tt1"), Value::Real(5.7), Value::Integer(2000)]);
        t
    }

    #[test]
    fn test_unmatched_rows_are_excluded() {
        let joined = inner_join(&basics(), &ratings(), "tconst").unwrap();
        assert_eq!(joined.columns(), ["tconst", "primaryTitle", "averageRating", "numVotes"]);
        assert_eq!(joined.len(), 2);
        let keys: Vec<_> = joined.column("tconst").unwrap().into_iter().cloned().collect();
        assert_eq!(keys, vec![Value::text("tt1"), Value::text("tt3")]);
        assert_eq!(joined.get(1, "averageRating"), Some(&Value::Real(6.5)));
    }

    #[test]
    fn test_duplicate_right_keys_fan_out() {
        let mut r = ratings();
        r.push_row(vec![Value::text("tt1"), Value::Real(9.0), Value::Integer(1)]);
        let joined = inner_join(&basics(), &r, "tconst").unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.get(0, "averageRating"), Some(&Value::Real(5.7)));
        assert_eq!(joined.get(1, "averageRating"), Some(&Value::Real(9.0)));
    }

    #[test]
    fn test_empty_join_is_not_an_error() {
        let mut r = Table::new(["tconst", "averageRating", "numVotes"]);
        r.push_row(vec![Value::text("tt9"), Value::Real(1.0), Value::Integer(1)]);
        let joined = inner_join(&basics(), &r, "tconst").unwrap();
        assert!(joined.is_empty());
        assert_eq!(joined.columns().len(), 4);
    }

    #[test]
    fn test_missing_key_column() {
        let r = Table::new(["id", "averageRating"]);
        assert!(inner_join(&basics(), &r, "tconst").is_err());
    }
}

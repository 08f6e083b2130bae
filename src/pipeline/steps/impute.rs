use super::{PipelineStep, StepResult};
use crate::constants::{GENRES, IMPUTED_DATA_TABLE, MERGED_DATA_TABLE, SHIFT_CHAIN, STEP_EXTRACT, STEP_IMPUTE};
use crate::error::{EtlError, Result};
use crate::storage::TableStore;
use crate::table::Table;
use async_trait::async_trait;
use tracing::{debug, info};

/// Repairs rows whose `genres` is missing by sliding the shift chain one field right
pub struct ImputeStep;

#[async_trait]
impl PipelineStep for ImputeStep {
    async fn execute(&self, store: &dyn TableStore) -> Result<StepResult> {
        let mut data = store.read_table(MERGED_DATA_TABLE).await?;
        let rows_in = data.len();

        let repaired = impute_shifted_rows(&mut data)
            .map_err(|message| EtlError::table_read(MERGED_DATA_TABLE, message))?;

        store.replace_table(IMPUTED_DATA_TABLE, &data).await?;

        let message = format!("Repaired {repaired} of {rows_in} rows with missing genres");
        info!("✅ {}", message);
        Ok(StepResult::new(rows_in, data.len(), message))
    }

    fn step_name(&self) -> &'static str {
        STEP_IMPUTE
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![STEP_EXTRACT]
    }
}

/// Shift every row with a null `genres` in place and return how many were touched.
///
/// Walks the chain from its last field to its second, copying each field's left
/// neighbour into it, so every source is read before it is overwritten. The first
/// field of the chain keeps its value. Rows with genres are left alone and row
/// order is unchanged.
pub fn impute_shifted_rows(table: &mut Table) -> std::result::Result<usize, String> {
    let chain: Vec<usize> = SHIFT_CHAIN
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| format!("missing column '{name}'"))
        })
        .collect::<std::result::Result<_, _>>()?;
    let genres = table
        .column_index(GENRES)
        .ok_or_else(|| format!("missing column '{GENRES}'"))?;

    let mut repaired = 0;
    for (i, row) in table.rows_mut().iter_mut().enumerate() {
        if !row[genres].is_null() {
            continue;
        }
        for pair in chain.windows(2).rev() {
            row[pair[1]] = row[pair[0]].clone();
        }
        debug!("Shifted fields of row {}", i);
        repaired += 1;
    }
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RECORD_FIELDS;
    use crate::table::Value;

    fn texts(values: &[&str]) -> Vec<Value> {
        values
            .iter()
            .map(|v| if v.is_empty() { Value::Null } else { Value::text(*v) })
            .collect()
    }

    #[test]
    fn test_missing_genres_row_is_shifted() {
        let mut table = Table::new(RECORD_FIELDS);
        // tconst, titleType, primaryTitle, originalTitle, isAdult, startYear, endYear, runtimeMinutes, genres
        let before = texts(&["tt1", "movie", "P", "O", "0", "1994", "\\N", "90", ""]);
        let mut row = before.clone();
        row.push(Value::Real(7.1));
        row.push(Value::Integer(12));
        table.push_row(row);

        assert_eq!(impute_shifted_rows(&mut table).unwrap(), 1);

        let chain: Vec<usize> = SHIFT_CHAIN.iter().map(|n| table.column_index(n).unwrap()).collect();
        for pair in chain.windows(2) {
            assert_eq!(table.rows()[0][pair[1]], before[pair[0]]);
        }
        assert_eq!(table.get(0, "primaryTitle"), Some(&Value::text("P")));
        assert_eq!(table.get(0, "genres"), Some(&Value::text("90")));
        assert_eq!(table.get(0, "tconst"), Some(&Value::text("tt1")));
        assert_eq!(table.get(0, "averageRating"), Some(&Value::Real(7.1)));
    }

    #[test]
    fn test_rows_with_genres_are_unchanged() {
        let mut table = Table::new(RECORD_FIELDS);
        let first = texts(&["tt1", "short", "A", "A", "0", "1894", "\\N", "1", "Documentary,Short", "5.7", "2000"]);
        let second = texts(&["tt2", "short", "B", "B", "0", "1892", "\\N", "5", "", "6.1", "270"]);
        let third = texts(&["tt3", "short", "C", "C", "0", "1892", "\\N", "4", "Animation", "6.5", "1900"]);
        table.push_row(first.clone());
        table.push_row(second);
        table.push_row(third.clone());

        assert_eq!(impute_shifted_rows(&mut table).unwrap(), 1);
        assert_eq!(table.rows()[0], first);
        assert_eq!(table.rows()[2], third);
        assert_eq!(table.get(1, "tconst"), Some(&Value::text("tt2")));
    }

    #[test]
    fn test_missing_chain_column_is_reported() {
        let mut table = Table::new(["tconst", "genres"]);
        assert!(impute_shifted_rows(&mut table).is_err());
    }
}

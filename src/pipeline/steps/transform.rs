use super::{PipelineStep, StepResult};
use crate::constants::{IMPUTED_DATA_TABLE, NUMERIC_FIELDS, SENTINEL, STEP_IMPUTE, STEP_TRANSFORM, TRANSFORMED_DATA_TABLE};
use crate::error::{EtlError, Result};
use crate::storage::TableStore;
use crate::table::{Table, Value};
use async_trait::async_trait;
use tracing::{debug, info};

/// Coerces the sentinel-encoded year and runtime columns to nullable integers
pub struct TransformStep;

#[async_trait]
impl PipelineStep for TransformStep {
    async fn execute(&self, store: &dyn TableStore) -> Result<StepResult> {
        let mut data = store.read_table(IMPUTED_DATA_TABLE).await?;
        let rows_in = data.len();

        let nulls = normalize_numeric_columns(&mut data, &NUMERIC_FIELDS)?;

        store.replace_table(TRANSFORMED_DATA_TABLE, &data).await?;

        let message = format!(
            "Coerced {} columns over {} rows ({} unknown values)",
            NUMERIC_FIELDS.len(),
            rows_in,
            nulls
        );
        info!("✅ {}", message);
        Ok(StepResult::new(rows_in, data.len(), message))
    }

    fn step_name(&self) -> &'static str {
        STEP_TRANSFORM
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![STEP_IMPUTE]
    }
}

/// Convert each named column to nullable integers, returning how many sentinels became null.
///
/// Columns are validated in full before the table is touched, so a failure leaves
/// `table` unchanged.
pub fn normalize_numeric_columns(table: &mut Table, columns: &[&str]) -> Result<usize> {
    let mut converted = Vec::with_capacity(columns.len());
    for name in columns {
        let idx = table
            .column_index(name)
            .ok_or_else(|| EtlError::table_read(IMPUTED_DATA_TABLE, format!("missing column '{name}'")))?;
        let cells = table
            .rows()
            .iter()
            .enumerate()
            .map(|(row, cells)| coerce_cell(name, row, &cells[idx]))
            .collect::<Result<Vec<_>>>()?;
        converted.push((idx, cells));
    }

    let mut nulls = 0;
    for (idx, cells) in converted {
        for (row, cell) in table.rows_mut().iter_mut().zip(cells) {
            nulls += usize::from(cell.is_null());
            row[idx] = cell;
        }
        debug!("Coerced column {}", table.columns()[idx]);
    }
    Ok(nulls)
}

/// `\N` becomes null, integer text (surrounding whitespace allowed) becomes an integer,
/// integers pass through.
pub fn coerce_cell(column: &str, row: usize, value: &Value) -> Result<Value> {
    match value {
        Value::Integer(i) => Ok(Value::Integer(*i)),
        Value::Text(s) if s == SENTINEL => Ok(Value::Null),
        Value::Text(s) => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| EtlError::TypeCoercion {
            column: column.to_string(),
            row,
            value: s.clone(),
        }),
        other => Err(EtlError::TypeCoercion {
            column: column.to_string(),
            row,
            value: match other {
                Value::Null => "null".to_string(),
                v => v.to_string(),
            },
        }),
    }
}

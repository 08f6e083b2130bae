use super::{PipelineStep, StepResult};
use crate::constants::{DEDUPED_DATA_TABLE, STEP_DEDUPE, STEP_TRANSFORM, TCONST, TRANSFORMED_DATA_TABLE};
use crate::error::{EtlError, Result};
use crate::storage::TableStore;
use crate::table::Table;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Drops repeated `tconst` rows, then writes the final table and the TSV export
pub struct DedupeStep {
    output_path: PathBuf,
}

impl DedupeStep {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }
}

#[async_trait]
impl PipelineStep for DedupeStep {
    async fn execute(&self, store: &dyn TableStore) -> Result<StepResult> {
        let mut data = store.read_table(TRANSFORMED_DATA_TABLE).await?;
        let rows_in = data.len();

        let removed = drop_duplicate_keys(&mut data, TCONST)
            .map_err(|message| EtlError::table_read(TRANSFORMED_DATA_TABLE, message))?;
        if removed > 0 {
            warn!("Dropped {} rows with an already-seen {}", removed, TCONST);
        }

        // The file is staged first and only published once the table write has succeeded
        let staged = staging_path(&self.output_path);
        if let Err(e) = write_tsv(&data, &staged) {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }

        if let Err(e) = store.replace_table(DEDUPED_DATA_TABLE, &data).await {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }

        fs::rename(&staged, &self.output_path).map_err(|e| {
            error!(
                "Table {} was written but {} was not; outputs now diverge",
                DEDUPED_DATA_TABLE,
                self.output_path.display()
            );
            EtlError::sink_write(self.output_path.display(), e)
        })?;

        let message = format!(
            "Kept {} of {} rows, exported to {}",
            data.len(),
            rows_in,
            self.output_path.display()
        );
        info!("✅ {}", message);
        Ok(StepResult::new(rows_in, data.len(), message))
    }

    fn step_name(&self) -> &'static str {
        STEP_DEDUPE
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![STEP_TRANSFORM]
    }
}

/// Keep the first row for every value of `key`, preserving order. Returns rows removed.
pub fn drop_duplicate_keys(table: &mut Table, key: &str) -> std::result::Result<usize, String> {
    let idx = table
        .column_index(key)
        .ok_or_else(|| format!("missing column '{key}'"))?;
    let before = table.len();
    if table.distinct_count(key) == Some(before) {
        return Ok(0);
    }

    let mut seen = HashSet::new();
    table.retain_rows(|row| seen.insert(row[idx].identity()));
    Ok(before - table.len())
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}

/// Write `table` as tab-separated text with a header row.
/// Nulls are empty fields; fields holding a tab, quote or newline are quoted.
pub fn write_tsv(table: &Table, path: &Path) -> Result<()> {
    let sink = || path.display().to_string();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| EtlError::sink_write(sink(), e))?;
        }
    }

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(|e| EtlError::sink_write(sink(), e))?;

    wtr.write_record(table.columns())
        .map_err(|e| EtlError::sink_write(sink(), e))?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| EtlError::sink_write(sink(), e))?;
    }
    wtr.flush().map_err(|e| EtlError::sink_write(sink(), e))?;
    Ok(())
}

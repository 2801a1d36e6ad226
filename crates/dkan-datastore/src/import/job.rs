//! Resumable, time-boxed CSV import
//!
//! An [`ImportJob`] streams one resource file into its table. Each call to
//! [`ImportJob::run`] picks up at the persisted byte offset, inserts batches
//! until the time budget is spent or the file ends, and saves its progress.

use crate::database::{DatabaseTable, HeaderSanitizer, StrictModeOff, TableSchema};
use crate::fetch::FileFetcher;
use crate::resource::DataResource;
use dkan_common::storage::JsonStoreExt;
use dkan_common::{DkanError, JobResult, JsonStore, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const BOM: char = '\u{feff}';

/// Per-invocation limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportOptions {
    /// Budget of one `run()`, checked between batches
    pub time_limit: Duration,
    pub batch_size: usize,
    /// Create the table and insert with strict mode relaxed
    pub strict_mode_off: bool,
}

/// Persisted progress of an import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportState {
    pub result: JobResult,
    /// Local copy the rows are read from
    #[serde(default)]
    pub local: Option<DataResource>,
    #[serde(default)]
    pub byte_offset: u64,
    #[serde(default)]
    pub rows_imported: u64,
    #[serde(default)]
    pub file_size: u64,
    /// Header as found in the file
    #[serde(default)]
    pub header: Vec<String>,
    /// Sanitized column names
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub table_created: bool,
}

pub struct ImportJob {
    resource: DataResource,
    table: DatabaseTable,
    store: Arc<dyn JsonStore>,
    fetcher: FileFetcher,
    options: ImportOptions,
}

impl ImportJob {
    pub fn new(
        resource: DataResource,
        table: DatabaseTable,
        store: Arc<dyn JsonStore>,
        fetcher: FileFetcher,
        options: ImportOptions,
    ) -> Self {
        Self {
            resource,
            table,
            store,
            fetcher,
            options,
        }
    }

    /// Key of the persisted state
    pub fn id(&self) -> String {
        self.resource.versioned_identifier()
    }

    pub fn resource(&self) -> &DataResource {
        &self.resource
    }

    pub fn table(&self) -> &DatabaseTable {
        &self.table
    }

    pub async fn state(&self) -> Result<ImportState> {
        Ok(self.store.retrieve_as(&self.id()).await?.unwrap_or_default())
    }

    pub async fn result(&self) -> Result<JobResult> {
        Ok(self.state().await?.result)
    }

    /// Run until the file ends or the time budget is spent
    ///
    /// A job that already finished returns its stored result untouched.
    /// Failures while importing end the job in `Error`; only failures to
    /// load or save the state itself are returned as `Err`.
    pub async fn run(&self) -> Result<JobResult> {
        let mut state = self.state().await?;
        if state.result.status.is_terminal() {
            debug!(job_id = %self.id(), status = %state.result.status, "Job already finished");
            return Ok(state.result);
        }

        state.result.start();
        let started = Instant::now();

        if let Err(e) = self.import(&mut state, started).await {
            error!(
                job_id = %self.id(),
                table = %self.table.name(),
                rows_imported = state.rows_imported,
                error = %e,
                "Import failed"
            );
            state.result.set_error(e.to_string());
        }

        self.save(&state).await?;
        Ok(state.result)
    }

    /// Stop the job; later runs return the stopped result
    pub async fn stop(&self) -> Result<JobResult> {
        let mut state = self.state().await?;
        if !state.result.status.is_terminal() {
            state.result.set_stopped();
            self.save(&state).await?;
            info!(job_id = %self.id(), "Import stopped");
        }
        Ok(state.result)
    }

    /// Drop the table and forget the job
    pub async fn drop_job(&self) -> Result<()> {
        self.table.drop_table().await?;
        self.store.remove(&self.id()).await?;
        Ok(())
    }

    async fn save(&self, state: &ImportState) -> Result<()> {
        self.store.store_as(state, &self.id()).await
    }

    async fn import(&self, state: &mut ImportState, started: Instant) -> Result<()> {
        let local = match &state.local {
            Some(local) => local.clone(),
            None => {
                let local = self.fetcher.localize(&self.resource).await?;
                state.file_size = tokio::fs::metadata(&local.file_path).await?.len();
                state.local = Some(local.clone());
                local
            }
        };

        if !state.table_created {
            self.prepare_table(state, &local).await?;
            self.save(state).await?;
        } else {
            // Rows committed after the last saved offset are read again
            let stale = self.table.delete_after(state.rows_imported).await?;
            if stale > 0 {
                warn!(
                    job_id = %self.id(),
                    table = %self.table.name(),
                    rows = stale,
                    "Discarded rows inserted past the saved offset"
                );
            }
        }

        loop {
            let (batch, next_offset, eof) = {
                let local = local.clone();
                let (offset, batch_size, width, rows_before) = (
                    state.byte_offset,
                    self.options.batch_size,
                    state.columns.len(),
                    state.rows_imported,
                );
                blocking(move || read_batch(&local, offset, batch_size, width, rows_before)).await?
            };

            if !batch.is_empty() {
                let inserted = {
                    let _guard = self.relax()?;
                    self.table
                        .insert_rows(&state.columns, &batch, state.rows_imported + 1)
                        .await?
                };
                state.rows_imported += inserted;
            }
            state.byte_offset = next_offset;

            if eof {
                state.result.set_done();
                info!(
                    job_id = %self.id(),
                    table = %self.table.name(),
                    rows = state.rows_imported,
                    "Import complete"
                );
                return Ok(());
            }

            state.result.set_progress(percent(state.byte_offset, state.file_size));
            self.save(state).await?;

            if started.elapsed() >= self.options.time_limit {
                debug!(
                    job_id = %self.id(),
                    byte_offset = state.byte_offset,
                    percent_done = state.result.percent_done,
                    "Time budget spent, pausing import"
                );
                return Ok(());
            }
        }
    }

    async fn prepare_table(&self, state: &mut ImportState, local: &DataResource) -> Result<()> {
        let (header, offset) = {
            let local = local.clone();
            blocking(move || read_header(&local)).await?
        };
        let columns = HeaderSanitizer::new()?.columns(&header)?;

        if self.table.exists().await? {
            warn!(table = %self.table.name(), "Replacing table left by an earlier attempt");
            self.table.drop_table().await?;
        }
        {
            let _guard = self.relax()?;
            self.table.create(&TableSchema::text_columns(&columns)).await?;
        }

        state.header = header;
        state.columns = columns;
        state.byte_offset = offset;
        state.table_created = true;
        Ok(())
    }

    fn relax(&self) -> Result<Option<StrictModeOff>> {
        if self.options.strict_mode_off {
            self.table.database().relax_strict_mode().map(Some)
        } else {
            Ok(None)
        }
    }
}

fn percent(offset: u64, size: u64) -> f64 {
    if size == 0 {
        return 100.0;
    }
    offset as f64 / size as f64 * 100.0
}

/// Run file reading off the async workers
async fn blocking<T, F>(read: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(read)
        .await
        .map_err(|e| DkanError::import(format!("File reader task failed: {e}")))?
}

fn csv_reader(resource: &DataResource, offset: u64) -> Result<csv::Reader<BufReader<File>>> {
    let mut file = File::open(&resource.file_path)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(resource.delimiter())
        .from_reader(BufReader::new(file)))
}

fn csv_error(e: csv::Error) -> DkanError {
    DkanError::import(format!("CSV error: {e}"))
}

/// Header row and the offset of the first data row
fn read_header(resource: &DataResource) -> Result<(Vec<String>, u64)> {
    let mut reader = csv_reader(resource, 0)?;
    let mut record = csv::StringRecord::new();
    if !reader.read_record(&mut record).map_err(csv_error)? {
        return Err(DkanError::import(format!("{} has no header row", resource.file_path)));
    }
    let header = record
        .iter()
        .enumerate()
        .map(|(i, h)| if i == 0 { h.trim_start_matches(BOM) } else { h }.to_string())
        .collect();
    Ok((header, reader.position().byte()))
}

/// Up to `batch_size` rows from `offset`; returns the rows, the offset after
/// them and whether the file ended
fn read_batch(
    resource: &DataResource,
    offset: u64,
    batch_size: usize,
    width: usize,
    rows_before: u64,
) -> Result<(Vec<Vec<String>>, u64, bool)> {
    let mut reader = csv_reader(resource, offset)?;
    let mut record = csv::StringRecord::new();
    let mut rows = Vec::with_capacity(batch_size);

    while rows.len() < batch_size {
        if !reader.read_record(&mut record).map_err(csv_error)? {
            return Ok((rows, offset + reader.position().byte(), true));
        }
        if record.len() != width {
            return Err(DkanError::import(format!(
                "Row {} has {} values but the header has {} columns",
                rows_before + rows.len() as u64 + 1,
                record.len(),
                width
            )));
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    let next = offset + reader.position().byte();
    let eof = next >= std::fs::metadata(&resource.file_path)?.len();
    Ok((rows, next, eof))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(content: &str) -> (tempfile::TempDir, DataResource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        let resource = DataResource::new(path.to_string_lossy(), "text/csv");
        (dir, resource)
    }

    #[test]
    fn test_header_strips_bom() {
        let (_dir, resource) = write("\u{feff}Name,Score\nA,1\n");
        let (header, offset) = read_header(&resource).unwrap();
        assert_eq!(header, vec!["Name", "Score"]);
        let (rows, _, eof) = read_batch(&resource, offset, 10, 2, 0).unwrap();
        assert_eq!(rows, vec![vec!["A", "1"]]);
        assert!(eof);
    }

    #[test]
    fn test_batches_resume_at_offset() {
        let (_dir, resource) = write("a,b\n1,2\n3,4\n5,6\n");
        let (_, offset) = read_header(&resource).unwrap();

        let (rows, next, eof) = read_batch(&resource, offset, 2, 2, 0).unwrap();
        assert_eq!(rows, vec![vec!["1", "2"], vec!["3", "4"]]);
        assert!(!eof);

        let (rows, _, eof) = read_batch(&resource, next, 2, 2, 2).unwrap();
        assert_eq!(rows, vec![vec!["5", "6"]]);
        assert!(eof);
    }

    #[test]
    fn test_width_mismatch_names_row() {
        let (_dir, resource) = write("a,b\n1,2\n3\n");
        let (_, offset) = read_header(&resource).unwrap();
        let err = read_batch(&resource, offset, 10, 2, 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Import error: Row 2 has 1 values but the header has 2 columns"
        );
    }

    #[test]
    fn test_quoted_newlines_stay_in_one_row() {
        let (_dir, resource) = write("a,b\n\"x\ny\",2\n");
        let (_, offset) = read_header(&resource).unwrap();
        let (rows, _, eof) = read_batch(&resource, offset, 10, 2, 0).unwrap();
        assert_eq!(rows, vec![vec!["x\ny", "2"]]);
        assert!(eof);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_reads_run_off_the_runtime_thread() {
        let (_dir, resource) = write("a,b\n1,2\n3,4\n");
        let runtime_thread = std::thread::current().id();

        let local = resource.clone();
        let (header, offset, reader_thread) = blocking(move || {
            let (header, offset) = read_header(&local)?;
            Ok((header, offset, std::thread::current().id()))
        })
        .await
        .unwrap();
        assert_eq!(header, vec!["a", "b"]);
        assert_ne!(reader_thread, runtime_thread);

        let (rows, _, eof) = blocking(move || read_batch(&resource, offset, 10, 2, 0)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(eof);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(50, 200), 25.0);
        assert_eq!(percent(0, 0), 100.0);
    }
}

// Export of stored tables to CSV or JSON. Rows are streamed from the store
// and written incrementally to a temp file that is atomically renamed on
// success, so a prior export is never partially overwritten.

use crate::metrics_repo::MetricsRepo;
use crate::models::{Sample, SpeedTestResult, StatFamily, SystemEvent};
use futures_util::{Stream, TryStreamExt, pin_mut};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("destination i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store read: {0}")]
    Store(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => anyhow::bail!("unknown export format: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSelector {
    NetworkStats,
    SystemStats,
    SpeedTests,
    SystemEvents,
    All,
}

impl TableSelector {
    const TABLES: [TableSelector; 4] = [
        TableSelector::NetworkStats,
        TableSelector::SystemStats,
        TableSelector::SpeedTests,
        TableSelector::SystemEvents,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            TableSelector::NetworkStats => "network_stats",
            TableSelector::SystemStats => "system_stats",
            TableSelector::SpeedTests => "speed_tests",
            TableSelector::SystemEvents => "system_events",
            TableSelector::All => "all",
        }
    }
}

impl FromStr for TableSelector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network_stats" => Ok(TableSelector::NetworkStats),
            "system_stats" => Ok(TableSelector::SystemStats),
            "speed_tests" => Ok(TableSelector::SpeedTests),
            "system_events" => Ok(TableSelector::SystemEvents),
            "all" => Ok(TableSelector::All),
            other => anyhow::bail!("unknown table selector: {}", other),
        }
    }
}

/// Exports the selected table(s). For `All`, `dest` is a directory and one
/// file per table is written into it; otherwise `dest` is the target file.
#[instrument(skip(repo), fields(operation = "export", table = table.table_name()))]
pub async fn export(
    repo: &MetricsRepo,
    format: ExportFormat,
    table: TableSelector,
    dest: &Path,
) -> Result<(), ExportError> {
    match table {
        TableSelector::All => {
            std::fs::create_dir_all(dest)?;
            for t in TableSelector::TABLES {
                let file = dest.join(format!("{}.{}", t.table_name(), format.extension()));
                export_table(repo, format, t, &file).await?;
            }
            Ok(())
        }
        single => export_table(repo, format, single, dest).await,
    }
}

async fn export_table(
    repo: &MetricsRepo,
    format: ExportFormat,
    table: TableSelector,
    dest: &Path,
) -> Result<(), ExportError> {
    let tmp = tmp_path(dest);
    let result = write_table(repo, format, table, &tmp).await;
    match result {
        Ok(rows) => {
            if let Err(e) = std::fs::rename(&tmp, dest) {
                let _ = std::fs::remove_file(&tmp);
                return Err(e.into());
            }
            info!(rows, dest = %dest.display(), "export written");
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

async fn write_table(
    repo: &MetricsRepo,
    format: ExportFormat,
    table: TableSelector,
    tmp: &Path,
) -> Result<u64, ExportError> {
    let file = File::create(tmp)?;
    let mut writer = BufWriter::new(file);
    let rows = match table {
        TableSelector::NetworkStats => {
            let stream = repo.stream_samples(StatFamily::Network);
            write_stream(stream, format, &mut writer).await?
        }
        TableSelector::SystemStats => {
            let stream = repo.stream_samples(StatFamily::System);
            write_stream(stream, format, &mut writer).await?
        }
        TableSelector::SpeedTests => {
            let stream = repo.stream_speed_tests();
            write_stream(stream, format, &mut writer).await?
        }
        TableSelector::SystemEvents => {
            let stream = repo.stream_events();
            write_stream(stream, format, &mut writer).await?
        }
        TableSelector::All => unreachable!("expanded by export()"),
    };
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(rows)
}

async fn write_stream<R: ExportRecord>(
    stream: impl Stream<Item = anyhow::Result<R>>,
    format: ExportFormat,
    writer: &mut BufWriter<File>,
) -> Result<u64, ExportError> {
    pin_mut!(stream);
    let mut rows = 0u64;
    match format {
        ExportFormat::Csv => {
            writeln!(writer, "{}", R::CSV_HEADER)?;
            while let Some(record) = stream.try_next().await.map_err(ExportError::Store)? {
                writeln!(writer, "{}", record.csv_row())?;
                rows += 1;
            }
        }
        ExportFormat::Json => {
            writer.write_all(b"[")?;
            while let Some(record) = stream.try_next().await.map_err(ExportError::Store)? {
                if rows > 0 {
                    writer.write_all(b",")?;
                }
                serde_json::to_writer(&mut *writer, &record)?;
                rows += 1;
            }
            writer.write_all(b"]")?;
        }
    }
    Ok(rows)
}

fn tmp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".into());
    dest.with_file_name(format!("{}.tmp", name))
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

trait ExportRecord: Serialize {
    const CSV_HEADER: &'static str;
    fn csv_row(&self) -> String;
}

impl ExportRecord for Sample {
    const CSV_HEADER: &'static str = "timestamp,metric_kind,value,unit";

    fn csv_row(&self) -> String {
        format!(
            "{},{},{},{}",
            self.timestamp,
            self.metric_kind,
            self.value,
            csv_escape(&self.unit)
        )
    }
}

impl ExportRecord for SpeedTestResult {
    const CSV_HEADER: &'static str = "timestamp,download_mbps,upload_mbps,server_id";

    fn csv_row(&self) -> String {
        format!(
            "{},{},{},{}",
            self.timestamp,
            self.download_mbps,
            self.upload_mbps,
            csv_escape(&self.server_id)
        )
    }
}

impl ExportRecord for SystemEvent {
    const CSV_HEADER: &'static str = "timestamp,event_kind,message";

    fn csv_row(&self) -> String {
        format!(
            "{},{},{}",
            self.timestamp,
            self.event_kind,
            csv_escape(&self.message)
        )
    }
}

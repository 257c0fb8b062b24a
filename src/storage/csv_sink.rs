use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{DatalossTracker, StorageBackend, StorageMetadata, StorageSink};
use crate::core::{Channel, SampleFrame};
use crate::hal::StreamingConfiguration;

/// Writes sessions as `<dir>/<name>.csv`
#[derive(Debug, Clone)]
pub struct CsvStorage {
    dir: PathBuf,
}

impl CsvStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }
}

impl StorageBackend for CsvStorage {
    fn open(
        &self,
        name: &str,
        streaming: StreamingConfiguration,
        metadata: &StorageMetadata,
    ) -> Result<Box<dyn StorageSink>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create measurement directory {:?}", self.dir))?;
        let sink = CsvSink::create(self.session_path(name), streaming, metadata)?;
        Ok(Box::new(sink))
    }
}

/// CSV file with the session metadata as a commented JSON header
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    tracker: DatalossTracker,
}

impl CsvSink {
    pub fn create(
        path: PathBuf,
        streaming: StreamingConfiguration,
        metadata: &StorageMetadata,
    ) -> Result<Self> {
        let mut file =
            File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;

        let json = serde_json::to_string_pretty(metadata)
            .context("Failed to serialize session metadata")?;
        for line in json.lines() {
            writeln!(file, "# {}", line)?;
        }

        let mut writer = csv::Writer::from_writer(file);
        let mut header = vec!["counter".to_string(), "timestamp".to_string()];
        header.extend(
            Channel::ALL
                .iter()
                .filter(|ch| streaming.is_enabled(**ch))
                .map(|ch| format!("{:?}", ch).to_lowercase()),
        );
        writer.write_record(&header)?;

        info!(path = ?path, "storage opened");
        Ok(Self {
            path,
            writer: Some(writer),
            tracker: DatalossTracker::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageSink for CsvSink {
    fn append(&mut self, frame: &SampleFrame) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("storage {:?} already closed", self.path))?;

        self.tracker.record(frame.counter);

        let mut record = Vec::with_capacity(frame.values.len() + 2);
        record.push(frame.counter.to_string());
        record.push(frame.timestamp.to_string());
        record.extend(frame.values.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
        Ok(())
    }

    fn dataloss(&self) -> u64 {
        self.tracker.lost()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("Failed to flush {:?}", self.path))?;
            info!(
                path = ?self.path,
                frames = self.tracker.received(),
                dataloss = self.tracker.lost(),
                "storage closed"
            );
        }
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

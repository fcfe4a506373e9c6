//! Record sinks
//!
//! Completed item records leave the pipeline through the [`Sink`] trait.
//! Emission is fire-and-forget from the pipeline's perspective: a sink
//! failure is logged and does not roll back the ledger's completion mark.
//! Completion reflects "crawled", not "persisted downstream".

use crate::record::ItemRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while emitting a record
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for finished item records
///
/// Emission is synchronous; the pipeline never suspends on a sink.
pub trait Sink: Send {
    fn emit(&mut self, record: &ItemRecord) -> Result<(), SinkError>;
}

/// Appends one JSON object per line to a file
///
/// Opened in append mode so a resumed run extends the previous run's output
/// instead of truncating it.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for JsonLinesSink {
    fn emit(&mut self, record: &ItemRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", line)?;
        // One record per flush: an emitted record should survive a crash
        self.writer.flush()?;
        Ok(())
    }
}

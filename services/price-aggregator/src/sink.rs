//! Line sink for enriched records
//!
//! Appends `name,dd-Mon-yyyy,price\n` per record to a buffered writer and
//! guarantees the writer is shut down exactly once, whether the input
//! completes, fails, or the sink is closed early. Closing twice is a no-op.

use std::io;
use std::path::{Path, PathBuf};

use futures::stream::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, warn};
use types::record::Record;

use crate::error::PipelineError;
use crate::stream::RecordStream;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {record}: {source}")]
    Write {
        record: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to close sink: {source}")]
    Close {
        #[source]
        source: io::Error,
    },

    #[error("sink already closed")]
    Closed,
}

pub struct RecordSink<W: AsyncWrite + Unpin + Send> {
    writer: Option<BufWriter<W>>,
    written: u64,
}

impl RecordSink<File> {
    /// Create (or truncate) the file at `path`.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = File::create(path).await.map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Sink opened");
        Ok(Self::new(file))
    }
}

impl<W: AsyncWrite + Unpin + Send> RecordSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(BufWriter::new(writer)),
            written: 0,
        }
    }

    pub async fn write(&mut self, record: &Record) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        let mut line = record.to_line();
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|source| SinkError::Write {
                record: record.to_string(),
                source,
            })?;
        self.written += 1;
        debug!(record = %record, "Record written");
        Ok(())
    }

    /// Flush and release the writer. Only the first call does anything.
    pub async fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.shutdown().await.map_err(|source| SinkError::Close { source })?;
        info!(written = self.written, "Sink closed");
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Write every record of `records`, then close.
    ///
    /// The sink is closed on every exit path. The first failure wins: an
    /// upstream or write error is returned even if closing also fails.
    pub async fn drain(mut self, mut records: RecordStream) -> Result<u64, PipelineError> {
        let mut outcome = Ok(());
        while let Some(item) = records.next().await {
            let written = match item {
                Ok(record) => self.write(&record).await.map_err(PipelineError::from),
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                error!(error = %err, "Sink input failed");
                outcome = Err(err);
                break;
            }
        }

        let closed = self.close().await;
        outcome?;
        closed?;
        Ok(self.written)
    }
}

impl<W: AsyncWrite + Unpin + Send> Drop for RecordSink<W> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            warn!(written = self.written, "Sink dropped without close, buffered output may be lost");
        }
    }
}

//! Raw line sources feeding the multicaster
//!
//! A source is lazy, finite, forward-only and not restartable. It yields
//! UTF-8 lines without their terminators and signals either exhaustion
//! (`Ok(None)`) or a failure that ends the feed.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

/// Failure of the underlying line source.
///
/// Cloneable so the multicaster can hand the same failure to every consumer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line source failed after {line} lines: {message}")]
pub struct SourceError {
    /// Number of lines successfully read before the failure.
    pub line: u64,
    pub message: String,
}

impl SourceError {
    pub fn new(line: u64, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    fn from_io(line: u64, err: io::Error) -> Self {
        Self::new(line, err.to_string())
    }
}

/// Producer of raw text lines.
#[async_trait]
pub trait LineSource: Send {
    /// Next line, `Ok(None)` once exhausted.
    async fn next_line(&mut self) -> Result<Option<String>, SourceError>;
}

/// Line source over any buffered async reader.
///
/// Splits on `\n` and `\r\n`; invalid UTF-8 ends the source with an error.
pub struct ReaderLineSource<R> {
    lines: Lines<R>,
    read: u64,
}

impl<R: AsyncBufRead + Unpin + Send> ReaderLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            read: 0,
        }
    }
}

impl ReaderLineSource<BufReader<File>> {
    /// Open a file as a line source.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|err| {
            SourceError::new(0, format!("cannot open {}: {}", path.display(), err))
        })?;
        debug!(path = %path.display(), "Opened line source");
        Ok(Self::new(BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for ReaderLineSource<R> {
    async fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        match self.lines.next_line().await {
            Ok(Some(line)) => {
                self.read += 1;
                Ok(Some(line))
            }
            Ok(None) => Ok(None),
            Err(err) => Err(SourceError::from_io(self.read, err)),
        }
    }
}

/// Line source over an in-memory sequence.
pub struct IterLineSource {
    items: Box<dyn Iterator<Item = Result<String, SourceError>> + Send>,
}

impl IterLineSource {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<String, SourceError>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            items: Box::new(items.into_iter()),
        }
    }

    /// Source yielding the given lines, then exhausting.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<Result<String, SourceError>> = lines.into_iter().map(|line| Ok(line.into())).collect();
        Self::new(lines)
    }

    /// Repeat `sample` until `total` lines have been produced.
    ///
    /// Used for load runs over a small example file.
    pub fn cycled(sample: Vec<String>, total: usize) -> Self {
        Self::new(sample.into_iter().cycle().take(total).map(Ok))
    }
}

#[async_trait]
impl LineSource for IterLineSource {
    async fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        self.items.next().transpose()
    }
}

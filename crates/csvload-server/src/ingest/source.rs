//! Row source: streams delimited text one record at a time
//!
//! The first record is always consumed as a header and never yielded. Every later
//! record is checked against the schema before it is handed out.
//!
//! The csv parser accepts stray and unterminated quotes. [`QuoteAudit`] watches the
//! raw bytes on their way in and records the first quoting fault, which fails the
//! record it belongs to.

use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord, Trim};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use super::error::{IngestError, IngestResult};
use super::schema::Schema;

/// One data record, fields in file order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    /// Line the record starts on (the header is line 1)
    pub line: u64,
    pub fields: Vec<String>,
}

impl Row {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QuoteFault {
    /// Line the faulty record starts on
    line: u64,
    reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    RecordStart,
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Reader adapter that scans for quoting faults
///
/// Record boundaries are tracked the same way the csv parser tracks them, so a
/// fault's line matches the position of the record the parser yields for it.
struct QuoteAudit<R> {
    inner: R,
    delimiter: u8,
    state: QuoteState,
    line: u64,
    record_line: u64,
    fault: Arc<OnceLock<QuoteFault>>,
}

impl<R> QuoteAudit<R> {
    fn new(inner: R, delimiter: u8, fault: Arc<OnceLock<QuoteFault>>) -> Self {
        Self {
            inner,
            delimiter,
            state: QuoteState::RecordStart,
            line: 1,
            record_line: 1,
            fault,
        }
    }

    fn flag(&self, reason: &'static str) {
        let _ = self.fault.set(QuoteFault {
            line: self.record_line,
            reason,
        });
    }

    fn scan(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.state == QuoteState::RecordStart {
                match b {
                    b'\n' => {
                        self.line += 1;
                        continue;
                    },
                    b'\r' => continue,
                    _ => {
                        self.record_line = self.line;
                        self.state = QuoteState::FieldStart;
                    },
                }
            }

            self.state = match (self.state, b) {
                (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
                (QuoteState::Quoted, b'\n') => {
                    self.line += 1;
                    QuoteState::Quoted
                },
                (QuoteState::Quoted, _) => QuoteState::Quoted,
                (QuoteState::QuoteInQuoted, b'"') => QuoteState::Quoted,
                (QuoteState::FieldStart, b'"') => QuoteState::Quoted,
                (QuoteState::Unquoted, b'"') => {
                    self.flag("bare \" in non-quoted field");
                    QuoteState::Unquoted
                },
                (_, b'\n') => {
                    self.line += 1;
                    QuoteState::RecordStart
                },
                (_, b'\r') => QuoteState::RecordStart,
                (_, b) if b == self.delimiter => QuoteState::FieldStart,
                (QuoteState::QuoteInQuoted, _) => {
                    self.flag("extraneous \" in quoted field");
                    QuoteState::Unquoted
                },
                _ => QuoteState::Unquoted,
            };
        }
    }

    fn finish(&self) {
        if matches!(self.state, QuoteState::Quoted) {
            self.flag("quoted field is never closed");
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for QuoteAudit<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = polled {
            let filled = &buf.filled()[before..];
            if filled.is_empty() && buf.remaining() > 0 {
                self.finish();
            } else {
                self.scan(filled);
            }
        }
        polled
    }
}

pub struct RowSource<R> {
    reader: AsyncReader<QuoteAudit<R>>,
    schema: Arc<Schema>,
    record: StringRecord,
    fault: Arc<OnceLock<QuoteFault>>,
}

impl<R> RowSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(input: R, schema: Arc<Schema>, delimiter: u8) -> Self {
        let fault = Arc::new(OnceLock::new());

        // flexible: the header may have any width, data arity is checked per record
        let reader = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::None)
            .delimiter(delimiter)
            .create_reader(QuoteAudit::new(input, delimiter, fault.clone()));

        Self {
            reader,
            schema,
            record: StringRecord::new(),
            fault,
        }
    }

    /// Next data row, or `None` at end of input.
    pub async fn next_row(&mut self) -> IngestResult<Option<Row>> {
        if !self.reader.read_record(&mut self.record).await? {
            return match self.fault.get() {
                Some(fault) => Err(malformed(fault)),
                None => Ok(None),
            };
        }

        let line = self.record.position().map(|p| p.line()).unwrap_or(0);
        // the audit reads ahead of the parser, so only faults up to this record count
        if let Some(fault) = self.fault.get().filter(|f| f.line <= line) {
            return Err(malformed(fault));
        }

        let fields: Vec<String> = self.record.iter().map(str::to_string).collect();
        self.schema.validate(line, &fields)?;

        Ok(Some(Row::new(line, fields)))
    }
}

fn malformed(fault: &QuoteFault) -> IngestError {
    IngestError::Malformed {
        line: fault.line,
        reason: fault.reason,
    }
}

impl RowSource<tokio::fs::File> {
    pub async fn open(path: &Path, schema: Arc<Schema>, delimiter: u8) -> IngestResult<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| IngestError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(file, schema, delimiter))
    }
}

//! Record-oriented reading of subprocess output.
//!
//! yt-dlp redraws its progress line with carriage returns. Splitting only on
//! `\n` would hold every redraw back until the transfer finishes, so records
//! end at either `\r` or `\n`.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Records longer than this are emitted in pieces.
const MAX_RECORD_BYTES: usize = 64 * 1024;

/// Yields trimmed, non-empty text records delimited by `\r` or `\n`.
pub struct RecordReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R> RecordReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
        }
    }

    /// Next record, or `None` at end of stream. Invalid UTF-8 is replaced.
    pub async fn next_record(&mut self) -> io::Result<Option<String>> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                let tail = std::mem::take(&mut self.pending);
                return Ok(to_record(&tail));
            }

            match buf.iter().position(|&b| is_delimiter(b)) {
                Some(idx) => {
                    self.pending.extend_from_slice(&buf[..idx]);
                    self.reader.consume(idx + 1);
                    let record = std::mem::take(&mut self.pending);
                    if let Some(record) = to_record(&record) {
                        return Ok(Some(record));
                    }
                }
                None => {
                    let len = buf.len();
                    self.pending.extend_from_slice(buf);
                    self.reader.consume(len);
                    if self.pending.len() >= MAX_RECORD_BYTES {
                        let record = std::mem::take(&mut self.pending);
                        if let Some(record) = to_record(&record) {
                            return Ok(Some(record));
                        }
                    }
                }
            }
        }
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'\n' | b'\r')
}

fn to_record(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

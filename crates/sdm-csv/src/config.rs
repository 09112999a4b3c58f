//! CSV dialect of rendered and submitted records

use serde::{Deserialize, Serialize};

/// Line ending written after each record; reading accepts either
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordTerminator {
    #[default]
    Crlf,
    Lf,
}

impl RecordTerminator {
    fn to_csv(self) -> csv::Terminator {
        match self {
            Self::Crlf => csv::Terminator::CRLF,
            Self::Lf => csv::Terminator::Any(b'\n'),
        }
    }
}

/// Delimiter, quote and terminator shared by every reader and writer
///
/// Delimiter and quote are single ASCII bytes; a non-ASCII character passed
/// to a builder leaves the previous value in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote: u8,
    pub terminator: RecordTerminator,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            terminator: RecordTerminator::Crlf,
        }
    }
}

fn ascii_byte(c: char) -> Option<u8> {
    u8::try_from(c).ok().filter(u8::is_ascii)
}

impl CsvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = ascii_byte(delimiter).unwrap_or(self.delimiter);
        self
    }

    pub fn quote_char(mut self, quote: char) -> Self {
        self.quote = ascii_byte(quote).unwrap_or(self.quote);
        self
    }

    pub fn record_terminator(mut self, terminator: RecordTerminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Reader for this dialect
    ///
    /// Header rows come back as ordinary records and rows may differ in
    /// width; both are judged against the metadata by the caller.
    pub fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .has_headers(false)
            .flexible(true);
        builder
    }

    /// Writer for this dialect; rows are written at whatever width they have
    pub fn writer_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .flexible(true)
            .terminator(self.terminator.to_csv());
        builder
    }
}

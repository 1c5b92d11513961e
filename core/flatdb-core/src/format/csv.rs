//! Delimited text tables (one `<table>.csv` per table).
//!
//! The first record names the columns. Column types are guessed from the
//! first `sample_size` data records, then the stream is rewound and parsed
//! page by page. Records are normalized by [`RaggedRowReader`] so that missing
//! trailing fields read as empty, and a leading UTF-8 BOM is ignored.
//!
//! A quoted field may hold separators, doubled quotes and line breaks, and
//! always counts as text when guessing. Values past the sample that do not
//! fit their column's type are kept as text.

use crate::config::FormatKind;
use crate::error::FlatDbResult;
use crate::format::guess::{TypeGuesser, widen};
use crate::format::{FormatCapabilities, LoadOptions, SaveOptions, TableFormat};
use crate::provider::SourceProvider;
use crate::stream::{BomSkipReader, RaggedRowReader, ReadSeek, has_open_quote};
use crate::table::{Page, PageSource, RowStream, VirtualTable};
use crate::types::{Column, ColumnType, Row, Value};
use std::borrow::Cow;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use tracing::debug;

type CsvSource = RaggedRowReader<BomSkipReader<Box<dyn ReadSeek>>>;

/// One parsed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub text: String,
    pub quoted: bool,
}

impl Field {
    /// Unquoted empty fields are null.
    fn into_value(self) -> Value {
        if !self.quoted && self.text.is_empty() {
            Value::Null
        } else {
            Value::String(self.text)
        }
    }

    /// Type evidence for guessing; quoted text is always a string.
    fn evidence(&self, guesser: &TypeGuesser) -> Option<ColumnType> {
        if self.quoted {
            Some(ColumnType::String)
        } else {
            guesser.guess_value(&self.text)
        }
    }
}

/// Split one record into fields, honoring `"` quoting and `""` escapes.
pub fn split_record(line: &str, separator: char) -> Vec<Field> {
    let mut fields = Vec::new();
    let mut text = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut at_start = true;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    text.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                text.push(c);
            }
        } else if c == separator {
            fields.push(Field {
                text: std::mem::take(&mut text),
                quoted,
            });
            quoted = false;
            at_start = true;
            continue;
        } else if c == '"' && at_start {
            in_quotes = true;
            quoted = true;
        } else {
            text.push(c);
        }
        at_start = false;
    }
    fields.push(Field { text, quoted });
    fields
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Quote a field when it would not survive `split_record` unchanged.
pub fn escape_field(text: &str, separator: char) -> Cow<'_, str> {
    let needs_quotes = text.is_empty()
        || text.contains(separator)
        || text.contains(['"', '\n', '\r'])
        || text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace);
    if needs_quotes {
        Cow::Owned(quote(text))
    } else {
        Cow::Borrowed(text)
    }
}

/// Like [`escape_field`], but also quotes text that would read back as a
/// number, boolean or date.
pub fn escape_string(text: &str, separator: char) -> Cow<'_, str> {
    let guessed = TypeGuesser::default().guess_value(text);
    if guessed.is_some_and(|ty| ty != ColumnType::String) {
        Cow::Owned(quote(text))
    } else {
        escape_field(text, separator)
    }
}

/// Read one logical record, joining physical lines while a quote is open.
/// Returns the bytes consumed; zero at end of stream.
fn read_record(lines: &mut impl BufRead, record: &mut String) -> io::Result<usize> {
    record.clear();
    let mut read = lines.read_line(record)?;
    while read > 0 && has_open_quote(record.as_bytes(), b'"') {
        let more = lines.read_line(record)?;
        if more == 0 {
            break;
        }
        read += more;
    }
    Ok(read)
}

fn is_blank(record: &str, separator: char) -> bool {
    record.chars().all(|c| c == separator || c.is_whitespace())
}

fn strip_newline(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Comma (or other single-character) separated values.
#[derive(Debug, Clone, Copy)]
pub struct CsvFormat {
    separator: char,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self { separator: ',' }
    }
}

impl CsvFormat {
    pub fn with_separator(separator: char) -> Self {
        Self { separator }
    }

    fn separator_byte(&self) -> u8 {
        u8::try_from(self.separator).unwrap_or(b',')
    }

    /// Header plus type guesses from the first `sample_size` records.
    fn sample_schema(
        &self,
        source: &mut CsvSource,
        options: &LoadOptions,
    ) -> FlatDbResult<Vec<Column>> {
        let mut lines = BufReader::new(source);
        let mut record = String::new();
        if read_record(&mut lines, &mut record)? == 0 {
            return Ok(Vec::new());
        }
        let names: Vec<String> = split_record(strip_newline(&record), self.separator)
            .into_iter()
            .enumerate()
            .map(|(i, f)| {
                let name = f.text.trim();
                if name.is_empty() {
                    format!("Column{}", i + 1)
                } else {
                    name.to_string()
                }
            })
            .collect();

        let guesser = options.guesser;
        let mut evidence: Vec<Option<ColumnType>> = vec![None; names.len()];
        let mut sampled = 0;
        while sampled < options.sample_size {
            if read_record(&mut lines, &mut record)? == 0 {
                break;
            }
            let fields = strip_newline(&record);
            if is_blank(fields, self.separator) {
                continue;
            }
            sampled += 1;
            for (slot, field) in evidence.iter_mut().zip(split_record(fields, self.separator)) {
                if let Some(ty) = field.evidence(&guesser) {
                    *slot = Some(widen(*slot, ty));
                }
            }
        }

        Ok(names
            .into_iter()
            .zip(evidence)
            .map(|(name, ty)| match ty {
                Some(ty) => Column::new(name, ty),
                None => Column::provisional(name, ColumnType::String),
            })
            .collect())
    }
}

impl TableFormat for CsvFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Csv
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            file_mode: false,
            schema_on_first_write: true,
            alter_schema: true,
        }
    }

    fn load(
        &self,
        provider: &dyn SourceProvider,
        table: &str,
        options: &LoadOptions,
    ) -> FlatDbResult<VirtualTable> {
        let stream = provider.open_read(table)?;
        let mut source = RaggedRowReader::new(BomSkipReader::new(stream), self.separator_byte());
        let columns = self.sample_schema(&mut source, options)?;
        if columns.is_empty() {
            return Ok(VirtualTable::empty(table, columns));
        }
        debug!(table, columns = columns.len(), "csv schema sampled");

        source.seek(SeekFrom::Start(0))?;
        let pages = CsvPages {
            lines: BufReader::new(source),
            separator: self.separator,
            columns: columns.clone(),
            header_pending: true,
            record: String::new(),
        };
        Ok(VirtualTable::new(
            table,
            columns,
            RowStream::new(Box::new(pages), options.page_size),
        ))
    }

    fn write_table(
        &self,
        out: &mut (dyn Write + Send),
        table: &VirtualTable,
        _options: &SaveOptions,
    ) -> FlatDbResult<()> {
        if table.columns().is_empty() {
            return Ok(());
        }
        let sep = self.separator.to_string();
        let header: Vec<Cow<'_, str>> = table
            .columns()
            .iter()
            .map(|c| escape_field(&c.name, self.separator))
            .collect();
        writeln!(out, "{}", header.join(&sep))?;

        for row in table.loaded_rows() {
            let fields: Vec<String> = row
                .iter()
                .map(|v| match v {
                    Value::Null => String::new(),
                    Value::String(s) => escape_string(s, self.separator).into_owned(),
                    other => escape_field(&other.to_text(), self.separator).into_owned(),
                })
                .collect();
            writeln!(out, "{}", fields.join(&sep))?;
        }
        Ok(())
    }
}

/// Data records of a rewound CSV stream, parsed against a fixed schema.
struct CsvPages {
    lines: BufReader<CsvSource>,
    separator: char,
    columns: Vec<Column>,
    header_pending: bool,
    record: String,
}

impl CsvPages {
    fn parse(&self, record: &str) -> Row {
        split_record(record, self.separator)
            .into_iter()
            .zip(&self.columns)
            .map(|(field, column)| field.into_value().coerce_or_keep(column.column_type))
            .collect()
    }
}

impl PageSource for CsvPages {
    fn next_page(&mut self, page_size: usize) -> FlatDbResult<Page> {
        let mut page = Page::default();
        while page.records_read < page_size {
            if read_record(&mut self.lines, &mut self.record)? == 0 {
                break;
            }
            if self.header_pending {
                self.header_pending = false;
                continue;
            }
            page.records_read += 1;
            let record = strip_newline(&self.record);
            if is_blank(record, self.separator) {
                continue;
            }
            page.rows.push(self.parse(record));
        }
        Ok(page)
    }
}

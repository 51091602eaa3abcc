//! CSV adapters over the table protocol.
//!
//! `CsvSource` re-opens its file on every iteration, so it is re-iterable like
//! any other table. `CsvWriter` consumes a table through one header-then-rows
//! iteration only.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use reltab_core::{Header, Row, RowStream, Table, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
    infer: bool,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            infer: false,
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Parse numeric-looking fields into ints/floats and empty fields into
    /// missing values instead of keeping every field as text.
    pub fn infer_types(mut self, infer: bool) -> Self {
        self.infer = infer;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Table for CsvSource {
    fn open(&self) -> reltab_core::Result<RowStream> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_path(&self.path)
            .map_err(Error::from)?;
        let mut records = reader.into_records();
        let header = match records.next() {
            None => return Ok(RowStream::header_only(Header::empty())),
            Some(first) => first.map_err(Error::from)?,
        };
        let header: Header = header.iter().collect();
        let infer = self.infer;
        let rows = records.map(move |rec| -> reltab_core::Result<Row> {
            let rec = rec.map_err(Error::from)?;
            Ok(rec.iter().map(|field| parse_field(field, infer)).collect::<Row>())
        });
        Ok(RowStream::new(header, rows))
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}

fn parse_field(field: &str, infer: bool) -> Value {
    if !infer {
        return Value::Text(field.to_string());
    }
    if field.is_empty() {
        return Value::Missing;
    }
    if let Ok(i) = field.parse::<i64>() {
        return Value::Int(i);
    }
    match field.parse::<f64>() {
        Ok(f) => Value::Float(f),
        Err(_) => Value::Text(field.to_string()),
    }
}

pub struct CsvWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvWriter<File> {
    pub fn to_path(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self::to_writer(f, delimiter))
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn to_writer(writer: W, delimiter: u8) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .flexible(true)
                .delimiter(delimiter)
                .from_writer(writer),
        }
    }

    /// Write the header and every data row of one iteration; returns the
    /// number of data rows written. A table without header or rows writes
    /// nothing.
    pub fn write_table(&mut self, table: &dyn Table) -> Result<u64> {
        let stream = table.open()?;
        let header = stream.header().clone();
        let mut wrote_header = false;
        if !header.is_empty() {
            self.writer.write_record(header.iter())?;
            wrote_header = true;
        }
        let mut n = 0u64;
        for row in stream {
            let row = row?;
            if !wrote_header {
                // Rows under an empty header still need a (blank) header line.
                self.writer.write_record(std::iter::once(""))?;
                wrote_header = true;
            }
            self.writer
                .write_record(row.iter().map(|v| v.to_string()))?;
            n += 1;
        }
        self.writer.flush()?;
        Ok(n)
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Storage(format!("flush csv: {}", e.error())))
    }
}

/// Write `table` to a CSV file at `path`.
pub fn write_csv(table: &dyn Table, path: impl AsRef<Path>) -> Result<u64> {
    CsvWriter::to_path(path, b',')?.write_table(table)
}

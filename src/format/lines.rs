//! Line-oriented formats: one record per line, newline-terminated.

use super::{FieldFilter, Format, FormatCtor, RecordSource};
use crate::error::{Error, Result};
use crate::extension::{ArgSpec, Descriptor, ExtensionArgs};
use crate::record::{Payload, Record, Value};

/// One JSON object per line.
pub struct JsonLinesFormat {
    filter: FieldFilter,
}

impl JsonLinesFormat {
    /// Create a json-lines format with an optional field filter.
    pub fn new(filter: FieldFilter) -> Self {
        Self { filter }
    }
}

impl Format for JsonLinesFormat {
    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload> {
        let mut out = String::new();
        for _ in 0..size {
            let record = self.filter.apply(source.next()?);
            out.push_str(&record.to_json());
            out.push('\n');
        }
        Ok(Payload::Text(out))
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}

/// Shared row machinery for the CSV formats.
///
/// Without filters, columns are discovered in order of first appearance
/// across the instance's lifetime; rows written before a column appeared
/// simply have fewer cells. With filters, the column set is fixed and
/// missing fields serialize as empty cells.
struct CsvCore {
    filter: FieldFilter,
    fieldnames: Vec<String>,
}

impl CsvCore {
    fn new(filter: FieldFilter) -> Self {
        let fieldnames = filter.fields().to_vec();
        Self { filter, fieldnames }
    }

    fn cell(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    fn write_row(&mut self, writer: &mut csv::Writer<Vec<u8>>, record: &Record) -> Result<()> {
        if !self.filter.is_active() {
            for key in record.keys() {
                if !self.fieldnames.iter().any(|f| f == key) {
                    self.fieldnames.push(key.clone());
                }
            }
        }
        let cells: Vec<String> = self
            .fieldnames
            .iter()
            .map(|f| record.get(f).map(Self::cell).unwrap_or_default())
            .collect();
        writer
            .write_record(&cells)
            .map_err(|e| Error::Format(e.to_string()))
    }

    fn rows(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        for _ in 0..size {
            let record = source.next()?;
            self.write_row(&mut writer, &record)?;
        }
        into_string(writer)
    }

    fn header(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer
            .write_record(&self.fieldnames)
            .map_err(|e| Error::Format(e.to_string()))?;
        into_string(writer)
    }
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Format(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::Format(e.to_string()))
}

/// Header-less comma-separated rows.
pub struct CsvFormat {
    core: CsvCore,
}

impl Format for CsvFormat {
    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload> {
        Ok(Payload::Text(self.core.rows(source, size)?))
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// CSV with a header line on every batch.
pub struct BatchHeaderedCsvFormat {
    core: CsvCore,
}

impl Format for BatchHeaderedCsvFormat {
    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload> {
        // Rows first: header columns may be discovered from the data.
        let rows = self.core.rows(source, size)?;
        if size == 0 {
            return Ok(Payload::Text(rows));
        }
        Ok(Payload::Text(format!("{}{}", self.core.header()?, rows)))
    }

    fn name(&self) -> &str {
        "batch-headered-csv"
    }
}

/// CSV with a header line on this instance's first non-empty batch.
pub struct HeaderedCsvFormat {
    core: CsvCore,
    header_emitted: bool,
}

impl Format for HeaderedCsvFormat {
    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload> {
        let rows = self.core.rows(source, size)?;
        if size == 0 || self.header_emitted {
            return Ok(Payload::Text(rows));
        }
        self.header_emitted = true;
        Ok(Payload::Text(format!("{}{}", self.core.header()?, rows)))
    }

    fn name(&self) -> &str {
        "headered-csv"
    }
}

fn filters_arg(long: &'static str) -> ArgSpec {
    ArgSpec::value(
        long,
        "<fields>",
        "Comma-separated field selection applied to every record",
    )
}

fn construct_json_lines(args: &ExtensionArgs) -> Result<Box<dyn Format>> {
    Ok(Box::new(JsonLinesFormat::new(FieldFilter::from_args(args))))
}

fn construct_csv(args: &ExtensionArgs) -> Result<Box<dyn Format>> {
    Ok(Box::new(CsvFormat {
        core: CsvCore::new(FieldFilter::from_args(args)),
    }))
}

fn construct_headered_csv(args: &ExtensionArgs) -> Result<Box<dyn Format>> {
    Ok(Box::new(HeaderedCsvFormat {
        core: CsvCore::new(FieldFilter::from_args(args)),
        header_emitted: false,
    }))
}

fn construct_batch_headered_csv(args: &ExtensionArgs) -> Result<Box<dyn Format>> {
    Ok(Box::new(BatchHeaderedCsvFormat {
        core: CsvCore::new(FieldFilter::from_args(args)),
    }))
}

/// Descriptor for the built-in `json-lines` format.
pub fn json_lines_descriptor() -> Descriptor<FormatCtor> {
    Descriptor::new("json-lines", construct_json_lines as FormatCtor)
        .with_args(vec![filters_arg("json-lines-filters")])
}

/// Descriptor for the built-in `csv` format.
pub fn csv_descriptor() -> Descriptor<FormatCtor> {
    Descriptor::new("csv", construct_csv as FormatCtor).with_args(vec![filters_arg("csv-filters")])
}

/// Descriptor for the built-in `headered-csv` format.
pub fn headered_csv_descriptor() -> Descriptor<FormatCtor> {
    Descriptor::new("headered-csv", construct_headered_csv as FormatCtor)
        .with_args(vec![filters_arg("headered-csv-filters")])
}

/// Descriptor for the built-in `batch-headered-csv` format.
pub fn batch_headered_csv_descriptor() -> Descriptor<FormatCtor> {
    Descriptor::new(
        "batch-headered-csv",
        construct_batch_headered_csv as FormatCtor,
    )
    .with_args(vec![filters_arg("batch-headered-csv-filters")])
}

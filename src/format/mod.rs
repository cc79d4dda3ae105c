//! Format extensions: batch serializers.
//!
//! A format consumes `size` records from a [`RecordSource`] and returns
//! one opaque [`Payload`]. The source handed to a format is the scheduler's
//! model-shaped proxy: its `next()` yields records that already went
//! through the producer's mapping chain, so formats drive record
//! consumption without knowing about mappings.

pub mod lines;

use crate::error::{Error, Result};
use crate::extension::ExtensionArgs;
use crate::record::{Payload, Record};

/// Source of records for a format: `next()` yields the following record.
pub trait RecordSource {
    /// Return the next record.
    fn next(&mut self) -> Result<Record>;
}

/// A [`RecordSource`] over an already-built record list.
pub struct VecSource {
    records: std::vec::IntoIter<Record>,
}

impl VecSource {
    /// Wrap a record list.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

impl RecordSource for VecSource {
    fn next(&mut self) -> Result<Record> {
        self.records
            .next()
            .ok_or_else(|| Error::Format("record source exhausted".to_string()))
    }
}

/// A batch serializer.
pub trait Format: Send {
    /// Serialize `size` consecutive records from `source` into one batch.
    ///
    /// `size = 0` must return an empty payload (mediums accept it as a
    /// no-op). Record order in the payload matches `next()` call order.
    fn batch(&mut self, source: &mut dyn RecordSource, size: usize) -> Result<Payload>;

    /// Get the name of this format (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Constructor type for format extensions.
pub type FormatCtor = fn(&ExtensionArgs) -> Result<Box<dyn Format>>;

/// Field selection shared by the line formats.
///
/// An empty filter passes records through; a non-empty one projects and
/// orders the listed fields.
#[derive(Debug, Clone, Default)]
pub struct FieldFilter {
    fields: Vec<String>,
}

impl FieldFilter {
    /// Build from an extension's `filters` attribute (`a,b,c`).
    pub fn from_args(args: &ExtensionArgs) -> Self {
        let fields = args
            .get_str("filters")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self { fields }
    }

    /// The selected fields, empty when filtering is off.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Check whether filtering is active.
    pub fn is_active(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Project a record; fields missing from the record are omitted.
    pub fn apply(&self, record: Record) -> Record {
        if self.fields.is_empty() {
            return record;
        }
        self.fields
            .iter()
            .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }
}

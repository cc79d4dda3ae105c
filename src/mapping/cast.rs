//! Timestamp cast mappings.

use chrono::DateTime;

use super::{Mapping, MappingCtor};
use crate::error::Result;
use crate::extension::{Descriptor, ExtensionArgs};
use crate::record::{Record, Value};

fn is_timestamp_field(key: &str) -> bool {
    key == "ctime" || key.ends_with("_ts")
}

/// Convert numeric epoch fields (`ctime`, `*_ts`) to RFC 3339 strings.
pub struct TsToIso;

impl Mapping for TsToIso {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>> {
        for (key, value) in record.iter_mut() {
            if !is_timestamp_field(key) {
                continue;
            }
            if let Some(secs) = value.as_f64() {
                let whole = secs.trunc() as i64;
                let nanos = (secs.fract().abs() * 1e9) as u32;
                if let Some(dt) = DateTime::from_timestamp(whole, nanos) {
                    *value = Value::String(dt.to_rfc3339());
                }
            }
        }
        Ok(Some(record))
    }

    fn name(&self) -> &str {
        "ts-to-iso"
    }
}

/// Convert RFC 3339 string values back to epoch seconds.
pub struct TsToEpoch;

impl Mapping for TsToEpoch {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>> {
        for (_, value) in record.iter_mut() {
            let Value::String(text) = &*value else {
                continue;
            };
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                let secs = dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9;
                *value = serde_json::json!(secs);
            }
        }
        Ok(Some(record))
    }

    fn name(&self) -> &str {
        "ts-to-epoch"
    }
}

fn construct_ts_to_iso(_args: &ExtensionArgs) -> Result<Box<dyn Mapping>> {
    Ok(Box::new(TsToIso))
}

fn construct_ts_to_epoch(_args: &ExtensionArgs) -> Result<Box<dyn Mapping>> {
    Ok(Box::new(TsToEpoch))
}

/// Descriptor for the built-in `ts-to-iso` mapping.
pub fn ts_to_iso_descriptor() -> Descriptor<MappingCtor> {
    Descriptor::new("ts-to-iso", construct_ts_to_iso as MappingCtor)
}

/// Descriptor for the built-in `ts-to-epoch` mapping.
pub fn ts_to_epoch_descriptor() -> Descriptor<MappingCtor> {
    Descriptor::new("ts-to-epoch", construct_ts_to_epoch as MappingCtor)
}

//! A sample model, just for testing pipelines end to end.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{Model, ModelCtor};
use crate::error::Result;
use crate::extension::{Descriptor, ExtensionArgs};
use crate::record::Record;

static INSTANCE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Emits `{_id, _ts, _ms}` records; `_id` carries a process-wide instance
/// number so parallel producers are distinguishable at the sink.
pub struct TestModel {
    id: u32,
}

impl TestModel {
    /// Create a new instance with the next process-wide id.
    pub fn new() -> Self {
        Self {
            id: INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }
}

impl Default for TestModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for TestModel {
    fn next(&mut self) -> Result<Record> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let mut record = Record::new();
        record.insert("_id", format!("test{}", self.id));
        record.insert("_ts", now.as_secs());
        record.insert("_ms", now.subsec_micros());
        Ok(record)
    }

    fn name(&self) -> &str {
        "test"
    }
}

fn construct(_args: &ExtensionArgs) -> Result<Box<dyn Model>> {
    Ok(Box::new(TestModel::new()))
}

/// Descriptor for the built-in `test` model.
pub fn descriptor() -> Descriptor<ModelCtor> {
    Descriptor::new("test", construct as ModelCtor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_shape() {
        let mut model = TestModel::new();
        let record = model.next().unwrap();
        assert!(record
            .get("_id")
            .and_then(|v| v.as_str())
            .unwrap()
            .starts_with("test"));
        assert!(record.get("_ts").unwrap().is_number());
        assert!(record.get("_ms").unwrap().is_number());
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_instances_get_distinct_ids() {
        let mut a = TestModel::new();
        let mut b = TestModel::new();
        let id_a = a.next().unwrap().get("_id").unwrap().clone();
        let id_b = b.next().unwrap().get("_id").unwrap().clone();
        assert_ne!(id_a, id_b);
    }
}

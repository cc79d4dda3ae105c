//! Bidirectional network-flow record model.
//!
//! Flows have a lifecycle: a new flow may stay pending and receive update
//! records (growing counters, refreshed timestamps) until a later record
//! terminates it. Roughly half of all records are updates once the pending
//! table has entries.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};

use super::template::{epoch_now, random_ip};
use super::{Model, ModelCtor};
use crate::error::{Error, Result};
use crate::extension::{ArgSpec, Descriptor, ExtensionArgs};
use crate::record::{Record, Value};

static SENSOR_COUNTER: AtomicU32 = AtomicU32::new(0);

const MAX_PENDING: usize = 100;

const DEFAULT_METADATA_KEYS: [&str; 4] = ["app", "device", "site", "user"];

/// Synthetic flow-record generator.
#[derive(Debug)]
pub struct RFlowModel {
    sensor_id: u32,
    session_count: u32,
    next_flow_id: u64,
    pending: Vec<Record>,
    metadata_keys: Vec<String>,
    rng: StdRng,
}

impl RFlowModel {
    /// Create a model; `metadata_file` optionally supplies the metadata
    /// key list as a file of quoted tokens.
    pub fn new(metadata_file: Option<&str>) -> Result<Self> {
        let metadata_keys = match metadata_file {
            Some(path) => load_metadata_keys(path)?,
            None => DEFAULT_METADATA_KEYS.iter().map(|s| s.to_string()).collect(),
        };

        let mut rng = StdRng::from_os_rng();
        Ok(Self {
            sensor_id: SENSOR_COUNTER.fetch_add(1, Ordering::Relaxed) + 1,
            session_count: rng.random_range(1..=0xf),
            next_flow_id: 0,
            pending: Vec::new(),
            metadata_keys,
            rng,
        })
    }

    fn attach_metadata(&mut self, record: &mut Record) {
        let count = self.rng.random_range(0..=self.metadata_keys.len());
        for index in 0..count {
            let key = self.metadata_keys[index].clone();
            record.insert(key, "sample-bytes");
        }
    }

    fn new_flow(&mut self) -> Record {
        let flow_id = self.next_flow_id;
        self.next_flow_id += 1;

        let first_byte_ts = epoch_now();
        let last_byte_ts = first_byte_ts + f64::from(self.rng.random_range(0..0xfffu32));

        let packet_no_send: u64 = self.rng.random_range(0..=0xffff_ffff_ffff);
        let packet_no_recv: u64 = self.rng.random_range(0..=0xffff_ffff_ffff);
        let volume_send = packet_no_send * self.rng.random_range(1400..=1550);
        let volume_recv = packet_no_recv * self.rng.random_range(1400..=1550);

        let terminated =
            self.rng.random_range(0..4) != 3 || self.pending.len() >= MAX_PENDING;

        let mut record = Record::new();
        record.insert("flow_id", flow_id);
        record.insert("session_id", self.rng.random_range(0..self.session_count));
        record.insert("src_ip", random_ip(&mut self.rng));
        record.insert("src_port", self.rng.random_range(0..=0xffffu32));
        record.insert("dst_ip", random_ip(&mut self.rng));
        record.insert("dst_port", self.rng.random_range(0..=0xffffu32));
        record.insert("l4_protocol", self.rng.random_range(0..=142u32));
        record.insert("l7_protocol", self.rng.random_range(0..=2988u32));
        record.insert("input_if_id", self.rng.random_range(0..=0xffff_ffffu64));
        record.insert("output_if_id", self.rng.random_range(0..=0xffff_ffffu64));
        record.insert("first_byte_ts", first_byte_ts);
        record.insert("last_byte_ts", last_byte_ts);
        record.insert("packet_no_send", packet_no_send);
        record.insert("packet_no_recv", packet_no_recv);
        record.insert("volume_send", volume_send);
        record.insert("volume_recv", volume_recv);
        record.insert("sensor_id", self.sensor_id);
        record.insert("flow_terminated", terminated);
        record.insert("protocol_data_send", self.rng.random_range(0..=1u32));
        record.insert("protocol_data_recv", self.rng.random_range(0..=1u32));

        if !terminated {
            self.pending.push(record.clone());
        }

        self.attach_metadata(&mut record);
        record
    }

    fn update_pending(&mut self, index: usize) -> Record {
        let add_secs = f64::from(self.rng.random_range(0..0xfffu32));
        let add_send: u64 = self.rng.random_range(0..=0xff_ffff);
        let add_recv: u64 = self.rng.random_range(0..=0xff_ffff);
        let volume_send = add_send * self.rng.random_range(1400..=1550);
        let volume_recv = add_recv * self.rng.random_range(1400..=1550);
        let terminate = self.rng.random_range(0..4) == 3;

        {
            let flow = &mut self.pending[index];
            bump_f64(flow, "last_byte_ts", add_secs);
            bump_u64(flow, "packet_no_send", add_send);
            bump_u64(flow, "packet_no_recv", add_recv);
            bump_u64(flow, "volume_send", volume_send);
            bump_u64(flow, "volume_recv", volume_recv);
        }

        let mut record = if terminate {
            let mut flow = self.pending.swap_remove(index);
            flow.insert("flow_terminated", true);
            flow
        } else {
            self.pending[index].clone()
        };

        self.attach_metadata(&mut record);
        record
    }
}

fn bump_u64(record: &mut Record, key: &str, add: u64) {
    let current = record.get(key).and_then(Value::as_u64).unwrap_or(0);
    record.insert(key, current + add);
}

fn bump_f64(record: &mut Record, key: &str, add: f64) {
    let current = record.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    record.insert(key, current + add);
}

fn load_metadata_keys(path: &str) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read metadata file {path:?}: {e}")))?;

    let mut keys = Vec::new();
    let mut rest = content.as_str();
    while let Some(open) = rest.find('"') {
        rest = &rest[open + 1..];
        match rest.find('"') {
            Some(close) => {
                let token = &rest[..close];
                if !token.is_empty() && !token.contains(char::is_whitespace) {
                    keys.push(token.to_string());
                }
                rest = &rest[close + 1..];
            }
            None => break,
        }
    }

    if keys.is_empty() {
        return Err(Error::Config(format!(
            "metadata file {path:?} contains no quoted keys"
        )));
    }
    Ok(keys)
}

impl Model for RFlowModel {
    fn next(&mut self) -> Result<Record> {
        if !self.pending.is_empty() && self.rng.random_range(0..2) == 1 {
            let index = self.rng.random_range(0..self.pending.len());
            return Ok(self.update_pending(index));
        }
        Ok(self.new_flow())
    }

    fn name(&self) -> &str {
        "rflow"
    }
}

fn construct(args: &ExtensionArgs) -> Result<Box<dyn Model>> {
    let metadata_file = args.get_str("metadata_file");
    Ok(Box::new(RFlowModel::new(metadata_file.as_deref())?))
}

/// Descriptor for the built-in `rflow` model.
pub fn descriptor() -> Descriptor<ModelCtor> {
    Descriptor::new("rflow", construct as ModelCtor).with_args(vec![ArgSpec::value(
        "rflow-metadata-file",
        "<file>",
        "File of quoted tokens used as flow metadata keys",
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flow_record_shape() {
        let mut model = RFlowModel::new(None).unwrap();
        let record = model.next().unwrap();
        assert!(record.contains_key("flow_id"));
        assert!(record.contains_key("src_ip"));
        assert!(record.contains_key("flow_terminated"));
        assert!(record.get("sensor_id").unwrap().as_u64().unwrap() >= 1);
    }

    #[test]
    fn test_flow_ids_increase_for_new_flows() {
        let mut model = RFlowModel::new(None).unwrap();
        let mut max_seen = 0;
        for _ in 0..50 {
            let record = model.next().unwrap();
            let id = record.get("flow_id").unwrap().as_u64().unwrap();
            max_seen = max_seen.max(id);
        }
        assert!(max_seen >= 1);
        assert!(model.pending.len() <= MAX_PENDING);
    }

    #[test]
    fn test_metadata_file_loading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"keys=("alpha" "beta" "gamma")"#).unwrap();
        let keys = load_metadata_keys(file.path().to_str().unwrap()).unwrap();
        assert_eq!(keys, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_missing_metadata_file_is_config_error() {
        let err = RFlowModel::new(Some("/nonexistent/metadata")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}

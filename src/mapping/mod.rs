//! Mapping extensions: record transforms.
//!
//! A mapping takes a record and returns it unchanged, modified, or `None`
//! to drop it from the stream. Producers apply a [`MappingChain`] built
//! from their brace-list URIs (first, in declared order) followed by the
//! global `--map` arguments.
//!
//! A chain entry is either the title of a registered mapping extension or
//! a `file://` URL loading an inline transform program (see [`inline`]).

pub mod cast;
pub mod inline;

use crate::error::Result;
use crate::extension::{ExtensionArgs, Registry};
use crate::record::Record;

/// A record transform.
pub trait Mapping: Send {
    /// Map a record. Return `Ok(None)` to drop it from the stream.
    fn map(&mut self, record: Record) -> Result<Option<Record>>;

    /// Get the name of this mapping (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl std::fmt::Debug for dyn Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping").field("name", &self.name()).finish()
    }
}

/// Constructor type for mapping extensions.
pub type MappingCtor = fn(&ExtensionArgs) -> Result<Box<dyn Mapping>>;

/// Resolve a chain entry: a registered title or a `file://` program URL.
pub fn resolve(
    registry: &Registry,
    uri: &str,
    args_lookup: &dyn Fn(&str) -> ExtensionArgs,
) -> Result<Box<dyn Mapping>> {
    if let Some(descriptor) = registry.mapping(uri) {
        return (descriptor.ctor)(&args_lookup(uri));
    }
    if uri.starts_with("file://") {
        return Ok(Box::new(inline::load(uri)?));
    }
    Err(crate::error::Error::Config(format!(
        "unknown mapping {uri:?} (not a registered title or file:// URL)"
    )))
}

/// An ordered chain of mappings applied to each record.
#[derive(Default)]
pub struct MappingChain {
    stages: Vec<Box<dyn Mapping>>,
}

impl MappingChain {
    /// Create an empty (identity) chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chain from resolved stages.
    pub fn from_stages(stages: Vec<Box<dyn Mapping>>) -> Self {
        Self { stages }
    }

    /// Append a stage.
    pub fn push(&mut self, stage: Box<dyn Mapping>) {
        self.stages.push(stage);
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if this is the identity chain.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Apply all stages in order. A stage returning `None` drops the
    /// record and short-circuits the rest of the chain; a stage error is
    /// tagged with the stage's name.
    pub fn apply(&mut self, record: Record) -> Result<Option<Record>> {
        let mut current = record;
        for stage in &mut self.stages {
            match stage.map(current) {
                Ok(Some(next)) => current = next,
                Ok(None) => return Ok(None),
                Err(e) => {
                    return Err(crate::error::Error::Mapping(format!(
                        "{}: {e}",
                        stage.name()
                    )))
                }
            }
        }
        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AddField(&'static str);
    impl Mapping for AddField {
        fn map(&mut self, mut record: Record) -> Result<Option<Record>> {
            record.insert(self.0, true);
            Ok(Some(record))
        }
    }

    struct DropAll;
    impl Mapping for DropAll {
        fn map(&mut self, _record: Record) -> Result<Option<Record>> {
            Ok(None)
        }
    }

    #[test]
    fn test_identity_chain_passes_through() {
        let mut chain = MappingChain::new();
        let mut record = Record::new();
        record.insert("x", 1);
        let out = chain.apply(record.clone()).unwrap().unwrap();
        assert_eq!(out, record);
    }

    #[test]
    fn test_stages_apply_in_order() {
        let mut chain = MappingChain::from_stages(vec![
            Box::new(AddField("first")),
            Box::new(AddField("second")),
        ]);
        let out = chain.apply(Record::new()).unwrap().unwrap();
        let keys: Vec<_> = out.keys().cloned().collect();
        assert_eq!(keys, vec!["first", "second"]);
    }

    #[test]
    fn test_drop_short_circuits() {
        let mut chain = MappingChain::from_stages(vec![
            Box::new(DropAll),
            Box::new(AddField("never")),
        ]);
        assert!(chain.apply(Record::new()).unwrap().is_none());
    }

    #[test]
    fn test_resolve_unknown_title() {
        let registry = Registry::with_builtins();
        let err = resolve(&registry, "nope", &|_| ExtensionArgs::new()).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_resolve_registered_title() {
        let registry = Registry::with_builtins();
        let mut mapping = resolve(&registry, "ts-to-iso", &|_| ExtensionArgs::new()).unwrap();
        let mut record = Record::new();
        record.insert("_ts", 0);
        let out = mapping.map(record).unwrap().unwrap();
        assert_eq!(out.get("_ts").unwrap(), &json!("1970-01-01T00:00:00+00:00"));
    }
}

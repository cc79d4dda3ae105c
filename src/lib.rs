//! # Avalon
//!
//! An extendable, high-throughput streaming test-data generator.
//!
//! Avalon synthesizes records that imitate real system outputs (IDS logs,
//! firewall logs, network flows) at a controlled rate, transforms them
//! through mapping chains, serializes them in batches, and delivers them
//! to a sink through parallel writers with back-pressure.
//!
//! ## Features
//!
//! - **Five extension families**: models, mappings, formats, mediums, and
//!   lifecycle generics, bound together by an explicit registry
//! - **Weighted fan-out**: `10snort1000` runs ten producers sharing an
//!   emission ratio of 1000 against the other producer groups
//! - **Global governors**: a records-per-second token bucket and an exact
//!   `--number` budget that counts delivered records
//! - **Bounded writer pool**: a full sink stalls producers instead of
//!   buffering without limit
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use avalon::extension::{Family, Registry, ExtensionArgs};
//! use avalon::scheduler::{Pipeline, PipelineConfig};
//! use avalon::spec::parse_producer_spec;
//!
//! let registry = Registry::with_builtins();
//! let config = PipelineConfig {
//!     specs: vec![parse_producer_spec("2snort3").unwrap()],
//!     number: Some(1000),
//!     ..PipelineConfig::default()
//! };
//! let no_args = |_: Family, _: &str| ExtensionArgs::new();
//! let medium = (registry.medium("file").unwrap().ctor)(&ExtensionArgs::new()).unwrap();
//! let report = Pipeline::build(&registry, config, &no_args, medium)
//!     .unwrap()
//!     .run()
//!     .unwrap();
//! assert_eq!(report.emitted, 1000);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod extension;
pub mod format;
pub mod mapping;
pub mod medium;
pub mod model;
pub mod record;
pub mod scheduler;
pub mod spec;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::extension::{ArgSpec, ArgValue, Descriptor, ExtensionArgs, Family, Registry};
    pub use crate::format::{Format, RecordSource};
    pub use crate::mapping::{Mapping, MappingChain};
    pub use crate::medium::Medium;
    pub use crate::model::Model;
    pub use crate::record::{Payload, Record, Value};
    pub use crate::scheduler::{Pipeline, PipelineConfig, RunReport};
    pub use crate::spec::{parse_producer_spec, ProducerSpec};
}

pub use error::{Error, Result};

//! Model extensions: record producers.
//!
//! A model is an unbounded lazy sequence of [`Record`]s. Each producer
//! worker owns its own model instance; models are never shared across
//! workers and therefore need no internal synchronization.
//!
//! Built-in models:
//!
//! - [`test`] — minimal id/timestamp records
//! - [`snort`] — IDS alert logs (template engine)
//! - [`asa`] — firewall logs (template engine)
//! - [`rflow`] — bidirectional network-flow records with a lifecycle

pub mod asa;
pub mod rflow;
pub mod snort;
pub mod template;
pub mod test;

use crate::error::Result;
use crate::extension::ExtensionArgs;
use crate::record::Record;

/// A record producer.
pub trait Model: Send {
    /// Return the next generated record.
    fn next(&mut self) -> Result<Record>;

    /// Get the name of this model (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Constructor type for model extensions.
pub type ModelCtor = fn(&ExtensionArgs) -> Result<Box<dyn Model>>;

//! Medium extensions: batch delivery to sinks.
//!
//! A medium owns the connection to its sink and is shared by every writer
//! slot; concurrent `write` calls are the writer pool's parallelism, so
//! mediums serialize internally only where their sink demands it. Retries
//! appropriate to the protocol happen inside the medium; an exhausted or
//! non-retriable failure surfaces as [`crate::error::Error::MediumWrite`]
//! and the pool applies the pipeline error policy.

pub mod file;
pub mod http;
pub mod syslog;

use std::sync::Arc;

use crate::error::Result;
use crate::extension::{ExtensionArgs, Registry};
use crate::record::Payload;

/// A batch sink.
pub trait Medium: Send + Sync {
    /// Deliver one batch. Empty payloads are accepted as a no-op.
    fn write(&self, payload: &Payload) -> Result<()>;

    /// Get the name of this medium (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Constructor type for medium extensions.
pub type MediumCtor = fn(&ExtensionArgs) -> Result<Arc<dyn Medium>>;

/// Pick the medium for an invocation without an explicit `--output-media`.
///
/// Scans mediums in registration order and selects the one whose argument
/// namespace the user populated; when several qualify, the one whose
/// argument appeared earliest on the command line wins. Falls back to the
/// stdout-backed `file` medium.
pub fn auto_select(
    registry: &Registry,
    args_lookup: &dyn Fn(&str) -> ExtensionArgs,
) -> &'static str {
    let mut best: Option<(usize, &'static str)> = None;
    for descriptor in registry.mediums() {
        if let Some(index) = args_lookup(descriptor.title).earliest_user_index() {
            let better = match best {
                Some((best_index, _)) => index < best_index,
                None => true,
            };
            if better {
                best = Some((index, descriptor.title));
            }
        }
    }
    best.map(|(_, title)| title).unwrap_or("file")
}

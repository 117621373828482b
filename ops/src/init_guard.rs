use std::sync::Arc;

use core_types::Status as EngineStatus;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

/// Serializes first-use registration per tensor name.
///
/// Each name owns an independently locked cell, so registering one tensor
/// never blocks callers working on another.
#[derive(Default)]
pub struct TensorInitGuard {
    cells: DashMap<String, Arc<Mutex<()>>>,
}

impl TensorInitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, name: &str) -> Arc<Mutex<()>> {
        if let Some(cell) = self.cells.get(name) {
            return Arc::clone(cell.value());
        }
        Arc::clone(self.cells.entry(name.to_string()).or_default().value())
    }

    /// Run `register` unless `is_registered` reports the name as known.
    ///
    /// Both closures run under the name's lock. Returns `Ok(true)` when this
    /// call performed the registration.
    pub fn ensure_registered(
        &self,
        name: &str,
        is_registered: impl FnOnce() -> bool,
        register: impl FnOnce() -> EngineStatus,
    ) -> Result<bool, EngineStatus> {
        let cell = self.cell(name);
        let _held = cell.lock();
        if is_registered() {
            return Ok(false);
        }
        debug!(tensor = %name, "registering tensor");
        let status = register();
        if status.is_ok() { Ok(true) } else { Err(status) }
    }
}

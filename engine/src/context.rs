use std::fmt;

use parking_lot::Mutex;

use core_types::{DataType, DeviceId};

/// Layout fixed at registration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TensorSpec {
    pub size:   usize,
    pub device: DeviceId,
    pub dtype:  DataType,
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes of {} on device {}", self.size, self.dtype.name(), self.device)
    }
}

/// Engine-side state for one logical tensor name.
#[derive(Debug)]
pub struct TensorContext {
    name: String,
    key:  u64,
    spec: Mutex<Option<TensorSpec>>,
}

impl TensorContext {
    /// `key` is the declaration order of the name within the engine.
    pub fn new(name: impl Into<String>, key: u64) -> Self {
        Self { name: name.into(), key, spec: Mutex::new(None) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn spec(&self) -> Option<TensorSpec> {
        *self.spec.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.spec.lock().is_some()
    }

    /// Fix the layout. Re-initializing with the same layout is a no-op;
    /// a different layout is refused and the existing one returned.
    pub fn initialize(&self, spec: TensorSpec) -> Result<(), TensorSpec> {
        let mut slot = self.spec.lock();
        match *slot {
            None => {
                *slot = Some(spec);
                Ok(())
            }
            Some(existing) if existing == spec => Ok(()),
            Some(existing) => Err(existing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_once_then_reject_mismatch() {
        let ctx = TensorContext::new("grad1", 0);
        let spec = TensorSpec { size: 64, device: -1, dtype: DataType::Float32 };
        assert!(!ctx.is_initialized());

        assert_eq!(ctx.initialize(spec), Ok(()));
        assert_eq!(ctx.initialize(spec), Ok(()));

        let other = TensorSpec { size: 16, ..spec };
        assert_eq!(ctx.initialize(other), Err(spec));
        assert_eq!(ctx.spec(), Some(spec));
        assert_eq!(spec.to_string(), "64 bytes of Float32 on device -1");
    }
}

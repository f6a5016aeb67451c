//! Type-Handler Registry and plug-in contract (design §4.4).
//!
//! A type handler is anything implementing the four-hook [`TypeHandler`]
//! trait. The registry resolves an `nf_type` token to a handler; in the
//! original this was a dynamic module-name lookup, here it is a
//! compile-time table the caller populates (design §9, "Dynamic plug-in
//! dispatch").

mod default;

pub use default::DefaultHandler;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::attrs::Attr;
use crate::error::NfioResult;
use crate::hypervisor::HypervisorDriver;
use crate::lifecycle::LifecycleCoordinator;

/// Everything a handler hook needs beyond the path itself: the backing
/// root, the driver for per-read stats, and the coordinator for
/// lifecycle-triggering writes.
pub struct HandlerContext {
    pub root: std::path::PathBuf,
    pub driver: Arc<dyn HypervisorDriver>,
    pub lifecycle: Arc<LifecycleCoordinator>,
    pub ambient_user: String,
}

/// The four-hook plug-in contract every VNF type handler implements
/// (design §4.4).
#[async_trait]
pub trait TypeHandler: Send + Sync {
    /// Called when an instance directory is created under this type.
    async fn on_mkdir(&self, ctx: &HandlerContext, instance_path: &Path, mode: u32) -> NfioResult<()>;

    /// Return the attribute record for `path`, overriding `size` for
    /// special files as design §3 requires.
    async fn on_getattr(&self, ctx: &HandlerContext, path: &Path) -> NfioResult<Attr>;

    /// Service a read. `Some(bytes)` means the handler fully serviced the
    /// call (the dispatcher applies the EOF-on-offset rule from design
    /// §4.1); `None` means fall through to a plain `pread` on the backing
    /// file.
    async fn on_read(
        &self,
        ctx: &HandlerContext,
        path: &Path,
        len: usize,
        offset: u64,
    ) -> NfioResult<Option<Vec<u8>>>;

    /// Service a write. `Some(n)` means the handler fully serviced the call
    /// and `n` bytes were conceptually consumed; `None` means fall through
    /// to a plain write on the backing file.
    async fn on_write(
        &self,
        ctx: &HandlerContext,
        path: &Path,
        buf: &[u8],
        offset: u64,
    ) -> NfioResult<Option<usize>>;
}

/// Maps an `nf_type` token to its handler. Lookup failure is the
/// dispatcher's cue to surface `ENOSYS` (design §4.4).
#[derive(Default)]
pub struct TypeHandlerRegistry {
    handlers: HashMap<String, Arc<dyn TypeHandler>>,
}

impl TypeHandlerRegistry {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register(&mut self, nf_type: impl Into<String>, handler: Arc<dyn TypeHandler>) {
        self.handlers.insert(nf_type.into(), handler);
    }

    pub fn resolve(&self, nf_type: &str) -> Option<Arc<dyn TypeHandler>> {
        self.handlers.get(nf_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_returns_none_for_unregistered_type() {
        let registry = TypeHandlerRegistry::new();
        assert!(registry.resolve("firewall").is_none());
    }

    #[test]
    fn resolve_returns_registered_handler() {
        let mut registry = TypeHandlerRegistry::new();
        registry.register("firewall", Arc::new(DefaultHandler));
        assert!(registry.resolve("firewall").is_some());
        assert!(registry.resolve("nginx").is_none());
    }
}

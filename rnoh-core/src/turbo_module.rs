//! Turbo modules exposed to JS.
//!
//! Packages register [`TurboModuleFactoryDelegate`]s; the
//! [`TurboModuleProvider`] asks them in registration order and caches the
//! first module produced for a name.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use serde_json::Value;
use tracing::debug;

use crate::error::RnohResult;

/// A native module callable from JS.
pub trait TurboModule: Send + Sync {
    /// Name JS uses to look the module up.
    fn name(&self) -> &str;

    /// Invokes `method` with JSON arguments.
    fn call(&self, method: &str, args: &[Value]) -> RnohResult<Value>;
}

/// Creates turbo modules by name.
pub trait TurboModuleFactoryDelegate: Send + Sync {
    /// Returns a module for `name`, or `None` when this delegate doesn't
    /// provide it.
    fn create(&self, name: &str) -> Option<Arc<dyn TurboModule>>;
}

/// Resolves and caches turbo modules.
pub struct TurboModuleProvider {
    delegates: Vec<Arc<dyn TurboModuleFactoryDelegate>>,
    cache: Mutex<HashMap<String, Arc<dyn TurboModule>>>,
}

impl TurboModuleProvider {
    /// Creates a provider over `delegates`.
    pub fn new(delegates: Vec<Arc<dyn TurboModuleFactoryDelegate>>) -> Self {
        Self {
            delegates,
            cache: Mutex::new(HashMap::default()),
        }
    }

    /// Returns the module registered under `name`.
    pub fn get_turbo_module(&self, name: &str) -> Option<Arc<dyn TurboModule>> {
        if let Some(module) = self.cache.lock().get(name) {
            return Some(Arc::clone(module));
        }
        let module = self
            .delegates
            .iter()
            .find_map(|delegate| delegate.create(name));
        match &module {
            Some(module) => {
                debug!(name, "turbo module created");
                // A concurrent lookup may have won; keep the first module.
                let mut cache = self.cache.lock();
                let cached = cache
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::clone(module));
                return Some(Arc::clone(cached));
            }
            None => debug!(name, "no turbo module"),
        }
        module
    }

    /// Number of modules created so far.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}

impl fmt::Debug for TurboModuleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurboModuleProvider")
            .field("delegates", &self.delegates.len())
            .field("cached", &self.cached_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use serde_json::{Value, json};

    use super::{TurboModule, TurboModuleFactoryDelegate, TurboModuleProvider};
    use crate::error::{RnohError, RnohResult};

    struct DeviceInfo;

    impl TurboModule for DeviceInfo {
        fn name(&self) -> &str {
            "DeviceInfo"
        }

        fn call(&self, method: &str, _args: &[Value]) -> RnohResult<Value> {
            match method {
                "getConstants" => Ok(json!({ "scale": 3.0 })),
                _ => Err(RnohError::TurboModule {
                    name: self.name().to_string(),
                    reason: format!("unknown method {method}"),
                }),
            }
        }
    }

    #[derive(Default)]
    struct CountingDelegate {
        created: AtomicUsize,
    }

    impl TurboModuleFactoryDelegate for CountingDelegate {
        fn create(&self, name: &str) -> Option<Arc<dyn TurboModule>> {
            (name == "DeviceInfo").then(|| {
                self.created.fetch_add(1, Ordering::SeqCst);
                Arc::new(DeviceInfo) as Arc<dyn TurboModule>
            })
        }
    }

    #[test]
    fn modules_are_created_once() {
        let delegate = Arc::new(CountingDelegate::default());
        let provider = TurboModuleProvider::new(vec![delegate.clone()]);
        let first = provider.get_turbo_module("DeviceInfo").expect("module");
        let second = provider.get_turbo_module("DeviceInfo").expect("module");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(delegate.created.load(Ordering::SeqCst), 1);
        assert_eq!(
            first.call("getConstants", &[]).expect("constants")["scale"],
            json!(3.0)
        );
        assert!(first.call("vibrate", &[]).is_err());
    }

    #[test]
    fn unknown_module_is_none() {
        let provider = TurboModuleProvider::new(vec![Arc::new(CountingDelegate::default())]);
        assert!(provider.get_turbo_module("Clipboard").is_none());
        assert_eq!(provider.cached_count(), 0);
    }
}

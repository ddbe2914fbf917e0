//! The tool registry.
//!
//! Holds every known [`ToolManifest`] and lazily materializes the
//! implementation behind a manifest the first time it is needed.
//! Implementations are resolved through a static factory table keyed by
//! the manifest's locator (`path`) or, failing that, its name.
//!
//! The registry is an explicit instance shared behind an `Arc`; there is
//! no process-wide singleton.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use toolflow_core::error::{Error, Result, ToolError};
use toolflow_core::tool::{Tool, ToolManifest};
use tracing::{debug, info, warn};

/// Builds the implementation for a manifest.
#[async_trait]
pub trait ToolFactory: Send + Sync {
    async fn build(&self, manifest: &ToolManifest) -> std::result::Result<Arc<dyn Tool>, ToolError>;
}

/// Adapter turning a synchronous closure into a [`ToolFactory`].
pub struct FnFactory<F>(pub F);

#[async_trait]
impl<F> ToolFactory for FnFactory<F>
where
    F: Fn(&ToolManifest) -> std::result::Result<Arc<dyn Tool>, ToolError> + Send + Sync,
{
    async fn build(&self, manifest: &ToolManifest) -> std::result::Result<Arc<dyn Tool>, ToolError> {
        (self.0)(manifest)
    }
}

/// Hands out one pre-built instance.
struct InstanceFactory(Arc<dyn Tool>);

#[async_trait]
impl ToolFactory for InstanceFactory {
    async fn build(&self, _manifest: &ToolManifest) -> std::result::Result<Arc<dyn Tool>, ToolError> {
        Ok(self.0.clone())
    }
}

type LoadSlot = Arc<OnceCell<Arc<dyn Tool>>>;

/// A registry of available tools.
///
/// The executor uses this to:
/// 1. List manifests (cheap, never loads anything)
/// 2. Load an implementation on first invocation and reuse it afterwards
pub struct ToolRegistry {
    manifests: RwLock<HashMap<String, ToolManifest>>,
    factories: RwLock<HashMap<String, Arc<dyn ToolFactory>>>,
    /// One slot per tool name. Concurrent loads of the same name share the
    /// slot, so the factory runs at most once per successful load.
    loaded: Mutex<HashMap<String, LoadSlot>>,
    manifest_file: String,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            manifests: RwLock::new(HashMap::new()),
            factories: RwLock::new(HashMap::new()),
            loaded: Mutex::new(HashMap::new()),
            manifest_file: "tools.json".into(),
        }
    }

    /// Override the manifest file name looked up in directory sources.
    pub fn with_manifest_file(mut self, name: impl Into<String>) -> Self {
        self.manifest_file = name.into();
        self
    }

    // ── Registration ──────────────────────────────────────────────────

    /// Insert or overwrite a manifest.
    ///
    /// Overwriting evicts any cached implementation of that name so the
    /// next load resolves against the new manifest.
    pub fn register(&self, manifest: ToolManifest) -> Result<()> {
        validate_manifest(&manifest)?;
        let name = manifest.name.clone();
        let replaced = self.manifests.write().insert(name.clone(), manifest).is_some();
        if replaced {
            self.unload(&name);
        }
        debug!(tool = %name, replaced, "Registered tool manifest");
        Ok(())
    }

    /// Bind a locator (a manifest `path`, or a tool name) to a factory.
    pub fn register_factory(&self, locator: impl Into<String>, factory: Arc<dyn ToolFactory>) {
        self.factories.write().insert(locator.into(), factory);
    }

    /// Register a manifest together with a ready-made implementation.
    pub fn register_tool(&self, manifest: ToolManifest, tool: Arc<dyn Tool>) -> Result<()> {
        let locator = if manifest.path.is_empty() {
            manifest.name.clone()
        } else {
            manifest.path.clone()
        };
        self.register_factory(locator, Arc::new(InstanceFactory(tool)));
        self.register(manifest)
    }

    /// Populate manifests from a manifest file or descriptor directory.
    ///
    /// Returns how many manifests were registered. Manifests that fail
    /// validation are logged and skipped.
    pub fn discover(&self, source: impl AsRef<Path>) -> Result<usize> {
        let source = source.as_ref();
        let manifests = crate::discovery::scan(source, &self.manifest_file)?;
        let mut count = 0;
        for manifest in manifests {
            let name = manifest.name.clone();
            match self.register(manifest) {
                Ok(()) => count += 1,
                Err(e) => warn!(tool = %name, error = %e, "Skipping invalid manifest"),
            }
        }
        info!(source = %source.display(), count, "Discovered tools");
        Ok(count)
    }

    // ── Listing (metadata only) ───────────────────────────────────────

    /// Enabled manifests, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolManifest> {
        let mut tools: Vec<ToolManifest> = self
            .manifests
            .read()
            .values()
            .filter(|m| m.enabled)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Every manifest, disabled ones included.
    pub fn list_all(&self) -> Vec<ToolManifest> {
        let mut tools: Vec<ToolManifest> = self.manifests.read().values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Enabled manifests whose name, description or category match.
    pub fn search_tools(&self, query: &str) -> Vec<ToolManifest> {
        self.list_tools()
            .into_iter()
            .filter(|m| m.matches(query))
            .collect()
    }

    pub fn manifest(&self, name: &str) -> Option<ToolManifest> {
        self.manifests.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.manifests.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.read().is_empty()
    }

    // ── Loading ───────────────────────────────────────────────────────

    /// Return the implementation for `name`, materializing it on first use.
    ///
    /// Concurrent callers for the same name wait on the in-flight load
    /// instead of building a second instance. A failed load is not cached.
    pub async fn load(&self, name: &str) -> std::result::Result<Arc<dyn Tool>, ToolError> {
        let manifest = self
            .manifest(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        if !manifest.enabled {
            return Err(ToolError::Disabled(name.to_string()));
        }

        let slot = self
            .loaded
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let tool = slot
            .get_or_try_init(|| self.resolve(&manifest))
            .await?;
        Ok(tool.clone())
    }

    /// Drop the cached implementation. No-op when nothing is cached.
    pub fn unload(&self, name: &str) {
        if self.loaded.lock().remove(name).is_some() {
            debug!(tool = %name, "Unloaded tool");
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded
            .lock()
            .get(name)
            .is_some_and(|slot| slot.initialized())
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    async fn resolve(&self, manifest: &ToolManifest) -> std::result::Result<Arc<dyn Tool>, ToolError> {
        let factory = {
            let factories = self.factories.read();
            factories
                .get(&manifest.path)
                .or_else(|| factories.get(&manifest.name))
                .cloned()
        };
        let Some(factory) = factory else {
            return Err(ToolError::load(
                &manifest.name,
                format!("no implementation bound to locator '{}'", manifest.path),
            ));
        };

        info!(tool = %manifest.name, version = %manifest.version, "Loading tool");
        factory.build(manifest).await.map_err(|e| match e {
            ToolError::Load { .. } => e,
            other => ToolError::load(&manifest.name, other.to_string()),
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_manifest(manifest: &ToolManifest) -> Result<()> {
    if manifest.name.trim().is_empty() {
        return Err(Error::InvalidManifest("tool name must not be empty".into()));
    }
    semver::Version::parse(&manifest.version).map_err(|e| {
        Error::InvalidManifest(format!(
            "{}: version '{}' is not semantic: {e}",
            manifest.name, manifest.version
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use toolflow_core::tool::tool_fn;

    /// Factory that counts how often it is asked to build.
    struct CountingFactory {
        builds: AtomicUsize,
        delay: Duration,
    }

    impl CountingFactory {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                delay,
            })
        }

        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolFactory for CountingFactory {
        async fn build(&self, _m: &ToolManifest) -> std::result::Result<Arc<dyn Tool>, ToolError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(tool_fn(|p| async move { Ok(p) }))
        }
    }

    fn registry_with(name: &str, factory: Arc<dyn ToolFactory>) -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register_factory(name, factory);
        registry.register(ToolManifest::new(name, "test tool")).unwrap();
        registry
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let factory = CountingFactory::new(Duration::ZERO);
        let registry = registry_with("toolX", factory.clone());

        let first = registry.load("toolX").await.unwrap();
        for _ in 0..5 {
            let again = registry.load("toolX").await.unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(factory.builds(), 1);
        assert!(registry.is_loaded("toolX"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_build_once() {
        let factory = CountingFactory::new(Duration::from_millis(50));
        let registry = Arc::new(registry_with("slow", factory.clone()));

        let loads = (0..8).map(|_| {
            let registry = registry.clone();
            async move { registry.load("slow").await }
        });
        let tools = futures::future::join_all(loads).await;

        assert_eq!(factory.builds(), 1);
        let first = tools[0].as_ref().unwrap();
        assert!(tools.iter().all(|t| Arc::ptr_eq(first, t.as_ref().unwrap())));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.load("ghost").await.err().unwrap();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn disabled_tool_refuses_to_load() {
        let factory = CountingFactory::new(Duration::ZERO);
        let registry = ToolRegistry::new();
        registry.register_factory("old", factory.clone());
        registry
            .register(ToolManifest::new("old", "retired").disabled())
            .unwrap();

        let err = registry.load("old").await.err().unwrap();
        assert!(matches!(err, ToolError::Disabled(_)));
        assert_eq!(factory.builds(), 0);
        assert!(registry.list_tools().is_empty());
        assert_eq!(registry.list_all().len(), 1);
    }

    #[tokio::test]
    async fn missing_factory_is_a_load_error() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolManifest::new("orphan", "no impl").with_path("connectors/orphan"))
            .unwrap();
        let err = registry.load("orphan").await.err().unwrap();
        assert!(matches!(err, ToolError::Load { .. }));
        assert!(err.to_string().contains("connectors/orphan"));
    }

    #[tokio::test]
    async fn factory_failure_is_wrapped_and_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = ToolRegistry::new();
        registry.register_factory(
            "fragile",
            Arc::new(FnFactory(move |_m: &ToolManifest| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ToolError::InvalidArguments("malformed artifact".into()))
                } else {
                    Ok(tool_fn(|p| async move { Ok(p) }))
                }
            })),
        );
        registry.register(ToolManifest::new("fragile", "")).unwrap();

        let err = registry.load("fragile").await.err().unwrap();
        assert!(matches!(err, ToolError::Load { .. }));
        assert!(!registry.is_loaded("fragile"));

        assert!(registry.load("fragile").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn locator_resolves_before_name() {
        let registry = ToolRegistry::new();
        registry
            .register_tool(
                ToolManifest::new("crm", "CRM").with_path("connectors/crm"),
                tool_fn(|_| async { Ok(json!("via locator")) }),
            )
            .unwrap();
        let tool = registry.load("crm").await.unwrap();
        assert_eq!(tool.execute(json!({})).await.unwrap(), json!("via locator"));
    }

    #[tokio::test]
    async fn unload_drops_cache_and_is_idempotent() {
        let factory = CountingFactory::new(Duration::ZERO);
        let registry = registry_with("t", factory.clone());

        registry.load("t").await.unwrap();
        registry.unload("t");
        registry.unload("t");
        assert!(!registry.is_loaded("t"));

        registry.load("t").await.unwrap();
        assert_eq!(factory.builds(), 2);
    }

    #[tokio::test]
    async fn reregistration_evicts_cached_implementation() {
        let factory = CountingFactory::new(Duration::ZERO);
        let registry = registry_with("t", factory.clone());
        registry.load("t").await.unwrap();

        registry
            .register(ToolManifest::new("t", "updated").with_version("1.1.0"))
            .unwrap();
        assert!(!registry.is_loaded("t"));
        assert_eq!(registry.manifest("t").unwrap().description, "updated");
    }

    #[tokio::test]
    async fn listing_never_loads() {
        let factory = CountingFactory::new(Duration::ZERO);
        let registry = registry_with("lister", factory.clone());
        registry.register(ToolManifest::new("weather", "Weather by city")).unwrap();

        assert_eq!(registry.list_tools().len(), 2);
        assert_eq!(registry.search_tools("city").len(), 1);
        assert_eq!(factory.builds(), 0);
        assert_eq!(registry.loaded_count(), 0);
    }

    #[test]
    fn invalid_version_rejected() {
        let registry = ToolRegistry::new();
        let err = registry
            .register(ToolManifest::new("x", "").with_version("latest"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidManifest(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn discover_skips_invalid_manifests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tools.json"),
            r#"[
                {"name": "good", "path": "native/good", "version": "1.0.0",
                 "description": "ok", "category": "native", "enabled": true},
                {"name": "bad", "path": "native/bad", "version": "one",
                 "description": "broken", "category": "native", "enabled": true}
            ]"#,
        )
        .unwrap();

        let registry = ToolRegistry::new();
        assert_eq!(registry.discover(dir.path()).unwrap(), 1);
        assert!(registry.manifest("good").is_some());
        assert!(registry.manifest("bad").is_none());
    }
}

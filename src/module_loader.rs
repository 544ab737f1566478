// ABOUTME: Module resolution, caching, and cycle detection per spec.md 4.6.
// ABOUTME: Execution itself (running a module's AST in a fresh evaluator)
// ABOUTME: is driven by `crate::eval`, which owns a `ModuleLoader`.

use crate::error::{SourceSpan, ZephyrError};
use crate::plugin::{NoPlugins, PluginResolver};
use crate::value::ModuleValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct ModuleLoader {
    cache: RefCell<HashMap<PathBuf, Rc<ModuleValue>>>,
    search_paths: Vec<PathBuf>,
    loading_stack: RefCell<Vec<(PathBuf, String)>>,
    plugin_resolver: Box<dyn PluginResolver>,
}

/// RAII guard for the loader's `m_loading_stack` entry: removed on any exit
/// from module execution, success or failure, per spec.md 5.
pub struct LoadGuard<'a> {
    loader: &'a ModuleLoader,
    path: PathBuf,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.loader.loading_stack.borrow_mut().retain(|(p, _)| p != &self.path);
    }
}

impl ModuleLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> ModuleLoader {
        ModuleLoader {
            cache: RefCell::new(HashMap::new()),
            search_paths,
            loading_stack: RefCell::new(Vec::new()),
            plugin_resolver: Box::new(NoPlugins),
        }
    }

    /// Reads `ZEPHYRPATH` and splits it on the platform path-list separator,
    /// per spec.md 6.
    pub fn from_env() -> ModuleLoader {
        let search_paths = std::env::var("ZEPHYRPATH")
            .ok()
            .map(|raw| std::env::split_paths(&raw).collect())
            .unwrap_or_default();
        ModuleLoader::new(search_paths)
    }

    pub fn with_plugin_resolver(mut self, resolver: Box<dyn PluginResolver>) -> Self {
        self.plugin_resolver = resolver;
        self
    }

    pub fn plugin_resolver(&self) -> &dyn PluginResolver {
        self.plugin_resolver.as_ref()
    }

    /// `import "./lib.zephyr"` / `import "/abs/lib.zephyr"`: resolved
    /// relative to the requesting module's directory, or as an absolute path.
    pub fn resolve_path_specifier(&self, spec: &str, requester_dir: &Path, span: SourceSpan) -> Result<PathBuf, ZephyrError> {
        let raw = PathBuf::from(spec);
        let candidate = if raw.is_absolute() { raw } else { requester_dir.join(raw) };
        self.canonicalize(&candidate, spec, span)
    }

    /// `import a.b.c`: dotted segments are searched across `ZEPHYRPATH`
    /// entries, joining `.` to the platform separator and appending
    /// `.zephyr` if the resolved path lacks an extension.
    pub fn resolve_bare_specifier(&self, dotted: &[String], span: SourceSpan) -> Result<PathBuf, ZephyrError> {
        let mut rel = PathBuf::new();
        for segment in dotted {
            rel.push(segment);
        }
        if rel.extension().is_none() {
            rel.set_extension("zephyr");
        }
        for root in &self.search_paths {
            let candidate = root.join(&rel);
            if candidate.is_file() {
                return self.canonicalize(&candidate, &dotted.join("."), span);
            }
        }
        Err(ZephyrError::import(
            format!(
                "module '{}' not found on search path ({} director{} searched)",
                dotted.join("."),
                self.search_paths.len(),
                if self.search_paths.len() == 1 { "y" } else { "ies" },
            ),
            span,
        ))
    }

    fn canonicalize(&self, path: &Path, specifier: &str, span: SourceSpan) -> Result<PathBuf, ZephyrError> {
        std::fs::canonicalize(path)
            .map_err(|e| ZephyrError::import(format!("cannot resolve module '{}': {}", specifier, e), span))
    }

    pub fn get_cached(&self, canonical: &Path) -> Option<Rc<ModuleValue>> {
        self.cache.borrow().get(canonical).cloned()
    }

    pub fn insert(&self, canonical: PathBuf, module: Rc<ModuleValue>) {
        self.cache.borrow_mut().insert(canonical, module);
    }

    /// Starts loading `canonical`; fails with `ImportError` naming the cycle
    /// if it is already on the loading stack (spec.md 8 scenario 6).
    pub fn start_loading<'a>(&'a self, canonical: &Path, name: &str, span: SourceSpan) -> Result<LoadGuard<'a>, ZephyrError> {
        let stack = self.loading_stack.borrow();
        if let Some(pos) = stack.iter().position(|(p, _)| p == canonical) {
            let chain: Vec<&str> = stack[pos..].iter().map(|(_, n)| n.as_str()).collect();
            let mut message = format!("circular import: {}", chain.join(" -> "));
            message.push_str(&format!(" -> {}", name));
            drop(stack);
            return Err(ZephyrError::import(message, span));
        }
        drop(stack);
        self.loading_stack.borrow_mut().push((canonical.to_path_buf(), name.to_string()));
        Ok(LoadGuard { loader: self, path: canonical.to_path_buf() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_specifier_relative_to_requester() {
        let dir = std::env::temp_dir().join(format!("zephyr_test_mod_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("lib.zephyr");
        std::fs::write(&file, "func noop() {}").unwrap();

        let loader = ModuleLoader::new(vec![]);
        let resolved = loader.resolve_path_specifier("./lib.zephyr", &dir, SourceSpan::default()).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(&file).unwrap());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn cycle_detection_reports_both_modules() {
        let loader = ModuleLoader::new(vec![]);
        let a = PathBuf::from("/tmp/a.zephyr");
        let b = PathBuf::from("/tmp/b.zephyr");
        let guard_a = loader.start_loading(&a, "a", SourceSpan::default()).unwrap();
        let _guard_b = loader.start_loading(&b, "b", SourceSpan::default()).unwrap();
        let err = loader.start_loading(&a, "a", SourceSpan::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ImportError);
        assert!(err.message.contains("a"));
        assert!(err.message.contains("b"));
        drop(guard_a);
    }

    #[test]
    fn load_guard_removes_stack_entry_on_drop() {
        let loader = ModuleLoader::new(vec![]);
        let a = PathBuf::from("/tmp/only.zephyr");
        {
            let _guard = loader.start_loading(&a, "only", SourceSpan::default()).unwrap();
            assert_eq!(loader.loading_stack.borrow().len(), 1);
        }
        assert_eq!(loader.loading_stack.borrow().len(), 0);
    }

    #[test]
    fn bare_specifier_not_found_is_import_error() {
        let loader = ModuleLoader::new(vec![PathBuf::from("/nonexistent/root")]);
        let err = loader.resolve_bare_specifier(&["math".to_string()], SourceSpan::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ImportError);
    }
}

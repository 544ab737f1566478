// ABOUTME: The native-plugin seam described in spec.md 4.6/1 -- dynamic
// ABOUTME: loading itself is out of scope, so this is an opaque resolver
// ABOUTME: trait the module loader consults for specifiers it can't resolve
// ABOUTME: as ordinary Zephyr source, yielding an already-populated exports map.

use crate::value::Value;
use std::collections::HashMap;

/// Implemented by an embedder to resolve a plugin specifier (e.g. a `.so`/
/// `.dll`/`.dylib` path, or any externally-defined name) into its exports.
/// The module loader treats the result as a finished, already-executed
/// module -- it never inspects how the plugin produced its values.
pub trait PluginResolver {
    /// Returns `true` if `specifier` should be handled by this resolver
    /// rather than the ordinary file-based module search.
    fn handles(&self, specifier: &str) -> bool;

    /// Resolves `specifier` to its exported symbol table.
    fn resolve(&self, specifier: &str) -> Result<HashMap<String, Value>, String>;
}

/// A `PluginResolver` that recognizes nothing; used when no embedder has
/// registered a native-plugin loader, so every specifier falls through to
/// file-based resolution.
#[derive(Default)]
pub struct NoPlugins;

impl PluginResolver for NoPlugins {
    fn handles(&self, _specifier: &str) -> bool {
        false
    }

    fn resolve(&self, specifier: &str) -> Result<HashMap<String, Value>, String> {
        Err(format!("no plugin resolver registered for '{}'", specifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_plugins_handles_nothing() {
        let resolver = NoPlugins;
        assert!(!resolver.handles("native:anything"));
        assert!(resolver.resolve("native:anything").is_err());
    }

    struct StaticPlugin;
    impl PluginResolver for StaticPlugin {
        fn handles(&self, specifier: &str) -> bool {
            specifier.starts_with("native:")
        }
        fn resolve(&self, _specifier: &str) -> Result<HashMap<String, Value>, String> {
            let mut exports = HashMap::new();
            exports.insert("answer".to_string(), Value::str("42"));
            Ok(exports)
        }
    }

    #[test]
    fn custom_resolver_yields_exports() {
        let resolver = StaticPlugin;
        assert!(resolver.handles("native:math"));
        let exports = resolver.resolve("native:math").unwrap();
        assert!(exports.contains_key("answer"));
    }
}

// ABOUTME: CLI/REPL constants and the filesystem sandbox configuration that
// ABOUTME: backs Zephyr's `open`/read/write builtin primitives (spec.md 1, 6).

use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const WELCOME_MESSAGE: &str = "Zephyr";
pub const WELCOME_SUBTITLE: &str = "A class-based scripting language with cooperative async";
pub const WELCOME_FOOTER: &str = "Type an expression, or Ctrl-D to exit.";

/// Filesystem sandbox configuration for the `open`/read/write primitives.
/// Everything beyond those primitives (watching, locking, permissions) is
/// out of scope per spec.md 1.
#[derive(Debug, Clone)]
pub struct FsConfig {
    pub allowed_paths: Vec<PathBuf>,
    pub max_file_size: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec![PathBuf::from(".")],
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

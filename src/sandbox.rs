// ABOUTME: Capability-based filesystem sandbox backing the `open`/read/write
// ABOUTME: builtin primitives (spec.md 1, 6). Paths are confined to the
// ABOUTME: configured roots via cap-std; the rest of file I/O is out of scope.

use crate::config::FsConfig;
use cap_std::fs::Dir;

#[cfg(test)]
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum SandboxError {
    PathNotAllowed(String),
    FileNotFound(String),
    FileTooLarge(String),
    IoError(String),
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::PathNotAllowed(path) => write!(f, "access denied: '{}' is not in an allowed path", path),
            SandboxError::FileNotFound(path) => write!(f, "file not found: '{}'", path),
            SandboxError::FileTooLarge(msg) => write!(f, "file too large: {}", msg),
            SandboxError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for SandboxError {}

/// Safe file access via cap-std capability directories: every configured
/// root is opened once at startup, and every subsequent path is resolved
/// relative to one of those roots, which rejects `..` traversal and
/// absolute paths by construction.
pub struct Sandbox {
    fs_roots: Vec<Dir>,
    fs_config: FsConfig,
}

impl Sandbox {
    pub fn new(fs_config: FsConfig) -> Result<Self, SandboxError> {
        let mut fs_roots = Vec::new();
        for path in &fs_config.allowed_paths {
            std::fs::create_dir_all(path)
                .map_err(|e| SandboxError::IoError(format!("cannot create {}: {}", path.display(), e)))?;
            let dir = Dir::open_ambient_dir(path, cap_std::ambient_authority())
                .map_err(|e| SandboxError::IoError(format!("cannot open {}: {}", path.display(), e)))?;
            fs_roots.push(dir);
        }
        Ok(Self { fs_roots, fs_config })
    }

    fn validate(path: &str) -> Result<(), SandboxError> {
        if path.starts_with('/') || path.starts_with('\\') || path.contains("..") {
            return Err(SandboxError::PathNotAllowed(path.to_string()));
        }
        Ok(())
    }

    /// Reads try every root in order; writes always land in the first root.
    fn find_root_for_path(&self, user_path: &str, write_mode: bool) -> Result<&Dir, SandboxError> {
        if write_mode {
            return self.fs_roots.first().ok_or_else(|| SandboxError::PathNotAllowed(user_path.to_string()));
        }
        for root in &self.fs_roots {
            if root.metadata(user_path).is_ok() {
                return Ok(root);
            }
        }
        self.fs_roots.first().ok_or_else(|| SandboxError::PathNotAllowed(user_path.to_string()))
    }

    /// `open(path, "r")`/`read(path)` primitive.
    pub fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        Self::validate(path)?;
        let root = self.find_root_for_path(path, false)?;
        root.read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::FileNotFound(path.to_string())
            } else {
                SandboxError::IoError(format!("cannot read '{}': {}", path, e))
            }
        })
    }

    /// `open(path, "w")`/`write(path, contents)` primitive.
    pub fn write_file(&self, path: &str, contents: &str) -> Result<(), SandboxError> {
        Self::validate(path)?;
        if contents.len() > self.fs_config.max_file_size {
            return Err(SandboxError::FileTooLarge(format!(
                "{} bytes exceeds limit of {} bytes",
                contents.len(),
                self.fs_config.max_file_size
            )));
        }
        let root = self.find_root_for_path(path, true)?;
        root.write(path, contents).map_err(|e| SandboxError::IoError(format!("cannot write '{}': {}", path, e)))
    }

    pub fn file_exists(&self, path: &str) -> Result<bool, SandboxError> {
        Self::validate(path)?;
        let root = self.find_root_for_path(path, false)?;
        match root.metadata(path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SandboxError::IoError(format!("cannot check '{}': {}", path, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn create_test_sandbox() -> (Sandbox, PathBuf) {
        let test_dir = PathBuf::from(format!("./test_sandbox_temp_{}", std::process::id()));
        let _ = fs::remove_dir_all(&test_dir);
        fs::create_dir_all(&test_dir).unwrap();
        let fs_config = FsConfig { allowed_paths: vec![test_dir.clone()], ..Default::default() };
        (Sandbox::new(fs_config).unwrap(), test_dir)
    }

    fn cleanup(test_dir: &PathBuf) {
        let _ = fs::remove_dir_all(test_dir);
    }

    #[test]
    #[serial]
    fn read_file_success() {
        let (sandbox, dir) = create_test_sandbox();
        fs::write(dir.join("test.txt"), "hello world").unwrap();
        assert_eq!(sandbox.read_file("test.txt").unwrap(), "hello world");
        cleanup(&dir);
    }

    #[test]
    #[serial]
    fn write_then_read_round_trips() {
        let (sandbox, dir) = create_test_sandbox();
        sandbox.write_file("output.txt", "test data").unwrap();
        assert_eq!(sandbox.read_file("output.txt").unwrap(), "test data");
        cleanup(&dir);
    }

    #[test]
    #[serial]
    fn file_exists_reports_missing_files() {
        let (sandbox, dir) = create_test_sandbox();
        fs::write(dir.join("exists.txt"), "data").unwrap();
        assert!(sandbox.file_exists("exists.txt").unwrap());
        assert!(!sandbox.file_exists("nonexistent.txt").unwrap());
        cleanup(&dir);
    }

    #[test]
    #[serial]
    fn path_traversal_rejected() {
        let (sandbox, dir) = create_test_sandbox();
        let result = sandbox.read_file("../../../etc/passwd");
        assert!(matches!(result, Err(SandboxError::PathNotAllowed(_))));
        cleanup(&dir);
    }

    #[test]
    #[serial]
    fn absolute_path_rejected() {
        let (sandbox, dir) = create_test_sandbox();
        let result = sandbox.read_file("/etc/passwd");
        assert!(matches!(result, Err(SandboxError::PathNotAllowed(_))));
        cleanup(&dir);
    }
}

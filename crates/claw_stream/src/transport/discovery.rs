//! CLI discovery
//!
//! Locates the Claude Code CLI binary when the caller did not set
//! [`QueryOptions::cli_path`](crate::options::QueryOptions::cli_path).
//!
//! # Search Strategy
//!
//! [`CliDiscovery::find`] searches in the following order:
//!
//! 1. **CLAUDE_CLI_PATH** - Environment variable
//! 2. **PATH** - Standard PATH search
//! 3. **Common locations** - npm, yarn and local install directories
//!
//! # Example
//!
//! ```rust,no_run
//! use claw_stream::transport::CliDiscovery;
//!
//! let cli_path = CliDiscovery::find()?;
//! println!("Found CLI at: {}", cli_path.display());
//! # Ok::<(), claw_stream::error::ClawError>(())
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ClawError;

/// Environment variable naming an explicit CLI location
pub const CLI_PATH_ENV: &str = "CLAUDE_CLI_PATH";

const CLI_NAME: &str = "claude";

/// CLI discovery utility
pub struct CliDiscovery;

impl CliDiscovery {
    /// Find the Claude Code CLI binary
    ///
    /// # Errors
    ///
    /// [`ClawError::CliNotFound`] when no candidate exists.
    pub fn find() -> Result<PathBuf, ClawError> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::find_in(
            std::env::var_os(CLI_PATH_ENV).as_deref(),
            std::env::var_os("PATH").as_deref(),
            &Self::common_locations(home.as_deref()),
        )
    }

    /// Search `explicit`, then `path_env`, then `locations`, in that order
    fn find_in(
        explicit: Option<&OsStr>,
        path_env: Option<&OsStr>,
        locations: &[PathBuf],
    ) -> Result<PathBuf, ClawError> {
        if let Some(env_path) = explicit.filter(|p| !p.is_empty()) {
            let path = PathBuf::from(env_path);
            if is_executable(&path) {
                debug!("Using CLI from {}: {}", CLI_PATH_ENV, path.display());
                return Ok(path);
            }
            debug!("{} points at missing file: {}", CLI_PATH_ENV, path.display());
        }

        if let Some(path_env) = path_env {
            for dir in std::env::split_paths(path_env) {
                for name in Self::names() {
                    let candidate = dir.join(name);
                    if is_executable(&candidate) {
                        debug!("Found CLI in PATH: {}", candidate.display());
                        return Ok(candidate);
                    }
                }
            }
        }

        for location in locations {
            if is_executable(location) {
                debug!("Found CLI at common location: {}", location.display());
                return Ok(location.clone());
            }
        }

        Err(ClawError::CliNotFound {
            path: PathBuf::from(CLI_NAME),
            source: None,
        })
    }

    fn names() -> &'static [&'static str] {
        if cfg!(windows) {
            &["claude.exe", "claude.cmd", CLI_NAME]
        } else {
            &[CLI_NAME]
        }
    }

    /// Common installation locations for the Claude Code CLI
    fn common_locations(home: Option<&Path>) -> Vec<PathBuf> {
        let mut locations = Vec::new();

        if let Some(home) = home {
            locations.push(home.join(".npm-global/bin/claude"));
        }

        locations.push(PathBuf::from("/usr/local/bin/claude"));
        locations.push(PathBuf::from("/opt/homebrew/bin/claude"));

        if let Some(home) = home {
            locations.push(home.join(".local/bin/claude"));
            locations.push(home.join("node_modules/.bin/claude"));
            locations.push(home.join(".yarn/bin/claude"));
            locations.push(home.join(".claude/local/claude"));
        }

        locations
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

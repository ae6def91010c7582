pub mod config;
pub mod pull;
pub mod push;

use std::path::Path;

use anyhow::{Context, Result};

pub(crate) fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))
}

/// Write to `path`, or stdout when no path is given.
pub(crate) fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Could not write {}", path.display())),
        None => {
            print!("{content}");
            Ok(())
        }
    }
}

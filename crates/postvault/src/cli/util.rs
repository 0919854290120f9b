//! Shared utilities for CLI commands.

use std::fs;
use std::path::Path;

use postvault_core::post::Archive;

/// Read an archive JSON file.
pub fn load_archive(path: &Path) -> Option<Archive> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Cannot read archive '{}': {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(archive) => Some(archive),
        Err(e) => {
            eprintln!("Cannot parse archive '{}': {}", path.display(), e);
            None
        }
    }
}

/// Write an archive JSON file.
pub fn save_archive(path: &Path, archive: &Archive) -> bool {
    let content = match serde_json::to_string_pretty(archive) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Cannot encode archive: {}", e);
            return false;
        }
    };
    if let Err(e) = fs::write(path, content) {
        eprintln!("Cannot write archive '{}': {}", path.display(), e);
        return false;
    }
    true
}

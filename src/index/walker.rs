use crate::constants::DEFINITION_FILE_NAME;
use crate::index::ignore::ExcludeRules;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Walk a scan directory and return every image definition file that is not
/// excluded, sorted by path so indexing order does not depend on the OS.
pub fn find_definitions(root: &Path, exclude: &ExcludeRules) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            !exclude.is_excluded(rel)
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name() == DEFINITION_FILE_NAME)
        .map(|entry| entry.path().to_path_buf())
        .collect();

    files.sort();
    files
}

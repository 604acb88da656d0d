//! Where medindex keeps its own files (the optional `config.toml`).
//!
//! Source PDFs stay wherever the config points; nothing is written next to them.

use std::path::PathBuf;

/// Returns the directory holding medindex's config file.
/// On Linux: `~/.local/share/medindex/`.
/// Only computes the path; the directory is never created. Returns `None` if we can't
/// determine it.
pub fn app_data_dir() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("app", "MedIndex", "medindex")?;
    Some(dirs.data_local_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_named_after_the_tool() {
        if let Some(dir) = app_data_dir() {
            assert_eq!(dir.file_name().and_then(|n| n.to_str()), Some("medindex"));
        }
    }
}

//! Installed program discovery

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::Loader;

/// Recursively collect every file under `roots` that the loader can boot.
///
/// Unreadable directories are skipped with a warning. Results are sorted.
pub fn installed_programs<P: AsRef<Path>>(loader: &dyn Loader, roots: &[P]) -> Vec<PathBuf> {
    let mut programs = Vec::new();

    for root in roots {
        let root = root.as_ref();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let executable = loader
                .resolve(entry.path())
                .and_then(|handle| handle.is_executable())
                .unwrap_or(false);
            if executable {
                debug!("Found program {}", entry.path().display());
                programs.push(entry.into_path());
            }
        }
    }

    programs.sort();
    programs.dedup();
    programs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageLoader, ProgramImage};
    use std::fs;

    #[test]
    fn test_installed_programs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("titles/0004000000055d00");
        fs::create_dir_all(&nested).unwrap();

        ProgramImage::new(1).write_to(&dir.path().join("a.oxp")).unwrap();
        ProgramImage::new(2).write_to(&nested.join("b.oxp")).unwrap();
        let mut update = ProgramImage::new(3);
        update.executable = false;
        update.write_to(&nested.join("update.oxp")).unwrap();
        fs::write(dir.path().join("readme.txt"), "hello").unwrap();

        let found = installed_programs(&ImageLoader, &[dir.path()]);
        assert_eq!(found, vec![dir.path().join("a.oxp"), nested.join("b.oxp")]);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let found = installed_programs(&ImageLoader, &["/nonexistent/programs"]);
        assert!(found.is_empty());
    }
}

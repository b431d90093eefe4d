//! Directory layout helpers for the vector index
//!
//! One index deployment owns one root directory:
//!
//! ```text
//! {index_dir}/
//!   CURRENT                                  # name of the active generation
//!   staging/{generation_id}/                 # in-flight build, never served
//!   generations/{generation_id}/
//!     entries.jsonl
//!     manifest.toml
//! ```
//!
//! The layout is opaque to callers; everything they may rely on is exposed
//! through the manifest.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const CURRENT_FILE: &str = "CURRENT";
const GENERATIONS_DIR: &str = "generations";
const STAGING_DIR: &str = "staging";
const ENTRIES_FILE: &str = "entries.jsonl";
const MANIFEST_FILE: &str = "manifest.toml";

/// Path helpers for one index root.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File naming the active generation.
    pub fn current_path(&self) -> PathBuf {
        self.root.join(CURRENT_FILE)
    }

    pub fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS_DIR)
    }

    pub fn generation_dir(&self, generation_id: &str) -> PathBuf {
        self.generations_dir().join(generation_id)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn staging_generation_dir(&self, generation_id: &str) -> PathBuf {
        self.staging_dir().join(generation_id)
    }

    pub fn entries_path(generation_dir: &Path) -> PathBuf {
        generation_dir.join(ENTRIES_FILE)
    }

    pub fn manifest_path(generation_dir: &Path) -> PathBuf {
        generation_dir.join(MANIFEST_FILE)
    }

    /// Read the active generation id, if any generation was ever swapped in.
    pub fn read_current(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(self.current_path()) {
            Ok(contents) => {
                let id = contents.trim().to_string();
                Ok(if id.is_empty() { None } else { Some(id) })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Point CURRENT at `generation_id`.
    ///
    /// Written to a sibling temp file and renamed over, so readers observe
    /// either the old pointer or the new one, never a torn write.
    pub fn write_current(&self, generation_id: &str) -> io::Result<()> {
        let tmp = self.root.join(format!("{CURRENT_FILE}.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(generation_id.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.current_path())
    }

    /// List completed generation ids, oldest first.
    ///
    /// Generation ids embed a zero-padded UTC timestamp, so lexicographic
    /// order is chronological order.
    pub fn list_generations(&self) -> io::Result<Vec<String>> {
        let dir = self.generations_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut generations = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    generations.push(name.to_string());
                }
            }
        }
        generations.sort();
        Ok(generations)
    }

    /// Delete the oldest generations beyond `keep`, never touching `active`.
    ///
    /// Returns how many directories were removed.
    pub fn prune_generations(&self, keep: usize, active: &str) -> io::Result<usize> {
        let generations = self.list_generations()?;
        if generations.len() <= keep {
            return Ok(0);
        }

        let excess = generations.len() - keep;
        let mut removed = 0;
        for id in generations.iter().take(excess) {
            if id == active {
                continue;
            }
            fs::remove_dir_all(self.generation_dir(id))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Remove every generation, the staging area and the CURRENT pointer.
    pub fn clear(&self) -> io::Result<()> {
        for dir in [self.generations_dir(), self.staging_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        match fs::remove_file(self.current_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_helpers() {
        let layout = IndexLayout::new(PathBuf::from("/tmp/ctx-index"));
        assert_eq!(layout.current_path(), Path::new("/tmp/ctx-index/CURRENT"));
        assert_eq!(
            layout.generation_dir("gen-a"),
            Path::new("/tmp/ctx-index/generations/gen-a")
        );
        assert_eq!(
            layout.staging_generation_dir("gen-a"),
            Path::new("/tmp/ctx-index/staging/gen-a")
        );
        assert_eq!(
            IndexLayout::entries_path(Path::new("/g")),
            Path::new("/g/entries.jsonl")
        );
        assert_eq!(
            IndexLayout::manifest_path(Path::new("/g")),
            Path::new("/g/manifest.toml")
        );
    }

    #[test]
    fn test_current_round_trip_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = IndexLayout::new(tmp.path().to_path_buf());

        assert_eq!(layout.read_current().unwrap(), None);
        layout.write_current("gen-20250101T000000000-0001").unwrap();
        assert_eq!(
            layout.read_current().unwrap().as_deref(),
            Some("gen-20250101T000000000-0001")
        );
        // Overwrite is atomic rename, not append.
        layout.write_current("gen-20250102T000000000-0002").unwrap();
        assert_eq!(
            layout.read_current().unwrap().as_deref(),
            Some("gen-20250102T000000000-0002")
        );
    }

    #[test]
    fn test_list_generations_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = IndexLayout::new(tmp.path().to_path_buf());
        for id in ["gen-3", "gen-1", "gen-2"] {
            fs::create_dir_all(layout.generation_dir(id)).unwrap();
        }
        // Stray files in generations/ are ignored.
        fs::write(layout.generations_dir().join("notes.txt"), "x").unwrap();

        assert_eq!(layout.list_generations().unwrap(), vec!["gen-1", "gen-2", "gen-3"]);
    }

    #[test]
    fn test_prune_keeps_newest_and_active() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = IndexLayout::new(tmp.path().to_path_buf());
        for id in ["gen-1", "gen-2", "gen-3", "gen-4"] {
            fs::create_dir_all(layout.generation_dir(id)).unwrap();
        }

        let removed = layout.prune_generations(2, "gen-4").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(layout.list_generations().unwrap(), vec!["gen-3", "gen-4"]);

        // The active generation survives even when it is among the oldest.
        let removed = layout.prune_generations(1, "gen-3").unwrap();
        assert_eq!(removed, 0);
        assert_eq!(layout.list_generations().unwrap(), vec!["gen-3", "gen-4"]);
    }

    #[test]
    fn test_clear_removes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = IndexLayout::new(tmp.path().to_path_buf());
        fs::create_dir_all(layout.generation_dir("gen-1")).unwrap();
        fs::create_dir_all(layout.staging_generation_dir("gen-2")).unwrap();
        layout.write_current("gen-1").unwrap();

        layout.clear().unwrap();
        assert!(layout.list_generations().unwrap().is_empty());
        assert_eq!(layout.read_current().unwrap(), None);
        // Clearing an already-empty layout is fine.
        layout.clear().unwrap();
    }
}

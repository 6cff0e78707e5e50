//! Small user preferences kept next to the saved puzzles.

use crate::storage::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use sudoku_session::Difficulty;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Difficulty of the last generated puzzle
    pub last_difficulty: Option<Difficulty>,
}

pub struct PrefsStore {
    path: PathBuf,
}

impl PrefsStore {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join("prefs.json"),
        }
    }

    /// Missing or unreadable files give the defaults
    pub fn load(&self) -> Preferences {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no preferences");
                return Preferences::default();
            }
        };
        serde_json::from_str(&json).unwrap_or_else(|e| {
            debug!(path = %self.path.display(), error = %e, "ignoring unreadable preferences");
            Preferences::default()
        })
    }

    pub fn save(&self, prefs: &Preferences) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(prefs)?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn remember_difficulty(&self, difficulty: Difficulty) -> io::Result<()> {
        let mut prefs = self.load();
        if prefs.last_difficulty == Some(difficulty) {
            return Ok(());
        }
        prefs.last_difficulty = Some(difficulty);
        self.save(&prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(PrefsStore::in_dir(dir.path()).load(), Preferences::default());
    }

    #[test]
    fn test_remembers_last_difficulty() {
        let dir = TempDir::new().unwrap();
        let store = PrefsStore::in_dir(&dir.path().join("nested"));
        store.remember_difficulty(Difficulty::Expert).unwrap();

        let reopened = PrefsStore::in_dir(&dir.path().join("nested"));
        assert_eq!(reopened.load().last_difficulty, Some(Difficulty::Expert));
    }

    #[test]
    fn test_garbage_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("prefs.json"), "{not json").unwrap();
        assert_eq!(PrefsStore::in_dir(dir.path()).load().last_difficulty, None);
    }
}

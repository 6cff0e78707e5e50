//! Saved puzzles on disk.
//!
//! Layout: `<dir>/<difficulty>/<id>.json`, pretty-printed. Older saves kept
//! directly in `<dir>` are still read; their difficulty defaults to medium.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use sudoku_session::service::{PuzzleSummary, SavedPuzzle};
use sudoku_session::{Difficulty, ServiceError, ServiceResult};
use tracing::{debug, warn};

/// Only the fields needed for a listing, so partially valid files still show up
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    difficulty: Option<Difficulty>,
    #[serde(default)]
    created_at: u64,
}

pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<local data dir>/sudoku`, or `./sudoku` when the platform has none
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sudoku")
    }

    fn path_for(&self, id: &str, difficulty: Difficulty) -> PathBuf {
        self.dir.join(difficulty.label()).join(format!("{}.json", id))
    }

    fn legacy_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write a puzzle under its difficulty folder. Copies of the same id in
    /// other folders are removed so a changed difficulty does not leave a
    /// stale duplicate behind.
    pub fn save(&self, puzzle: &SavedPuzzle) -> ServiceResult<()> {
        let id = checked_id(&puzzle.id)?;
        let difficulty = puzzle.difficulty.unwrap_or_default();
        let target = self.path_for(id, difficulty);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(storage_error)?;
        }
        let json = serde_json::to_string_pretty(puzzle).map_err(storage_error)?;
        write_atomic(&target, json.as_bytes()).map_err(storage_error)?;

        let stale = Difficulty::all()
            .into_iter()
            .filter(|d| *d != difficulty)
            .map(|d| self.path_for(id, d))
            .chain(std::iter::once(self.legacy_path(id)));
        for path in stale {
            if path.is_file() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "could not remove stale copy");
                }
            }
        }

        debug!(id, path = %target.display(), "wrote puzzle");
        Ok(())
    }

    pub fn load(&self, id: &str) -> ServiceResult<SavedPuzzle> {
        let id = id.trim();
        if checked_id(id).is_err() {
            return Err(ServiceError::NotFound(id.to_string()));
        }

        let candidates = Difficulty::all()
            .into_iter()
            .map(|d| (self.path_for(id, d), d))
            .chain(std::iter::once((self.legacy_path(id), Difficulty::Medium)));

        for (path, folder) in candidates {
            if !path.is_file() {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(storage_error)?;
            let mut puzzle: SavedPuzzle = serde_json::from_str(&json).map_err(storage_error)?;
            puzzle.difficulty.get_or_insert(folder);
            if puzzle.id.is_empty() {
                puzzle.id = id.to_string();
            }
            return Ok(puzzle);
        }

        Err(ServiceError::NotFound(id.to_string()))
    }

    /// Every readable puzzle, oldest first. Unreadable files are skipped.
    pub fn list(&self) -> ServiceResult<Vec<PuzzleSummary>> {
        let mut out = Vec::new();
        for difficulty in Difficulty::all() {
            scan(&self.dir.join(difficulty.label()), difficulty, &mut out)?;
        }
        scan(&self.dir, Difficulty::Medium, &mut out)?;

        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

fn scan(dir: &Path, folder: Difficulty, out: &mut Vec<PuzzleSummary>) -> ServiceResult<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(storage_error(e)),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let Ok(json) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(listing) = serde_json::from_str::<ListingEntry>(&json) else {
            debug!(path = %path.display(), "skipping unreadable puzzle file");
            continue;
        };
        if listing.id.is_empty() {
            continue;
        }
        out.push(PuzzleSummary {
            id: listing.id,
            name: (!listing.name.is_empty()).then_some(listing.name),
            difficulty: listing.difficulty.unwrap_or(folder),
            created_at: listing.created_at,
        });
    }
    Ok(())
}

/// Write through a temp file in the same directory and rename it over `path`,
/// so an interrupted write never leaves a truncated file behind.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    fs::write(temp.path(), data)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Ids become file names, so keep them to a safe alphabet
fn checked_id(id: &str) -> ServiceResult<&str> {
    let id = id.trim();
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(ServiceError::Storage(format!("invalid puzzle id '{}'", id)))
    }
}

fn storage_error(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::Storage(e.to_string())
}

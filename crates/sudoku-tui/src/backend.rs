//! Puzzle service backends for the terminal app
//!
//! Supports different stores based on environment:
//! - Local: puzzles saved as JSON files under the data directory
//! - Memory: nothing touches the disk (selected by `SUDOKU_ENV=test`)
//!
//! Both answer solve/generate/hint with the `sudoku-core` engine.

use crate::storage::FsStorage;
use clap::ValueEnum;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use sudoku_core::{Generator, HintType, Solver, Technique};
use sudoku_session::service::{
    single_hint, validate_board, CellCoord, HintOutcome, PuzzleSummary, SaveRequest, SavedPuzzle, Validation,
};
use sudoku_session::{
    Difficulty, Grid, MemoryService, PuzzleBoard, PuzzleService, ServiceError, ServiceResult, StrategyTier,
};
use tracing::{debug, info};

/// Where saved puzzles live
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// JSON files under the data directory
    Local,
    /// In-memory, lost on exit
    Memory,
}

impl BackendKind {
    /// Detect from the SUDOKU_ENV variable
    pub fn detect() -> Self {
        Self::from_env_value(std::env::var("SUDOKU_ENV").ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("test") | Some("testing") => BackendKind::Memory,
            _ => BackendKind::Local,
        }
    }
}

enum Store {
    Files(FsStorage),
    Memory(MemoryService),
}

/// Puzzle service running in-process
pub struct LocalService {
    store: Store,
    last_id: AtomicU64,
}

impl LocalService {
    pub fn with_files(dir: impl Into<PathBuf>) -> Self {
        Self::with_store(Store::Files(FsStorage::new(dir)))
    }

    pub fn in_memory() -> Self {
        Self::with_store(Store::Memory(MemoryService::new()))
    }

    fn with_store(store: Store) -> Self {
        Self {
            store,
            last_id: AtomicU64::new(0),
        }
    }

    /// Time-based id, strictly increasing within this process
    fn next_id(&self) -> u64 {
        let now = unix_nanos();
        let mut last = self.last_id.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last_id
                .compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

impl PuzzleService for LocalService {
    fn validate(&self, board: &[Vec<u8>]) -> ServiceResult<Validation> {
        Ok(validate_board(board))
    }

    fn solve(&self, board: &[Vec<u8>]) -> ServiceResult<Vec<Vec<u8>>> {
        if !validate_board(board).ok {
            return Err(ServiceError::Server("board has conflicts".into()));
        }
        let grid = engine_grid(board)?;
        let solved = Solver::new()
            .solve(&grid)
            .ok_or_else(|| ServiceError::Server("no solution".into()))?;
        Ok(engine_values(&solved))
    }

    fn generate(&self, difficulty: Difficulty) -> ServiceResult<PuzzleBoard> {
        let grid = Generator::new().generate(engine_difficulty(difficulty));
        let mut fixed = vec![vec![false; 9]; 9];
        for (row, flags) in fixed.iter_mut().enumerate() {
            for (col, flag) in flags.iter_mut().enumerate() {
                *flag = grid.cell(sudoku_core::Position::new(row, col)).is_given();
            }
        }
        info!(%difficulty, "generated puzzle");
        Ok(PuzzleBoard {
            values: engine_values(&grid),
            fixed,
        })
    }

    fn hint(&self, board: &[Vec<u8>], max_tier: StrategyTier) -> ServiceResult<Option<HintOutcome>> {
        if let Some(hint) = single_hint(board) {
            return Ok(Some(hint));
        }

        let grid = engine_grid(board)?;
        let Some(hint) = Solver::new().get_hint(&grid) else {
            return Ok(None);
        };
        let tier = technique_tier(hint.technique);
        if tier > max_tier {
            debug!(technique = %hint.technique, "hint needs a higher tier");
            return Ok(None);
        }

        let target = match hint.hint_type {
            HintType::SetValue { pos, .. } | HintType::EliminateCandidates { pos, .. } => pos,
        };
        let mut cells = vec![CellCoord {
            row: target.row,
            col: target.col,
        }];
        cells.extend(
            hint.involved_cells
                .iter()
                .filter(|p| **p != target)
                .map(|p| CellCoord { row: p.row, col: p.col }),
        );
        Ok(Some(HintOutcome {
            cells,
            message: format!("{}: {}", hint.technique, hint.explanation),
        }))
    }

    fn save(&self, request: &SaveRequest) -> ServiceResult<String> {
        match &self.store {
            Store::Memory(memory) => memory.save(request),
            Store::Files(files) => {
                let id = match request.id.trim() {
                    "" => self.next_id().to_string(),
                    existing => existing.to_string(),
                };
                let created_at = files
                    .load(&id)
                    .map(|p| p.created_at)
                    .unwrap_or_else(|_| unix_nanos());
                files.save(&SavedPuzzle::from_request(id.clone(), request, created_at))?;
                info!(%id, "saved puzzle");
                Ok(id)
            }
        }
    }

    fn load(&self, id: &str) -> ServiceResult<SavedPuzzle> {
        match &self.store {
            Store::Memory(memory) => memory.load(id),
            Store::Files(files) => files.load(id),
        }
    }

    fn list(&self) -> ServiceResult<Vec<PuzzleSummary>> {
        match &self.store {
            Store::Memory(memory) => memory.list(),
            Store::Files(files) => files.list(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self.store {
            Store::Files(_) => "Local",
            Store::Memory(_) => "Memory",
        }
    }
}

pub fn create_backend(kind: BackendKind, data_dir: PathBuf) -> Arc<dyn PuzzleService> {
    match kind {
        BackendKind::Local => Arc::new(LocalService::with_files(data_dir)),
        BackendKind::Memory => Arc::new(LocalService::in_memory()),
    }
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Convert a (possibly partial) board into the engine's grid
fn engine_grid(board: &[Vec<u8>]) -> ServiceResult<sudoku_core::Grid> {
    let text: String = Grid::from_values(board)
        .values()
        .iter()
        .flatten()
        .map(|&v| char::from(b'0' + v))
        .collect();
    sudoku_core::Grid::from_string(&text).ok_or_else(|| ServiceError::InvalidResponse("unreadable board".into()))
}

fn engine_values(grid: &sudoku_core::Grid) -> Vec<Vec<u8>> {
    (0..9)
        .map(|row| {
            (0..9)
                .map(|col| grid.get(sudoku_core::Position::new(row, col)).unwrap_or(0))
                .collect()
        })
        .collect()
}

fn engine_difficulty(difficulty: Difficulty) -> sudoku_core::Difficulty {
    match difficulty {
        Difficulty::Easy => sudoku_core::Difficulty::Easy,
        Difficulty::Medium => sudoku_core::Difficulty::Medium,
        Difficulty::Hard => sudoku_core::Difficulty::Hard,
        Difficulty::Expert => sudoku_core::Difficulty::Expert,
    }
}

fn technique_tier(technique: Technique) -> StrategyTier {
    match technique {
        Technique::NakedSingle | Technique::HiddenSingle => StrategyTier::Singles,
        Technique::NakedPair | Technique::HiddenPair | Technique::NakedTriple | Technique::HiddenTriple => {
            StrategyTier::Pairs
        }
        Technique::PointingPair | Technique::BoxLineReduction => StrategyTier::Advanced,
        _ => StrategyTier::XWing,
    }
}

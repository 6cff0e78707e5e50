//! Contract with the puzzle service that solves, generates, hints and stores puzzles.
//!
//! The session never calls a backend directly. It queues [`Request`]s, a
//! transport runs them through [`dispatch`] wherever the backend lives, and the
//! results come back through `Session::apply_response`.
//!
//! Backends:
//! - [`MemoryService`]: in-memory, for tests and throwaway sessions
//! - anything else implementing [`PuzzleService`] (the terminal app ships a
//!   file-backed one)

use crate::candidates;
use crate::grid::{Grid, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Puzzle difficulty label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    pub fn all() -> [Difficulty; 4] {
        [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard, Difficulty::Expert]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        }
    }

    /// Parse a label case-insensitively; unknown labels fall back to medium
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|d| d.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown difficulty '{}' (expected easy, medium, hard or expert)", s))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Highest solving technique a hint may rely on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyTier {
    #[default]
    Singles,
    Pairs,
    Advanced,
    XWing,
}

impl StrategyTier {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyTier::Singles => "singles",
            StrategyTier::Pairs => "pairs",
            StrategyTier::Advanced => "advanced",
            StrategyTier::XWing => "xwing",
        }
    }
}

impl FromStr for StrategyTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [StrategyTier::Singles, StrategyTier::Pairs, StrategyTier::Advanced, StrategyTier::XWing]
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown strategy tier '{}'", s))
    }
}

impl fmt::Display for StrategyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Row/column pair as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: usize,
    pub col: usize,
}

impl From<Position> for CellCoord {
    fn from(pos: Position) -> Self {
        Self { row: pos.row, col: pos.col }
    }
}

impl CellCoord {
    /// The board position, if the coordinate is on the board
    pub fn position(&self) -> Option<Position> {
        Position::checked(self.row, self.col)
    }
}

/// Values plus given flags. Rows may be short or missing; the grid repairs them on load.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PuzzleBoard {
    #[serde(rename = "board", default)]
    pub values: Vec<Vec<u8>>,
    #[serde(default)]
    pub fixed: Vec<Vec<bool>>,
}

impl PuzzleBoard {
    pub fn from_grid(grid: &Grid) -> Self {
        Self {
            values: grid.values(),
            fixed: grid.fixed_flags(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Validation {
    pub ok: bool,
    #[serde(default)]
    pub conflicts: Vec<CellCoord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintOutcome {
    pub cells: Vec<CellCoord>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    pub board: PuzzleBoard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_notes: Option<Vec<Vec<String>>>,
}

/// A stored puzzle with its metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPuzzle {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub created_at: u64,
    pub board: PuzzleBoard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_notes: Option<Vec<Vec<String>>>,
}

impl SavedPuzzle {
    /// Build the stored form of a save request under `id`
    pub fn from_request(id: String, request: &SaveRequest, created_at: u64) -> Self {
        Self {
            id,
            name: request.name.clone(),
            notes: request.notes.clone(),
            difficulty: request.difficulty,
            created_at,
            board: request.board.clone(),
            cell_notes: request.cell_notes.clone(),
        }
    }

    pub fn summary(&self) -> PuzzleSummary {
        PuzzleSummary {
            id: self.id.clone(),
            name: (!self.name.is_empty()).then(|| self.name.clone()),
            difficulty: self.difficulty.unwrap_or_default(),
            created_at: self.created_at,
        }
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub created_at: u64,
}

impl fmt::Display for PuzzleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// Correlates a response with the request that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One call to the puzzle service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Validate {
        board: Vec<Vec<u8>>,
    },
    Solve {
        board: Vec<Vec<u8>>,
    },
    Generate {
        difficulty: Difficulty,
    },
    Hint {
        board: Vec<Vec<u8>>,
        #[serde(rename = "maxTier")]
        max_tier: StrategyTier,
    },
    Save(SaveRequest),
    Load {
        id: String,
    },
    List,
}

impl Request {
    /// Operation name for logs and error reports
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Validate { .. } => "validate",
            Request::Solve { .. } => "solve",
            Request::Generate { .. } => "generate",
            Request::Hint { .. } => "hint",
            Request::Save(_) => "save",
            Request::Load { .. } => "load",
            Request::List => "list",
        }
    }
}

/// Successful result of a [`Request`], one variant per operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Validated(Validation),
    Solved(Vec<Vec<u8>>),
    Generated(PuzzleBoard),
    Hint(Option<HintOutcome>),
    Saved { id: String },
    Loaded(SavedPuzzle),
    Listed(Vec<PuzzleSummary>),
}

/// A request tagged with its id, ready for a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub id: RequestId,
    pub request: Request,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failures reported by a puzzle service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("puzzle not found: {0}")]
    NotFound(String),
    #[error("service unavailable")]
    Unavailable,
    #[error("operation not configured")]
    NotConfigured,
}

/// Backend for the puzzle operations
pub trait PuzzleService: Send + Sync {
    fn validate(&self, board: &[Vec<u8>]) -> ServiceResult<Validation>;

    fn solve(&self, board: &[Vec<u8>]) -> ServiceResult<Vec<Vec<u8>>>;

    fn generate(&self, difficulty: Difficulty) -> ServiceResult<PuzzleBoard>;

    /// Next logical step up to `max_tier`; `Ok(None)` when nothing was found
    fn hint(&self, board: &[Vec<u8>], max_tier: StrategyTier) -> ServiceResult<Option<HintOutcome>>;

    /// Persist a puzzle, returning its id (a new one when `request.id` is empty)
    fn save(&self, request: &SaveRequest) -> ServiceResult<String>;

    fn load(&self, id: &str) -> ServiceResult<SavedPuzzle>;

    fn list(&self) -> ServiceResult<Vec<PuzzleSummary>>;

    fn is_available(&self) -> bool {
        true
    }

    /// Backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Run one request against a backend
pub fn dispatch(service: &dyn PuzzleService, request: &Request) -> ServiceResult<Response> {
    debug!(op = request.operation(), backend = service.backend_name(), "dispatching request");
    match request {
        Request::Validate { board } => service.validate(board).map(Response::Validated),
        Request::Solve { board } => service.solve(board).map(Response::Solved),
        Request::Generate { difficulty } => service.generate(*difficulty).map(Response::Generated),
        Request::Hint { board, max_tier } => service.hint(board, *max_tier).map(Response::Hint),
        Request::Save(save) => service.save(save).map(|id| Response::Saved { id }),
        Request::Load { id } => service.load(id).map(Response::Loaded),
        Request::List => service.list().map(Response::Listed),
    }
}

/// Duplicate-scan validation shared by the bundled backends
pub fn validate_board(board: &[Vec<u8>]) -> Validation {
    let conflicts: Vec<CellCoord> = candidates::conflicts(&Grid::from_values(board))
        .into_iter()
        .map(CellCoord::from)
        .collect();
    Validation {
        ok: conflicts.is_empty(),
        conflicts,
    }
}

/// Naked-single hint shared by the bundled backends
pub fn single_hint(board: &[Vec<u8>]) -> Option<HintOutcome> {
    candidates::first_single(&Grid::from_values(board)).map(|(pos, value)| HintOutcome {
        cells: vec![pos.into()],
        message: format!("Single: only {} fits here", value),
    })
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ==================== In-memory backend ====================

/// In-memory puzzle service.
///
/// Generation and solving return whatever board was configured with
/// [`MemoryService::set_generated`] / [`MemoryService::set_solution`].
pub struct MemoryService {
    puzzles: Mutex<BTreeMap<String, SavedPuzzle>>,
    generated: Mutex<Option<PuzzleBoard>>,
    solution: Mutex<Option<Vec<Vec<u8>>>>,
    available: Mutex<bool>,
    next_id: Mutex<u64>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        Self {
            puzzles: Mutex::new(BTreeMap::new()),
            generated: Mutex::new(None),
            solution: Mutex::new(None),
            available: Mutex::new(true),
            next_id: Mutex::new(1),
        }
    }

    /// Set whether the backend should behave as reachable
    pub fn set_available(&self, available: bool) {
        *lock(&self.available) = available;
    }

    pub fn set_generated(&self, board: PuzzleBoard) {
        *lock(&self.generated) = Some(board);
    }

    pub fn set_solution(&self, values: Vec<Vec<u8>>) {
        *lock(&self.solution) = Some(values);
    }

    pub fn count(&self) -> usize {
        lock(&self.puzzles).len()
    }

    pub fn get(&self, id: &str) -> Option<SavedPuzzle> {
        lock(&self.puzzles).get(id).cloned()
    }

    fn ensure_available(&self) -> ServiceResult<()> {
        if *lock(&self.available) {
            Ok(())
        } else {
            Err(ServiceError::Network("memory backend unavailable".into()))
        }
    }
}

impl PuzzleService for MemoryService {
    fn validate(&self, board: &[Vec<u8>]) -> ServiceResult<Validation> {
        self.ensure_available()?;
        Ok(validate_board(board))
    }

    fn solve(&self, _board: &[Vec<u8>]) -> ServiceResult<Vec<Vec<u8>>> {
        self.ensure_available()?;
        lock(&self.solution).clone().ok_or(ServiceError::NotConfigured)
    }

    fn generate(&self, _difficulty: Difficulty) -> ServiceResult<PuzzleBoard> {
        self.ensure_available()?;
        lock(&self.generated).clone().ok_or(ServiceError::NotConfigured)
    }

    fn hint(&self, board: &[Vec<u8>], _max_tier: StrategyTier) -> ServiceResult<Option<HintOutcome>> {
        self.ensure_available()?;
        Ok(single_hint(board))
    }

    fn save(&self, request: &SaveRequest) -> ServiceResult<String> {
        self.ensure_available()?;
        let mut puzzles = lock(&self.puzzles);
        let mut next_id = lock(&self.next_id);

        let id = match request.id.trim() {
            "" => {
                let id = format!("mem-{}", *next_id);
                *next_id += 1;
                id
            }
            existing => existing.to_string(),
        };
        let created_at = puzzles.get(&id).map_or(*next_id, |p| p.created_at);
        puzzles.insert(id.clone(), SavedPuzzle::from_request(id.clone(), request, created_at));
        Ok(id)
    }

    fn load(&self, id: &str) -> ServiceResult<SavedPuzzle> {
        self.ensure_available()?;
        lock(&self.puzzles)
            .get(id.trim())
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    fn list(&self) -> ServiceResult<Vec<PuzzleSummary>> {
        self.ensure_available()?;
        Ok(lock(&self.puzzles).values().map(SavedPuzzle::summary).collect())
    }

    fn is_available(&self) -> bool {
        *lock(&self.available)
    }

    fn backend_name(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn save_request(id: &str, name: &str) -> SaveRequest {
        SaveRequest {
            id: id.to_string(),
            name: name.to_string(),
            board: PuzzleBoard {
                values: vec![vec![5, 3]],
                fixed: vec![vec![true, false]],
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_difficulty_labels() {
        assert_eq!(Difficulty::from_label("HARD"), Difficulty::Hard);
        assert_eq!(Difficulty::from_label("nonsense"), Difficulty::Medium);
        assert!("nonsense".parse::<Difficulty>().is_err());
        assert_eq!("XWing".parse::<StrategyTier>(), Ok(StrategyTier::XWing));
        assert_eq!(serde_json::to_string(&Difficulty::Expert).unwrap(), "\"expert\"");
        assert_eq!(serde_json::to_string(&StrategyTier::XWing).unwrap(), "\"xwing\"");
    }

    #[test]
    fn test_wire_shapes() {
        let board: PuzzleBoard = serde_json::from_str(r#"{"board": [[1, 2]]}"#).unwrap();
        assert_eq!(board.values, vec![vec![1, 2]]);
        assert!(board.fixed.is_empty());

        let request = Request::Hint {
            board: vec![vec![0]],
            max_tier: StrategyTier::Singles,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["op"], "hint");
        assert_eq!(json["maxTier"], "singles");

        let save = serde_json::to_value(Request::Save(save_request("", "x"))).unwrap();
        assert_eq!(save["op"], "save");
        assert_eq!(save["board"]["board"][0][0], 5);
        assert!(save.get("cellNotes").is_none());
    }

    #[test]
    fn test_memory_save_assigns_and_keeps_ids() {
        let service = MemoryService::new();
        let id = service.save(&save_request("", "first")).unwrap();
        assert_eq!(id, "mem-1");

        let again = service.save(&save_request(&id, "renamed")).unwrap();
        assert_eq!(again, id);
        assert_eq!(service.count(), 1);
        assert_eq!(service.load(&id).unwrap().name, "renamed");
    }

    #[test]
    fn test_memory_list_and_missing() {
        let service = MemoryService::new();
        service.save(&save_request("", "named")).unwrap();
        service.save(&save_request("", "")).unwrap();

        let list = service.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name.as_deref(), Some("named"));
        assert_eq!(list[1].name, None);
        assert_eq!(list[0].to_string(), "named (mem-1)");

        assert_eq!(service.load("nope"), Err(ServiceError::NotFound("nope".into())));
    }

    #[test]
    fn test_memory_unavailable() {
        let service = MemoryService::new();
        service.set_available(false);
        assert!(!service.is_available());
        assert!(matches!(service.list(), Err(ServiceError::Network(_))));
    }

    #[test]
    fn test_dispatch_routes_requests() {
        let service = MemoryService::new();
        service.set_solution(vec![vec![1; 9]; 9]);

        let solved = dispatch(&service, &Request::Solve { board: vec![] }).unwrap();
        assert_eq!(solved, Response::Solved(vec![vec![1; 9]; 9]));

        let generated = dispatch(&service, &Request::Generate { difficulty: Difficulty::Easy });
        assert_eq!(generated, Err(ServiceError::NotConfigured));
    }

    #[test]
    fn test_validate_board_reports_conflicts() {
        let validation = validate_board(&[vec![4, 0, 4]]);
        assert!(!validation.ok);
        assert_eq!(
            validation.conflicts,
            vec![CellCoord { row: 0, col: 0 }, CellCoord { row: 0, col: 2 }]
        );
        assert!(validate_board(&[]).ok);
    }

    #[test]
    fn test_single_hint_points_at_cell() {
        let board = vec![vec![0, 2, 3, 4, 5, 6, 7, 8, 9]];
        let hint = single_hint(&board).unwrap();
        assert_eq!(hint.cells, vec![CellCoord { row: 0, col: 0 }]);
        assert_eq!(hint.message, "Single: only 1 fits here");
        assert_eq!(single_hint(&[]), None);
    }
}

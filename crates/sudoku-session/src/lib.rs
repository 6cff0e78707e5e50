//! Session state engine for an interactive Sudoku board
//!
//! This crate owns the live board (values, givens and pencil notes), the
//! cursor, bounded undo/redo history, candidate computation and the
//! dirty-tracking autosave policy. Solving, generating, hinting and storage
//! are delegated to a [`PuzzleService`] reached through queued requests, so the
//! engine itself does no I/O.

pub mod autosave;
pub mod candidates;
pub mod config;
pub mod grid;
pub mod history;
pub mod service;
pub mod session;

pub use autosave::{Clock, ManualClock, SessionState, SystemClock};
pub use config::SessionConfig;
pub use grid::{Cell, DigitSet, Grid, Position};
pub use history::{History, Snapshot, MAX_STACK};
pub use service::{
    dispatch, Difficulty, MemoryService, Outgoing, PuzzleBoard, PuzzleService, Request, RequestId, Response,
    ServiceError, ServiceResult, StrategyTier,
};
pub use session::{LoadMode, Session, SessionEvent, SessionMeta};

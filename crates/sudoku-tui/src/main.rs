mod app;
mod backend;
mod logging;
mod prefs;
mod render;
mod storage;
mod theme;
mod transport;

use app::App;
use backend::BackendKind;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use logging::LogConfig;
use prefs::PrefsStore;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use storage::FsStorage;
use sudoku_session::config::{DEFAULT_AUTOSAVE_INTERVAL_MS, DEFAULT_DEBOUNCE_MS};
use sudoku_session::{Difficulty, Session, SessionConfig, StrategyTier, MAX_STACK};
use tracing::{info, warn, Level};
use transport::Transport;

/// Terminal sudoku with undo/redo and autosave
#[derive(Debug, Parser)]
#[command(name = "sudoku", version, about)]
struct Args {
    /// Quiet period after the last edit before an autosave
    #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
    debounce_ms: u64,

    /// Periodic autosave interval while there are unsaved changes
    #[arg(long, default_value_t = DEFAULT_AUTOSAVE_INTERVAL_MS)]
    autosave_interval_ms: u64,

    /// Undo history depth
    #[arg(long, default_value_t = MAX_STACK)]
    history: usize,

    /// Difficulty of the first puzzle (easy, medium, hard, expert)
    /// [default: the last one played, else medium]
    #[arg(long)]
    difficulty: Option<Difficulty>,

    /// Hardest technique a hint may use (singles, pairs, advanced, xwing)
    #[arg(long, default_value_t = StrategyTier::Singles)]
    hint_tier: StrategyTier,

    /// Where saved puzzles are stored
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log file [default: <data-dir>/sudoku.log]
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Storage backend [default: from SUDOKU_ENV]
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,
}

impl Args {
    fn session_config(&self, difficulty: Difficulty) -> SessionConfig {
        SessionConfig {
            debounce_ms: self.debounce_ms,
            autosave_interval_ms: self.autosave_interval_ms,
            history_capacity: self.history,
            default_difficulty: difficulty,
        }
    }

    /// The flag wins over the remembered difficulty
    fn starting_difficulty(&self, remembered: Option<Difficulty>) -> Difficulty {
        self.difficulty.or(remembered).unwrap_or_default()
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(FsStorage::default_dir)
    }

    fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            log_file: Some(self.log_file.clone().unwrap_or_else(|| self.data_dir().join("sudoku.log"))),
        }
    }
}

/// How long to wait for the final save after the terminal is restored
const FLUSH_WAIT: Duration = Duration::from_millis(500);

fn main() -> io::Result<()> {
    let args = Args::parse();

    if let Err(e) = logging::init_logging(&args.log_config()) {
        eprintln!("Logging disabled: {}", e);
    }

    let kind = args.backend.unwrap_or_else(BackendKind::detect);
    let backend = backend::create_backend(kind, args.data_dir());
    let transport = Transport::spawn(backend)?;
    info!(backend = transport.backend_name(), "starting");

    let prefs = (kind == BackendKind::Local).then(|| PrefsStore::in_dir(&args.data_dir()));
    let remembered = prefs.as_ref().and_then(|p| p.load().last_difficulty);
    let difficulty = args.starting_difficulty(remembered);

    let mut app = App::new(Session::new(args.session_config(difficulty)), transport, args.hint_tier);
    if let Some(prefs) = prefs {
        app = app.with_prefs(prefs);
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

    let result = run_app(&mut stdout, &mut app, difficulty);
    let flush = app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(stdout, LeaveAlternateScreen, DisableMouseCapture)?;

    if let Some(done) = flush {
        match done.recv_timeout(FLUSH_WAIT) {
            Ok(Ok(_)) => info!("final save written"),
            Ok(Err(e)) => warn!(error = %e, "final save failed"),
            Err(_) => warn!("final save still running at exit"),
        }
    }

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

fn run_app(stdout: &mut io::Stdout, app: &mut App, difficulty: Difficulty) -> io::Result<()> {
    app.start(difficulty);

    loop {
        render::render(stdout, app)?;
        stdout.flush()?;

        if event::poll(app.poll_timeout())? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                // Handle Ctrl+C
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    break;
                }

                match app.handle_key(key) {
                    app::AppAction::Continue => {}
                    app::AppAction::Quit => break,
                }
            }
        }

        app.pump();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["sudoku"]).unwrap();
        assert_eq!(args.difficulty, None);
        assert_eq!(args.starting_difficulty(None), Difficulty::Medium);
        assert_eq!(
            args.session_config(args.starting_difficulty(None)),
            SessionConfig::default()
        );
        assert_eq!(args.hint_tier, StrategyTier::Singles);
        assert_eq!(args.log_level, Level::INFO);
        assert!(args.backend.is_none());
    }

    #[test]
    fn test_custom_args() {
        let args = Args::try_parse_from([
            "sudoku",
            "--debounce-ms",
            "500",
            "--history",
            "10",
            "--difficulty",
            "expert",
            "--hint-tier",
            "pairs",
            "--data-dir",
            "/tmp/puzzles",
            "--backend",
            "memory",
        ])
        .unwrap();

        let config = args.session_config(args.starting_difficulty(Some(Difficulty::Easy)));
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.default_difficulty, Difficulty::Expert);
        assert_eq!(args.hint_tier, StrategyTier::Pairs);
        assert_eq!(args.backend, Some(BackendKind::Memory));
        assert_eq!(args.log_config().log_file, Some(PathBuf::from("/tmp/puzzles/sudoku.log")));
    }

    #[test]
    fn test_remembered_difficulty_applies_without_flag() {
        let args = Args::try_parse_from(["sudoku"]).unwrap();
        assert_eq!(args.starting_difficulty(Some(Difficulty::Hard)), Difficulty::Hard);
    }

    #[test]
    fn test_rejects_unknown_difficulty() {
        assert!(Args::try_parse_from(["sudoku", "--difficulty", "impossible"]).is_err());
    }
}

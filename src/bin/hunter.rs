use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;
use window_hunter::config::{Difficulty, LevelTable, SessionConfig};
use window_hunter::desktop::{WindowTable, WinitDesktop};
use window_hunter::engine::GameEngine;
use window_hunter::error::EngineError;
use window_hunter::game_loop::{FrameObserver, GameLoop, InputSource};
use window_hunter::logging::init_tracing;
use window_hunter::score_store::ScoreStore;
use window_hunter::types::{InputEvent, Phase, SessionSummary, Snapshot, Vec2};

#[derive(Parser, Debug)]
#[command(author, version, about = "Hunt the windows on your desktop")]
struct Cli {
    /// easy, medium, hard or expert
    #[arg(long, default_value = "medium")]
    preset: String,
    #[arg(long)]
    seed: Option<u32>,
    /// JSON level table replacing the built-in one.
    #[arg(long)]
    levels: Option<PathBuf>,
    #[arg(long, default_value = "player")]
    name: String,
    #[arg(long, default_value = ".data/scores.json")]
    store: PathBuf,
    #[arg(long)]
    no_store: bool,
    /// How many leaderboard entries to print after the session.
    #[arg(long, default_value_t = 5)]
    top: usize,
}

#[derive(Default)]
struct Keyboard {
    held: HashSet<KeyCode>,
    dash: bool,
    pause: bool,
}

impl Keyboard {
    fn movement(&self) -> Vec2 {
        let pressed = |a: KeyCode, b: KeyCode| self.held.contains(&a) || self.held.contains(&b);
        let mut dir = Vec2::ZERO;
        if pressed(KeyCode::KeyW, KeyCode::ArrowUp) {
            dir.y -= 1.0;
        }
        if pressed(KeyCode::KeyS, KeyCode::ArrowDown) {
            dir.y += 1.0;
        }
        if pressed(KeyCode::KeyA, KeyCode::ArrowLeft) {
            dir.x -= 1.0;
        }
        if pressed(KeyCode::KeyD, KeyCode::ArrowRight) {
            dir.x += 1.0;
        }
        dir.normalized()
    }
}

impl InputSource for Keyboard {
    fn poll(&mut self, _view: &Snapshot) -> Vec<InputEvent> {
        let mut inputs = vec![InputEvent::Move(self.movement())];
        if std::mem::take(&mut self.dash) {
            inputs.push(InputEvent::Dash);
        }
        if std::mem::take(&mut self.pause) {
            inputs.push(InputEvent::Pause);
        }
        inputs
    }
}

/// The HUD lives in the player window's title bar.
#[derive(Default)]
struct TitleHud {
    title: Option<String>,
}

impl FrameObserver for TitleHud {
    fn on_frame(&mut self, snapshot: &Snapshot) {
        let player = &snapshot.player;
        let mut title = format!(
            "Hunter | Level {} {}/{} | HP {}/{} | Score {}",
            snapshot.level,
            snapshot.level_score,
            snapshot.level_threshold,
            player.health,
            player.max_health,
            snapshot.total_score
        );
        if player.dash_cooldown_ms > 0 {
            title.push_str(&format!(" | Dash {:.1}s", player.dash_cooldown_ms as f32 / 1000.0));
        }
        for effect in &player.effects {
            let secs = effect.remaining_ms.div_ceil(1000);
            title.push_str(&format!(" | {:?} {secs}s", effect.kind));
        }
        match snapshot.phase {
            Phase::LevelIntro => title.push_str(" | Get ready"),
            Phase::LevelComplete => title.push_str(" | Level complete"),
            _ => {}
        }
        if snapshot.paused {
            title.push_str(" | PAUSED");
        }
        self.title = Some(title);
    }
}

struct Session {
    game: GameLoop,
    windows: WindowTable,
    last_frame: Instant,
}

struct HunterApp {
    config: SessionConfig,
    table: LevelTable,
    seed: u32,
    keyboard: Keyboard,
    hud: TitleHud,
    session: Option<Session>,
    outcome: Option<Result<SessionSummary, EngineError>>,
}

impl HunterApp {
    fn new(config: SessionConfig, table: LevelTable, seed: u32) -> Self {
        Self {
            config,
            table,
            seed,
            keyboard: Keyboard::default(),
            hud: TitleHud::default(),
            session: None,
            outcome: None,
        }
    }

    fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.config.tick_ms)
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<Session, EngineError> {
        let mut windows = WindowTable::new(event_loop);
        let engine = {
            let mut desktop = WinitDesktop::new(event_loop, &mut windows);
            GameEngine::new(
                self.config.clone(),
                self.table.clone(),
                self.seed,
                &mut desktop,
            )?
        };
        Ok(Session {
            game: GameLoop::new(engine),
            windows,
            last_frame: Instant::now(),
        })
    }

    /// Ends the session, closing every window it still owns.
    fn finish(&mut self, event_loop: &ActiveEventLoop, result: Result<(), EngineError>) {
        if let Some(mut session) = self.session.take() {
            let closed = {
                let mut desktop = WinitDesktop::new(event_loop, &mut session.windows);
                session.game.engine_mut().shutdown(&mut desktop)
            };
            session.windows.close_all();
            debug!(closed, "desktop cleared");
            self.outcome = Some(result.map(|()| session.game.engine().build_summary()));
        } else if let Err(err) = result {
            self.outcome = Some(Err(err));
        }
        event_loop.exit();
    }

    fn quit_now(&mut self, event_loop: &ActiveEventLoop) {
        let result = match self.session.as_mut() {
            Some(session) => {
                let mut desktop = WinitDesktop::new(event_loop, &mut session.windows);
                session
                    .game
                    .engine_mut()
                    .step(&mut desktop, &[InputEvent::Quit])
            }
            None => Ok(()),
        };
        self.finish(event_loop, result);
    }

    fn on_key(
        &mut self,
        event_loop: &ActiveEventLoop,
        code: KeyCode,
        state: ElementState,
        repeat: bool,
    ) {
        match state {
            ElementState::Pressed => {
                self.keyboard.held.insert(code);
                if repeat {
                    return;
                }
                match code {
                    KeyCode::Space => self.keyboard.dash = true,
                    KeyCode::KeyP => self.keyboard.pause = true,
                    KeyCode::Escape => self.quit_now(event_loop),
                    _ => {}
                }
            }
            ElementState::Released => {
                self.keyboard.held.remove(&code);
            }
        }
    }
}

impl ApplicationHandler for HunterApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() || self.outcome.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(session) => {
                self.session = Some(session);
                event_loop.set_control_flow(ControlFlow::WaitUntil(
                    Instant::now() + self.tick_duration(),
                ));
            }
            Err(err) => {
                error!(error = %err, "session could not start");
                self.finish(event_loop, Err(err));
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                let is_player = self.session.as_ref().is_some_and(|session| {
                    let player = session.game.engine().player_window();
                    session
                        .windows
                        .handle_of(id)
                        .is_some_and(|handle| Some(handle) == player)
                });
                if is_player {
                    info!("player window closed");
                    self.quit_now(event_loop);
                } else {
                    debug!(?id, "close request on an entity window ignored");
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => self.on_key(event_loop, code, state, repeat),
            WindowEvent::Focused(false) => self.keyboard.held.clear(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let tick = self.tick_duration();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(session.last_frame);
        session.last_frame = now;

        let result = {
            let mut desktop = WinitDesktop::new(event_loop, &mut session.windows);
            session
                .game
                .run_frame(&mut desktop, &mut self.keyboard, &mut self.hud, elapsed)
        };
        if let Err(err) = result {
            error!(error = %err, "session aborted");
            self.finish(event_loop, Err(err));
            return;
        }
        if session.game.engine().is_ended() {
            self.finish(event_loop, Ok(()));
            return;
        }

        if let (Some(title), Some(handle)) =
            (self.hud.title.take(), session.game.engine().player_window())
        {
            session.windows.set_title(handle, &title);
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(now + tick));
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing(false);
    let cli = Cli::parse();

    let difficulty = Difficulty::parse(&cli.preset.to_lowercase())
        .ok_or_else(|| anyhow!("unknown preset '{}'", cli.preset))?;
    let config = SessionConfig {
        difficulty,
        ..SessionConfig::default()
    };
    config.validate().context("invalid session settings")?;
    let table = match cli.levels.as_deref() {
        Some(path) => LevelTable::from_path(path)
            .with_context(|| format!("invalid level table {}", path.display()))?,
        None => LevelTable::default(),
    };
    let seed = cli.seed.unwrap_or_else(rand::random::<u32>);
    info!(seed, ?difficulty, "starting window hunter");

    let event_loop = EventLoop::new().context("no windowing system available")?;
    let mut app = HunterApp::new(config, table, seed);
    event_loop
        .run_app(&mut app)
        .context("event loop failed")?;

    let summary = match app.outcome {
        Some(Ok(summary)) => summary,
        Some(Err(err)) => return Err(err).context("window hunter stopped"),
        None => return Ok(()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !cli.no_store {
        let mut store = ScoreStore::open(cli.store);
        if let Err(err) = store.record_session(&cli.name, &summary) {
            warn!(error = %err, "score not saved");
        } else if let Some(best) = store.player(&cli.name) {
            info!(
                best_score = best.best_score,
                best_level = best.best_level,
                sessions = best.sessions,
                "score saved"
            );
        }
        let board = store.leaderboard(Some(cli.top));
        println!("{}", serde_json::to_string_pretty(&board)?);
    }
    Ok(())
}

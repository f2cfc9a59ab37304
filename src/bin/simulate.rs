use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use window_hunter::autopilot::Autopilot;
use window_hunter::config::{Difficulty, LevelTable, SessionConfig};
use window_hunter::desktop::VirtualDesktop;
use window_hunter::engine::GameEngine;
use window_hunter::game_loop::{FrameObserver, GameLoop, InputSource};
use window_hunter::logging::init_tracing;
use window_hunter::score_store::{Leaderboard, ScoreStore};
use window_hunter::types::{
    Category, GameOverReason, InputEvent, Phase, RuntimeEvent, SessionSummary, Snapshot,
};

const DEFAULT_MAX_TICKS: u64 = 30 * 60 * 5;
const TICK_SAFETY_LIMIT: u64 = 30 * 60 * 30;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless Window Hunter sessions with anomaly checks")]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    preset: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    max_ticks: Option<u64>,
    #[arg(long)]
    max_minutes: Option<u64>,
    /// JSON level table replacing the built-in one.
    #[arg(long)]
    levels: Option<PathBuf>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    /// Record each scenario's result in this score store.
    #[arg(long)]
    store: Option<PathBuf>,
    /// Pace the single scenario in real time instead of running flat out.
    #[arg(long)]
    realtime: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Pilot {
    Autopilot,
    Idle,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    preset: Difficulty,
    seed: u32,
    #[serde(rename = "maxTicks")]
    max_ticks: u64,
    pilot: Pilot,
    #[serde(rename = "maxWindows")]
    max_windows: Option<usize>,
    #[serde(rename = "failedCreates")]
    failed_creates: usize,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    preset: Difficulty,
    reason: GameOverReason,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    ticks: u64,
    #[serde(rename = "levelReached")]
    level_reached: u8,
    #[serde(rename = "totalScore")]
    total_score: i32,
    #[serde(rename = "targetsCaptured")]
    targets_captured: u32,
    #[serde(rename = "bossHits")]
    boss_hits: u32,
    #[serde(rename = "damageTaken")]
    damage_taken: u32,
    #[serde(rename = "spawnSkipped")]
    spawn_skipped: u32,
    #[serde(rename = "peakWindows")]
    peak_windows: usize,
    #[serde(rename = "hudSkipped")]
    hud_skipped: u64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
    /// Standings of the `--store` file after this run's results were added.
    #[serde(skip_serializing_if = "Option::is_none")]
    leaderboard: Option<Leaderboard>,
}

#[derive(Default)]
struct Anomalies {
    messages: Vec<String>,
    records: Vec<AnomalyRecord>,
    seen: HashSet<String>,
}

impl Anomalies {
    fn push(&mut self, tick: u64, message: String) {
        push_anomaly(
            &mut self.messages,
            &mut self.records,
            &mut self.seen,
            tick,
            message,
        );
    }
}

/// Watches every delivered snapshot for states the engine must never reach.
struct Monitor<'a> {
    table: &'a LevelTable,
    anomalies: Anomalies,
    boss_hits: u32,
    damage_taken: u32,
    spawn_skipped: u32,
    peak_windows: usize,
    last_tick: u64,
}

impl<'a> Monitor<'a> {
    fn new(table: &'a LevelTable) -> Self {
        Self {
            table,
            anomalies: Anomalies::default(),
            boss_hits: 0,
            damage_taken: 0,
            spawn_skipped: 0,
            peak_windows: 0,
            last_tick: 0,
        }
    }
}

impl FrameObserver for Monitor<'_> {
    fn on_frame(&mut self, snapshot: &Snapshot) {
        self.last_tick = snapshot.tick;
        self.peak_windows = self.peak_windows.max(snapshot.entities.len() + 1);
        for message in collect_snapshot_anomalies(snapshot, self.table) {
            self.anomalies.push(snapshot.tick, message);
        }
        for event in &snapshot.events {
            match event {
                RuntimeEvent::BossHit { .. } => self.boss_hits += 1,
                RuntimeEvent::PlayerDamaged { .. } => self.damage_taken += 1,
                RuntimeEvent::SpawnSkipped { .. } => self.spawn_skipped += 1,
                _ => {}
            }
        }
    }
}

struct IdlePilot;

impl InputSource for IdlePilot {
    fn poll(&mut self, _view: &Snapshot) -> Vec<InputEvent> {
        Vec::new()
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing(true);
    let cli = Cli::parse();
    let table = match cli.levels.as_deref() {
        Some(path) => LevelTable::from_path(path)
            .with_context(|| format!("invalid level table {}", path.display()))?,
        None => LevelTable::default(),
    };
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(seed_hint, run_started_at_ms));
    let mut store = cli.store.clone().map(ScoreStore::open);
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        info!(
            run_id = %run_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            preset = ?scenario.preset,
            max_ticks = scenario.max_ticks,
            "scenario_started"
        );
        let scenario_run = if cli.realtime {
            run_scenario_realtime(&scenario, &table)?
        } else {
            run_scenario(&scenario, &table)?
        };

        for anomaly in &scenario_run.anomaly_records {
            warn!(
                run_id = %run_id,
                scenario = %scenario.name,
                tick = anomaly.tick,
                detail = %anomaly.message,
                "anomaly_detected"
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_duration_ms += scenario_run.result.duration_ms;
        *reason_counts
            .entry(game_over_reason_key(scenario_run.result.reason))
            .or_insert(0) += 1;

        info!(
            run_id = %run_id,
            scenario = %scenario.name,
            tick = scenario_run.finished_tick,
            reason = ?scenario_run.result.reason,
            total_score = scenario_run.result.total_score,
            level_reached = scenario_run.result.level_reached,
            anomaly_count = scenario_run.anomaly_records.len(),
            "scenario_finished"
        );

        if let Some(store) = store.as_mut() {
            let summary = &scenario_run.result;
            let name = format!("sim-{}", scenario.name);
            if let Err(err) = store.record_session(&name, &to_session_summary(summary)) {
                warn!(path = %store.path().display(), error = %err, "score store write failed");
            }
        }

        println!("{}", serde_json::to_string(&scenario_run.result)?);
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let mut summary = build_run_summary(
        run_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results,
        reason_counts,
        total_anomalies,
        total_duration_ms,
    );
    summary.leaderboard = store.as_ref().map(|store| store.leaderboard(None));

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(
                run_id = %run_id,
                path = %path.display(),
                error = %err,
                "summary_write_failed"
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    info!(
        run_id = %run_id,
        scenario_count = summary.scenario_count,
        anomaly_count = summary.anomaly_count,
        average_duration_ms = summary.average_duration_ms,
        summary_out = ?summary_out_written,
        "run_finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
    Ok(())
}

fn session_config(scenario: &Scenario) -> SessionConfig {
    SessionConfig {
        difficulty: scenario.preset,
        ..SessionConfig::default()
    }
}

fn pilot_for(scenario: &Scenario) -> Box<dyn InputSource> {
    match scenario.pilot {
        Pilot::Autopilot => Box::new(Autopilot::new(scenario.seed ^ 0x5eed)),
        Pilot::Idle => Box::new(IdlePilot),
    }
}

fn run_scenario(scenario: &Scenario, table: &LevelTable) -> anyhow::Result<ScenarioRunResult> {
    let mut desktop = VirtualDesktop::default();
    // the player window always opens; injected failures start after it
    let engine = GameEngine::new(session_config(scenario), table.clone(), scenario.seed, &mut desktop)
        .context("engine failed to start")?;
    let mut desktop = reseat(desktop, scenario);
    let mut game = GameLoop::new(engine).with_tick_budget(Duration::MAX);
    let mut pilot = pilot_for(scenario);
    let mut monitor = Monitor::new(table);
    let limit = scenario.max_ticks.min(TICK_SAFETY_LIMIT);

    while !game.engine().is_ended() && game.engine().tick() < limit {
        let before = game.engine().tick();
        game.run_tick(&mut desktop, pilot.as_mut(), &mut monitor)
            .context("session aborted")?;
        let engine = game.engine();
        let tick = engine.tick();
        for drift in engine.drift(&desktop, 1) {
            monitor.anomalies.push(
                tick,
                format!("window {} drifted from its logical position", drift.id),
            );
        }
        if desktop.open_count() != engine.entities().len() + 1 {
            monitor.anomalies.push(
                tick,
                format!(
                    "window leak: {} open for {} entities",
                    desktop.open_count(),
                    engine.entities().len() + 1
                ),
            );
        }
        if tick == before && engine.is_paused() {
            break;
        }
    }
    if !game.engine().is_ended() && scenario.max_ticks > TICK_SAFETY_LIMIT {
        monitor
            .anomalies
            .push(game.engine().tick(), "tick safety limit exceeded".to_string());
    }

    let closed = game.engine_mut().shutdown(&mut desktop);
    if desktop.open_count() != 0 {
        monitor.anomalies.push(
            game.engine().tick(),
            format!("{} windows left open after closing {closed}", desktop.open_count()),
        );
    }
    let hud_skipped = game.hud_skipped();
    Ok(finish_result(scenario, game.engine(), monitor, hud_skipped))
}

fn run_scenario_realtime(
    scenario: &Scenario,
    table: &LevelTable,
) -> anyhow::Result<ScenarioRunResult> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let mut desktop = VirtualDesktop::default();
    let engine = GameEngine::new(session_config(scenario), table.clone(), scenario.seed, &mut desktop)
        .context("engine failed to start")?;
    let mut desktop = reseat(desktop, scenario);
    let mut game = GameLoop::new(engine);
    let mut pilot = pilot_for(scenario);
    let mut monitor = Monitor::new(table);

    runtime
        .block_on(game.run_paced(
            &mut desktop,
            pilot.as_mut(),
            &mut monitor,
            scenario.max_ticks.min(TICK_SAFETY_LIMIT),
        ))
        .context("session aborted")?;
    if desktop.open_count() != 0 {
        monitor.anomalies.push(
            game.engine().tick(),
            format!("{} windows left open", desktop.open_count()),
        );
    }
    let hud_skipped = game.hud_skipped();
    Ok(finish_result(scenario, game.engine(), monitor, hud_skipped))
}

/// Applies the scenario's window-manager limits once the player window
/// exists, keeping the same screen and open windows.
fn reseat(desktop: VirtualDesktop, scenario: &Scenario) -> VirtualDesktop {
    let mut desktop = match scenario.max_windows {
        Some(max) => desktop.with_max_windows(max),
        None => desktop,
    };
    desktop.fail_next_creates(scenario.failed_creates);
    desktop
}

fn finish_result(
    scenario: &Scenario,
    engine: &GameEngine,
    monitor: Monitor<'_>,
    hud_skipped: u64,
) -> ScenarioRunResult {
    let summary = engine.build_summary();
    let finished_tick = monitor.last_tick.max(summary.ticks);
    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            preset: scenario.preset,
            reason: summary.reason,
            duration_ms: summary.duration_ms,
            ticks: summary.ticks,
            level_reached: summary.level_reached,
            total_score: summary.total_score,
            targets_captured: summary.targets_captured,
            boss_hits: monitor.boss_hits,
            damage_taken: monitor.damage_taken,
            spawn_skipped: monitor.spawn_skipped,
            peak_windows: monitor.peak_windows,
            hud_skipped,
            anomalies: monitor.anomalies.messages,
        },
        anomaly_records: monitor.anomalies.records,
        finished_tick,
    }
}

fn to_session_summary(line: &ScenarioResultLine) -> SessionSummary {
    SessionSummary {
        reason: line.reason,
        duration_ms: line.duration_ms,
        ticks: line.ticks,
        level_reached: line.level_reached,
        levels_completed: 0,
        total_score: line.total_score,
        targets_captured: line.targets_captured,
        bosses_defeated: 0,
    }
}

fn collect_snapshot_anomalies(snapshot: &Snapshot, table: &LevelTable) -> Vec<String> {
    let mut anomalies = Vec::new();
    let level = table.level(snapshot.level);

    for category in Category::ALL {
        let live = snapshot
            .entities
            .iter()
            .filter(|entity| entity.kind.category() == Some(category))
            .count();
        let cap = level.rule(category).cap;
        if live > cap {
            anomalies.push(format!(
                "{category:?} cap exceeded on level {}: {live}/{cap}",
                snapshot.level
            ));
        }
    }

    if snapshot.phase == Phase::LevelComplete && !snapshot.entities.is_empty() {
        anomalies.push(format!(
            "{} entities survived a level transition",
            snapshot.entities.len()
        ));
    }

    let player = &snapshot.player;
    if player.health < 0 || player.health > player.max_health {
        anomalies.push(format!(
            "player health out of range: {}/{}",
            player.health, player.max_health
        ));
    }
    if snapshot.level_score < 0 || snapshot.total_score < snapshot.level_score {
        anomalies.push(format!(
            "inconsistent score: level {} total {}",
            snapshot.level_score, snapshot.total_score
        ));
    }
    for entity in &snapshot.entities {
        if entity.health.is_some_and(|hp| hp <= 0) {
            anomalies.push(format!("entity with hp <= 0 remains: {}", entity.id));
        }
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(rand::random::<u64>));
    let preset = cli
        .preset
        .as_deref()
        .and_then(Difficulty::parse)
        .unwrap_or(Difficulty::Medium);
    let max_ticks = cli
        .max_ticks
        .or(cli.max_minutes.map(|minutes| minutes.clamp(1, 30) * 60 * 30))
        .unwrap_or(DEFAULT_MAX_TICKS);

    if cli.single || cli.realtime || cli.preset.is_some() {
        return vec![Scenario {
            name: format!("custom-{}", game_preset_key(preset)),
            preset,
            seed,
            max_ticks,
            pilot: Pilot::Autopilot,
            max_windows: None,
            failed_creates: 0,
        }];
    }

    vec![
        Scenario {
            name: "standard-medium".to_string(),
            preset: Difficulty::Medium,
            seed,
            max_ticks,
            pilot: Pilot::Autopilot,
            max_windows: None,
            failed_creates: 0,
        },
        Scenario {
            name: "expert-rush".to_string(),
            preset: Difficulty::Expert,
            seed: normalize_seed(seed as u64 + 1),
            max_ticks,
            pilot: Pilot::Autopilot,
            max_windows: None,
            failed_creates: 0,
        },
        Scenario {
            name: "window-pressure".to_string(),
            preset: Difficulty::Medium,
            seed: normalize_seed(seed as u64 + 2),
            max_ticks,
            pilot: Pilot::Autopilot,
            max_windows: Some(6),
            failed_creates: 3,
        },
        Scenario {
            name: "idle-easy".to_string(),
            preset: Difficulty::Easy,
            seed: normalize_seed(seed as u64 + 3),
            max_ticks: max_ticks.min(30 * 60),
            pilot: Pilot::Idle,
            max_windows: None,
            failed_creates: 0,
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_run_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    reason_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        reason_counts,
        scenarios,
        leaderboard: None,
    }
}

fn game_over_reason_key(reason: GameOverReason) -> String {
    match reason {
        GameOverReason::Victory => "victory",
        GameOverReason::Defeated => "defeated",
        GameOverReason::Quit => "quit",
    }
    .to_string()
}

fn game_preset_key(preset: Difficulty) -> &'static str {
    match preset {
        Difficulty::Easy => "easy",
        Difficulty::Medium => "medium",
        Difficulty::Hard => "hard",
        Difficulty::Expert => "expert",
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

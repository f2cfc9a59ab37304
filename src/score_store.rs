use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{GameOverReason, SessionSummary};

const STORE_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to serialize score store: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredPlayer {
    name: String,
    sessions: u64,
    wins: u64,
    #[serde(rename = "bestScore", alias = "best_score")]
    best_score: i32,
    #[serde(rename = "bestLevel", alias = "best_level")]
    best_level: u8,
    #[serde(rename = "totalScore", alias = "total_score", default)]
    total_score: i64,
    #[serde(rename = "updatedAt", alias = "updated_at")]
    updated_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ScoreStoreFile {
    version: u8,
    players: HashMap<String, StoredPlayer>,
}

#[derive(Clone, Debug, Deserialize)]
struct ScoreStoreFileRaw {
    version: u8,
    players: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerRecord {
    pub name: String,
    pub sessions: u64,
    pub wins: u64,
    #[serde(rename = "bestScore")]
    pub best_score: i32,
    #[serde(rename = "bestLevel")]
    pub best_level: u8,
    #[serde(rename = "avgScore")]
    pub avg_score: f64,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Leaderboard {
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    pub entries: Vec<PlayerRecord>,
}

/// Per-player bests kept across sessions. The engine never reads this; the
/// binaries record a summary once a session has ended.
pub struct ScoreStore {
    file_path: PathBuf,
    players: HashMap<String, StoredPlayer>,
}

impl ScoreStore {
    pub fn open(file_path: PathBuf) -> Self {
        let players = load_players(&file_path);
        debug!(path = %file_path.display(), players = players.len(), "score store opened");
        Self { file_path, players }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn record_session(
        &mut self,
        name: &str,
        summary: &SessionSummary,
    ) -> Result<(), StoreError> {
        let key = player_key(name);
        if key.is_empty() {
            warn!("session not recorded: empty player name");
            return Ok(());
        }
        let now = now_iso();
        let current = self.players.entry(key).or_insert_with(|| StoredPlayer {
            name: name.trim().to_string(),
            sessions: 0,
            wins: 0,
            best_score: 0,
            best_level: 0,
            total_score: 0,
            updated_at: now.clone(),
        });

        current.name = name.trim().to_string();
        current.sessions += 1;
        if summary.reason == GameOverReason::Victory {
            current.wins += 1;
        }
        current.best_score = current.best_score.max(summary.total_score);
        current.best_level = current.best_level.max(summary.level_reached);
        current.total_score += i64::from(summary.total_score.max(0));
        current.updated_at = now;

        self.save()
    }

    pub fn player(&self, name: &str) -> Option<PlayerRecord> {
        self.players.get(&player_key(name)).map(to_record)
    }

    pub fn leaderboard(&self, requested_limit: Option<usize>) -> Leaderboard {
        let limit = requested_limit.unwrap_or(10).clamp(1, 100);
        let mut entries: Vec<PlayerRecord> = self.players.values().map(to_record).collect();
        entries.sort_by(|a, b| {
            b.best_score
                .cmp(&a.best_score)
                .then_with(|| b.best_level.cmp(&a.best_level))
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        entries.truncate(limit);
        Leaderboard {
            generated_at: now_iso(),
            entries,
        }
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload = ScoreStoreFile {
            version: STORE_VERSION,
            players: self.players.clone(),
        };
        let text = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.file_path, text).map_err(|source| StoreError::Write {
            path: self.file_path.clone(),
            source,
        })
    }
}

fn to_record(entry: &StoredPlayer) -> PlayerRecord {
    PlayerRecord {
        name: entry.name.clone(),
        sessions: entry.sessions,
        wins: entry.wins.min(entry.sessions),
        best_score: entry.best_score,
        best_level: entry.best_level,
        avg_score: entry.total_score as f64 / entry.sessions.max(1) as f64,
        updated_at: entry.updated_at.clone(),
    }
}

/// Unreadable or foreign files start an empty store; the next save
/// replaces them.
fn load_players(path: &Path) -> HashMap<String, StoredPlayer> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read score store");
            }
            return HashMap::new();
        }
    };
    let parsed = match serde_json::from_str::<ScoreStoreFileRaw>(&text) {
        Ok(value) if value.version == STORE_VERSION => value,
        Ok(value) => {
            warn!(path = %path.display(), version = value.version, "unsupported score store version");
            return HashMap::new();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse score store");
            return HashMap::new();
        }
    };

    let mut sanitized = HashMap::<String, StoredPlayer>::new();
    for (player_key_raw, raw_value) in parsed.players {
        let value: StoredPlayer = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(entry = %player_key_raw, %error, "skipping malformed score entry");
                continue;
            }
        };
        let Some(normalized) = sanitize(value) else {
            continue;
        };
        let key = player_key(&normalized.name);

        match sanitized.get_mut(&key) {
            Some(current) => {
                current.sessions += normalized.sessions;
                current.wins += normalized.wins;
                current.best_score = current.best_score.max(normalized.best_score);
                current.best_level = current.best_level.max(normalized.best_level);
                current.total_score += normalized.total_score;
                if normalized.updated_at > current.updated_at {
                    current.name = normalized.name;
                    current.updated_at = normalized.updated_at;
                }
            }
            None => {
                sanitized.insert(key, normalized);
            }
        }
    }
    sanitized
}

fn sanitize(value: StoredPlayer) -> Option<StoredPlayer> {
    let name = value.name.trim().to_string();
    if name.is_empty() {
        return None;
    }
    Some(StoredPlayer {
        name,
        wins: value.wins.min(value.sessions),
        best_score: value.best_score.max(0),
        total_score: value.total_score.max(0),
        ..value
    })
}

fn player_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

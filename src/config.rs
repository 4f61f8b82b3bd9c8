//! Engine configuration.
//!
//! Read from `<HOME>/.mama/config.json`. Missing or malformed fields fall
//! back to defaults with a warning; the file is (re)written with the
//! resolved defaults on first read if it did not already exist, mirroring
//! the read-if-present/fall-back-and-persist pattern used elsewhere in the
//! corpus for per-project config propagation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scorer::ScorerWeights;

/// Default multilingual embedding model identifier.
pub const DEFAULT_MODEL_NAME: &str = "nomic-ai/nomic-embed-text-v1.5";

/// Default auto-outcome detection window, in minutes (spec.md §4.5).
pub const DEFAULT_AUTO_OUTCOME_WINDOW_MINUTES: i64 = 60;

/// Engine-wide configuration, loaded once at [`crate::Engine::open`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Identifier of the text-embedding model.
    pub model_name: String,
    /// Vector width; must match the model.
    pub embedding_dim: usize,
    /// Where model weights are cached on disk.
    pub cache_dir: Option<PathBuf>,
    /// Hybrid scorer weights (§4.6) — documented defaults, tunable here
    /// per Design Note §9 ("pick defaults and make them tunable").
    pub scorer_weights: ScorerWeights,
    /// Minutes after creation during which `analyze_outcome` may auto-apply
    /// a detected outcome signal (§4.5) — a knob, not a hard rule.
    pub auto_outcome_window_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            embedding_dim: crate::DEFAULT_EMBEDDING_DIM,
            cache_dir: None,
            scorer_weights: ScorerWeights::default(),
            auto_outcome_window_minutes: DEFAULT_AUTO_OUTCOME_WINDOW_MINUTES,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `path`, falling back to defaults for any
    /// field that is missing or fails to parse. Creates the file with
    /// resolved defaults if it does not exist yet.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            let defaults = Self::default();
            defaults.write_best_effort(path);
            return defaults;
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(
                        "config at {:?} failed to parse ({e}); using defaults",
                        path
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("could not read config at {:?} ({e}); using defaults", path);
                Self::default()
            }
        }
    }

    /// The default config file location: `<HOME>/.mama/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".mama").join("config.json"))
    }

    fn write_best_effort(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("could not create config directory {:?}: {e}", parent);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!("could not write default config to {:?}: {e}", path);
                }
            }
            Err(e) => tracing::warn!("could not serialize default config: {e}"),
        }
    }
}

/// Resolve the on-disk store path: `$MAMA_DB_PATH`, else a legacy path if
/// present, else the well-known default under the user's home directory.
pub fn resolve_db_path(override_path: Option<PathBuf>) -> std::io::Result<PathBuf> {
    if let Some(p) = override_path {
        return ensure_parent(&p).map(|_| p);
    }

    if let Ok(env_path) = std::env::var("MAMA_DB_PATH") {
        let p = PathBuf::from(env_path);
        ensure_parent(&p)?;
        return Ok(p);
    }

    let base = directories::BaseDirs::new().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "could not determine home directory",
        )
    })?;

    let legacy = base.home_dir().join(".mama-memory").join("mama-memory.db");
    if legacy.exists() {
        tracing::info!("using legacy store path {:?}", legacy);
        return Ok(legacy);
    }

    let default_dir = base.home_dir().join(".mama");
    std::fs::create_dir_all(&default_dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        let _ = std::fs::set_permissions(&default_dir, perms);
    }
    Ok(default_dir.join("mama-memory.db"))
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Whether the context injector hook is disabled via `$MAMA_DISABLE_HOOKS`.
pub fn hooks_disabled() -> bool {
    std::env::var("MAMA_DISABLE_HOOKS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

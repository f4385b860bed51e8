// src/infra/paths.rs — Config and state path management
//
// All paths respect the LESSONGATE_HOME environment variable for isolation.
// When LESSONGATE_HOME is set, config and state live under that directory.
// When unset, config uses ~/.lessongate/.

use std::path::PathBuf;

/// Returns the LESSONGATE_HOME override, if set.
fn lessongate_home() -> Option<PathBuf> {
    std::env::var_os("LESSONGATE_HOME").map(PathBuf::from)
}

/// Configuration directory: $LESSONGATE_HOME/ or ~/.lessongate/
pub fn config_dir() -> PathBuf {
    if let Some(home) = lessongate_home() {
        return home;
    }
    dirs_home().join(".lessongate")
}

/// Home directory, falling back to the working directory when it cannot be resolved.
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// State directory: ~/.lessongate/state/ (run-state.json, run-history.jsonl)
pub fn state_dir() -> PathBuf {
    config_dir().join("state")
}

// ABOUTME: Per-user locations for the kittengames settings database, rolling logs and config.toml
// ABOUTME: Resolved through the platform's standard user directories with local fallbacks

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "kittengames";
const APPLICATION: &str = "kittengames";

fn user_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Where the settings database lives unless `storage.data_dir` overrides it.
/// `./data` when the platform reports no home directory.
pub fn data_dir() -> PathBuf {
    user_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Target of `--log-file`.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Home of the user-wide config.toml, or the working directory without one.
pub fn config_dir() -> PathBuf {
    user_dirs()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

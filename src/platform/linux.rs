// Linux follows the XDG base directory layout.

use std::env;
use std::path::PathBuf;

use super::APP_DIR;

fn home() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
}

/// `base` if set and non-empty, otherwise `~/<fallback>`; always suffixed with the app dir.
fn xdg_dir(base: Option<String>, fallback: &[&str]) -> PathBuf {
    match base.filter(|b| !b.is_empty()) {
        Some(base) => PathBuf::from(base).join(APP_DIR),
        None => fallback
            .iter()
            .fold(home(), |path, part| path.join(part))
            .join(APP_DIR),
    }
}

pub fn get_config_dir() -> PathBuf {
    xdg_dir(env::var("XDG_CONFIG_HOME").ok(), &[".config"])
}

pub fn get_data_dir() -> PathBuf {
    xdg_dir(env::var("XDG_DATA_HOME").ok(), &[".local", "share"])
}

//! Per-OS locations of the settings file and the session database.

use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

/// Directory name used under the platform base directories.
pub const APP_DIR: &str = "smartmarks";

/// Directory holding `settings.json`.
///
/// - **Linux**: `$XDG_CONFIG_HOME/smartmarks` or `~/.config/smartmarks`
/// - **macOS**: `~/Library/Application Support/SmartMarks`
/// - **Windows**: `%APPDATA%/SmartMarks`
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_config_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_config_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_config_dir()
    }
}

/// Directory holding the session database.
///
/// - **Linux**: `$XDG_DATA_HOME/smartmarks` or `~/.local/share/smartmarks`
/// - **macOS**: `~/Library/Application Support/SmartMarks`
/// - **Windows**: `%LOCALAPPDATA%/SmartMarks`
pub fn get_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_data_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_data_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_data_dir()
    }
}

// macOS keeps settings and data together under Application Support.

use std::env;
use std::path::PathBuf;

fn app_support() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
        .join("Library")
        .join("Application Support")
        .join("SmartMarks")
}

pub fn get_config_dir() -> PathBuf {
    app_support()
}

pub fn get_data_dir() -> PathBuf {
    app_support()
}

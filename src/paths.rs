//! Where sweep keeps its files. Every path can be overridden from the
//! environment; otherwise everything lives under `$HOME/.sweep`.

fn home_file(name: &str) -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    format!("{home}/.sweep/{name}")
}

/// Resolve the database path.
/// Checks `SWEEP_DB` env var, falls back to `$HOME/.sweep/sweep.db`.
pub fn db_path() -> String {
    std::env::var("SWEEP_DB").unwrap_or_else(|_| home_file("sweep.db"))
}

/// Resolve the config file path.
/// Checks `SWEEP_CONFIG` env var, falls back to `$HOME/.sweep/config.toml`.
pub fn config_path() -> String {
    std::env::var("SWEEP_CONFIG").unwrap_or_else(|_| home_file("config.toml"))
}

/// Log file named by `SWEEP_LOG`, if any.
pub fn log_path() -> Option<String> {
    std::env::var("SWEEP_LOG").ok().filter(|p| !p.is_empty())
}

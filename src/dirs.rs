use std::path::{Path, PathBuf};

/// Returns the base directory for monitor data.
///
/// Uses `$A3S_TOS_MONITOR_HOME` if set, otherwise defaults to
/// `~/.a3s/tos-monitor`.
pub fn monitor_home() -> PathBuf {
    if let Ok(home) = std::env::var("A3S_TOS_MONITOR_HOME") {
        return PathBuf::from(home);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".a3s")
        .join("tos-monitor")
}

/// Returns the path to the user configuration file.
pub fn config_path() -> PathBuf {
    monitor_home().join("config.toml")
}

/// Directory holding the append-only evidence log under `data_dir`.
pub fn evidence_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("evidence")
}

/// Directory holding write-once local snapshot records under `data_dir`.
pub fn records_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("records")
}

/// Ensure all required directories exist.
pub fn ensure_dirs(data_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(evidence_dir(data_dir))?;
    std::fs::create_dir_all(records_dir(data_dir))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_home_env_override() {
        std::env::set_var("A3S_TOS_MONITOR_HOME", "/tmp/test-tos-monitor");
        assert_eq!(monitor_home(), PathBuf::from("/tmp/test-tos-monitor"));
        assert_eq!(
            config_path(),
            PathBuf::from("/tmp/test-tos-monitor/config.toml")
        );

        std::env::remove_var("A3S_TOS_MONITOR_HOME");
        let home = monitor_home();
        assert!(home.ends_with(".a3s/tos-monitor") || home.ends_with(".a3s\\tos-monitor"));
    }

    #[test]
    fn test_data_subdirs() {
        let base = Path::new("/data");
        assert_eq!(evidence_dir(base), PathBuf::from("/data/evidence"));
        assert_eq!(records_dir(base), PathBuf::from("/data/records"));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        ensure_dirs(dir.path()).unwrap();
        assert!(evidence_dir(dir.path()).is_dir());
        assert!(records_dir(dir.path()).is_dir());
    }
}

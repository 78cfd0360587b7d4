// src/infra/paths.rs — Path management
//
// All paths respect the CLOUDHAND_HOME environment variable for isolation.
// When CLOUDHAND_HOME is set, config and data live under that directory.
// When unset, config uses ~/.cloudhand/ and data uses XDG_DATA_HOME/cloudhand.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<ProjectDirs> = OnceLock::new();

fn project_dirs() -> &'static ProjectDirs {
    PROJECT_DIRS.get_or_init(|| {
        ProjectDirs::from("", "", "cloudhand").expect("Could not determine home directory")
    })
}

fn cloudhand_home() -> Option<PathBuf> {
    std::env::var_os("CLOUDHAND_HOME").map(PathBuf::from)
}

/// Configuration directory: $CLOUDHAND_HOME/ or ~/.cloudhand/
pub fn config_dir() -> PathBuf {
    if let Some(home) = cloudhand_home() {
        return home;
    }
    dirs_home().join(".cloudhand")
}

/// Data directory: $CLOUDHAND_HOME/data/ or XDG_DATA_HOME/cloudhand
pub fn data_dir() -> PathBuf {
    if let Some(home) = cloudhand_home() {
        return home.join("data");
    }
    project_dirs().data_local_dir().to_path_buf()
}

fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .expect("Could not determine home directory")
        .home_dir()
        .to_path_buf()
}

/// Session snapshot directory
pub fn sessions_dir() -> PathBuf {
    data_dir().join("sessions")
}

/// SSH control socket directory
pub fn control_sockets_dir() -> PathBuf {
    data_dir().join("ctl")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    let dirs = [
        config_dir(),
        data_dir(),
        sessions_dir(),
        control_sockets_dir(),
    ];

    for dir in &dirs {
        tokio::fs::create_dir_all(dir).await?;
    }

    Ok(())
}

use std::path::PathBuf;

use crate::config::DEFAULT_LUDOCORE_HOME;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The sub directory where ludocore artifacts, configs, etc are stored.
pub const LUDOCORE_HOME_DIR: &str = ".ludocore";

/// The environment variable that overrides the ludocore home directory.
pub const LUDOCORE_HOME_ENV_VAR: &str = "LUDOCORE_HOME";

/// The filename where the admission API key is stored.
pub const API_KEY_FILENAME: &str = "apikey";

/// The filename for the persisted dashboard TLS certificate.
pub const TLS_CERT_FILENAME: &str = "cert.pem";

/// The filename for the persisted dashboard TLS private key.
pub const TLS_KEY_FILENAME: &str = "key.pem";

/// The filename for the event-log database.
pub const HISTORY_DB_FILENAME: &str = "history.db";

/// The filename for the daemon PID file.
pub const DAEMON_PID_FILENAME: &str = "ludocore.pid";

/// The filename for the daemon log file.
pub const DAEMON_LOG_FILENAME: &str = "ludocore.log";

/// The sub directory holding the most recently ingested server build.
pub const STAGING_SUBDIR: &str = "staging";

/// The marker file that keeps the staging directory present across clears.
pub const STAGING_MARKER_FILENAME: &str = ".keep";

/// The sub directory holding recipe presets and the active recipe.
pub const RECIPES_SUBDIR: &str = "recipes";

/// The filename of the active recipe inside [`RECIPES_SUBDIR`].
pub const ACTIVE_RECIPE_FILENAME: &str = "active.Dockerfile";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the path where all ludocore artifacts, configs, etc are stored.
pub fn ludocore_home_path() -> PathBuf {
    if let Ok(home) = std::env::var(LUDOCORE_HOME_ENV_VAR) {
        PathBuf::from(home)
    } else {
        DEFAULT_LUDOCORE_HOME.to_owned()
    }
}

/// Returns the path of the build staging directory.
pub fn staging_dir_path() -> PathBuf {
    ludocore_home_path().join(STAGING_SUBDIR)
}

/// Returns the path of the recipes directory.
pub fn recipes_dir_path() -> PathBuf {
    ludocore_home_path().join(RECIPES_SUBDIR)
}

use std::{path::PathBuf, sync::LazyLock};

use crate::utils::LUDOCORE_HOME_DIR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The loopback port the privileged API binds to.
pub const DEFAULT_API_PORT: u16 = 3000;

/// The external port the TLS dashboard binds to.
pub const DEFAULT_GUI_PORT: u16 = 9090;

/// The external port the matchmaking surface binds to.
pub const DEFAULT_MATCH_PORT: u16 = 7070;

/// The base port game-server instances are allocated from.
pub const DEFAULT_GAME_PORT: u16 = 7777;

/// How far above the base port auto-allocation will search.
pub const PORT_SEARCH_SPAN: u16 = 1000;

/// The image tag instances are started from.
pub const DEFAULT_IMAGE_TAG: &str = "ludocore-server";

/// The fallback per-instance player capacity used until the in-container
/// agent reports a real one.
pub const DEFAULT_MAX_PLAYERS: u32 = 4;

/// The echo service used to discover the host's externally reachable address.
pub const IP_ECHO_URL: &str = "https://api.ipify.org";

/// Timeout for the one-shot external IP detection at startup.
pub const IP_DETECT_TIMEOUT_SECS: u64 = 5;

/// The path where all ludocore global data is stored.
pub static DEFAULT_LUDOCORE_HOME: LazyLock<PathBuf> =
    LazyLock::new(|| dirs::home_dir().unwrap().join(LUDOCORE_HOME_DIR));

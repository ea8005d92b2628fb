use clap::Parser;

use crate::{
    cli::styles,
    config::{DEFAULT_API_PORT, DEFAULT_GUI_PORT, DEFAULT_MATCH_PORT},
};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// `ludocore` is a control plane for single-host fleets of containerized game
/// servers, with built-in matchmaking.
#[derive(Debug, Parser)]
#[command(name = "ludocore", author, styles = styles::styles())]
pub struct LudocoreArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<LudocoreSubcommand>,

    /// Show version
    #[arg(short = 'v', long)]
    pub version: bool,
}

/// Available subcommands for operating the control plane
#[derive(Debug, Parser)]
pub enum LudocoreSubcommand {
    /// Start the control-plane daemon (API, matchmaking, and dashboard)
    #[command(name = "serve")]
    Serve {
        /// Loopback port for the privileged API
        #[arg(long, default_value_t = DEFAULT_API_PORT)]
        api_port: u16,

        /// External TLS port for the dashboard
        #[arg(long, default_value_t = DEFAULT_GUI_PORT)]
        gui_port: u16,

        /// External port for the matchmaking surface
        #[arg(long, default_value_t = DEFAULT_MATCH_PORT)]
        match_port: u16,

        /// Externally reachable IP returned to game clients (auto-detected
        /// when omitted)
        #[arg(long)]
        public_ip: Option<String>,

        /// HMAC secret for join tokens (fresh random when omitted; previously
        /// issued tokens then stop validating after a restart)
        #[arg(long)]
        token_secret: Option<String>,

        /// Stay in the foreground instead of detaching
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the daemon, stopping all running instances first
    #[command(name = "shutdown")]
    Shutdown,

    /// Start one game-server instance
    #[command(name = "start")]
    Start {
        /// Explicit external port (auto-assigned when omitted)
        port: Option<u16>,
    },

    /// Stop the named instance
    #[command(name = "stop")]
    Stop {
        /// Instance name as shown by `ps`
        name: String,
    },

    /// List running instances
    #[command(name = "ps")]
    Ps,

    /// Show daemon logs, or the log tail of one instance
    #[command(name = "logs")]
    Logs {
        /// Instance name; omit for the daemon log
        name: Option<String>,
    },

    /// List recipe presets and preview the active recipe
    #[command(name = "recipes")]
    Recipes,

    /// Show version information
    #[command(name = "version")]
    Version,
}

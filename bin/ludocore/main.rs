mod handlers;

use clap::{CommandFactory, Parser};
use ludocore::{
    cli::{LudocoreArgs, LudocoreSubcommand},
    LudocoreResult,
};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> LudocoreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = LudocoreArgs::parse();
    match args.subcommand {
        Some(LudocoreSubcommand::Serve {
            api_port,
            gui_port,
            match_port,
            public_ip,
            token_secret,
            foreground,
        }) => {
            handlers::serve_subcommand(
                api_port,
                gui_port,
                match_port,
                public_ip,
                token_secret,
                foreground,
            )
            .await?;
        }
        Some(LudocoreSubcommand::Shutdown) => {
            handlers::shutdown_subcommand().await?;
        }
        Some(LudocoreSubcommand::Start { port }) => {
            handlers::start_subcommand(port).await?;
        }
        Some(LudocoreSubcommand::Stop { name }) => {
            handlers::stop_subcommand(&name).await?;
        }
        Some(LudocoreSubcommand::Ps) => {
            handlers::ps_subcommand().await?;
        }
        Some(LudocoreSubcommand::Logs { name }) => {
            handlers::logs_subcommand(name.as_deref()).await?;
        }
        Some(LudocoreSubcommand::Recipes) => {
            handlers::recipes_subcommand().await?;
        }
        Some(LudocoreSubcommand::Version) => {
            println!("ludocore {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            if args.version {
                println!("ludocore {}", env!("CARGO_PKG_VERSION"));
            } else {
                LudocoreArgs::command().print_help()?;
            }
        }
    }

    Ok(())
}

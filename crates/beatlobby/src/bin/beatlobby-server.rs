use std::path::PathBuf;
use std::process::ExitCode;

use beatlobby::{LobbyServer, Settings, console, logging};
use clap::Parser;

/// Multiplayer music-game lobby server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Settings file, created with defaults if missing
    #[arg(short, long, default_value = "beatlobby.toml")]
    config: PathBuf,
    /// Player port, overriding the settings file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match Settings::load_or_create(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    logging::init(&settings.logging);
    if !logging::is_valid_level(&settings.logging.level)
        || !logging::is_valid_format(&settings.logging.format)
    {
        tracing::warn!(
            level = %settings.logging.level,
            format = %settings.logging.format,
            "unrecognised logging settings, using defaults"
        );
    }

    // Anything that escapes the error boundaries leaves state we no
    // longer trust: log it and exit.
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "unrecoverable error");
        std::process::exit(1);
    }));

    tracing::info!(
        name = %settings.server.name,
        address = %settings.server.address,
        port = settings.server.port,
        "starting lobby server"
    );

    let server = match LobbyServer::builder(settings)
        .settings_path(&cli.config)
        .build()
        .await
    {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = server.shutdown_token();
    tokio::spawn(console::run(server.admin(), shutdown.clone()));
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("ctrl-c received");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
        }
    });

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped with an error");
            ExitCode::FAILURE
        }
    }
}

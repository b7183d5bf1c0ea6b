//! MASW binary entry point
//!
//! Dispatches to daemon mode or subcommands based on CLI arguments.

use clap::Parser;
use color_eyre::eyre::Result;
use masw::{cli::Args, cli::Command, commands, daemon, logging};

/// Install color-eyre and make any panic fatal
///
/// A panic on an OS callback thread or in the event loop leaves the daemon half
/// working, so it is logged and the process aborts.
fn install_hooks() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install()?;

    let report = panic_hook.into_panic_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("fatal: {}", info);
        report(info);
        std::process::abort();
    }));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    install_hooks()?;

    let args = Args::parse();
    let config_path = commands::resolve_config_path(args.config)?;

    match args.command {
        // No subcommand - run the daemon with logs in the log file
        None => daemon::run(config_path, false).await,

        // Daemon handles its own logging initialization (file vs stderr)
        Some(Command::Run { foreground }) => daemon::run(config_path, foreground).await,

        Some(Command::Stop) => {
            logging::init_cli();
            commands::stop()
        }

        Some(Command::Status { json }) => {
            logging::init_cli();
            commands::status(&config_path, json)
        }

        Some(Command::ListMonitors { json }) => {
            logging::init_cli();
            commands::list_monitors(json)
        }

        Some(Command::ListDevices { json }) => {
            logging::init_cli();
            commands::list_devices(json)
        }

        Some(Command::Set { monitor, device }) => {
            logging::init_cli();
            commands::set(&config_path, &monitor, device.as_deref())
        }

        Some(Command::Enable) => {
            logging::init_cli();
            commands::set_enabled(&config_path, true)
        }

        Some(Command::Disable) => {
            logging::init_cli();
            commands::set_enabled(&config_path, false)
        }

        Some(Command::Toggle) => {
            logging::init_cli();
            commands::toggle(&config_path)
        }

        Some(Command::Switch { device }) => {
            logging::init_cli();
            commands::switch(&config_path, &device)
        }

        Some(Command::Validate) => {
            logging::init_cli();
            commands::validate(&config_path)
        }
    }
}

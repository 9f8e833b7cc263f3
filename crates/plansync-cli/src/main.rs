mod config;
mod plan_cmds;
#[cfg(test)]
mod test_util;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use plansync_core::{ConfigFile, FirmwareType, OfflineDefaults, SyncPolicy, VehicleType};

use config::PlansyncConfig;

#[derive(Parser)]
#[command(
    name = "plansync",
    version,
    about = "Flight plan file tool: inspect, convert and export mission plans"
)]
struct Cli {
    /// Config file path (overrides PLANSYNC_CONFIG env var)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a plansync config file
    Init {
        /// Firmware used for plans edited without a vehicle
        #[arg(long, default_value_t = FirmwareType::Px4)]
        firmware: FirmwareType,
        /// Vehicle type used for plans edited without a vehicle
        #[arg(long, default_value_t = VehicleType::MultiRotor)]
        vehicle_type: VehicleType,
        /// Refuse uploads while in monitor mode
        #[arg(long)]
        deny_monitor_upload: bool,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Summarize a plan, mission or waypoint file
    Show {
        /// File to read (.plan, .mission, .waypoints, .txt)
        file: PathBuf,
    },
    /// Convert any supported file to a .plan file
    Convert {
        /// File to read
        input: PathBuf,
        /// Output path (".plan" is appended when it has no extension)
        output: PathBuf,
    },
    /// Export the mission of a plan as KML
    Kml {
        /// File to read
        input: PathBuf,
        /// Output path (".kml" is appended when it has no extension)
        output: PathBuf,
    },
    /// Show the resolved configuration
    Config,
}

/// Execute the `plansync init` command: write config file.
fn cmd_init(cli_config: Option<&Path>, file: &ConfigFile, force: bool) -> anyhow::Result<()> {
    let path = config::resolve_config_path(cli_config);

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    file.save(&path)?;

    println!("Config written to {}", path.display());
    println!("  offline.firmware = {}", file.offline.firmware);
    println!("  offline.vehicle_type = {}", file.offline.vehicle_type);
    println!(
        "  policy.allow_monitor_upload = {}",
        file.policy.allow_monitor_upload
    );

    Ok(())
}

/// Execute the `plansync config` command: print resolved values.
fn cmd_config(resolved: &PlansyncConfig) {
    let origin = if resolved.file_found {
        ""
    } else {
        " (not found, using defaults)"
    };
    println!("Config file: {}{origin}", resolved.path.display());
    println!("  offline.firmware = {}", resolved.offline.firmware);
    println!("  offline.vehicle_type = {}", resolved.offline.vehicle_type);
    println!(
        "  policy.allow_monitor_upload = {}",
        resolved.policy.allow_monitor_upload
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cli_config = cli.config.as_deref();

    match cli.command {
        Commands::Init {
            firmware,
            vehicle_type,
            deny_monitor_upload,
            force,
        } => {
            let file = ConfigFile {
                offline: OfflineDefaults {
                    firmware,
                    vehicle_type,
                },
                policy: SyncPolicy {
                    allow_monitor_upload: !deny_monitor_upload,
                },
            };
            cmd_init(cli_config, &file, force)?;
        }
        Commands::Show { file } => {
            let resolved = PlansyncConfig::resolve(cli_config)?;
            plan_cmds::cmd_show(&resolved, &file)?;
        }
        Commands::Convert { input, output } => {
            let resolved = PlansyncConfig::resolve(cli_config)?;
            plan_cmds::cmd_convert(&resolved, &input, &output)?;
        }
        Commands::Kml { input, output } => {
            let resolved = PlansyncConfig::resolve(cli_config)?;
            plan_cmds::cmd_kml(&resolved, &input, &output)?;
        }
        Commands::Config => {
            let resolved = PlansyncConfig::resolve(cli_config)?;
            cmd_config(&resolved);
        }
    }

    Ok(())
}

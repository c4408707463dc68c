//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Control CLI for reading from and publishing to the VCM relay."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use vcm_api::{RelayClient, RelayStatus, StatusView};
use vcm_common::auth::{hash_password_rounds, DEFAULT_ITERATIONS};
use vcm_common::logging;
use vcm_common::VERSION;
use vcm_telemetry::ChargerStatus;

mod simulate;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "VCM relay control utility",
    long_about = None
)]
struct Cli {
    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,
    #[command(flatten)]
    relay: RelayArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Connection settings shared by every relay command.
#[derive(Debug, Args)]
struct RelayArgs {
    #[arg(long, env = "VCM_URL", default_value = "http://127.0.0.1:8000", global = true)]
    url: String,
    #[arg(long, env = "VCM_USER", default_value = "view", global = true)]
    user: String,
    #[arg(long, env = "VCM_PASSWORD", default_value = "", hide_env_values = true, global = true)]
    password: String,
}

impl RelayArgs {
    fn client(&self) -> Result<RelayClient> {
        RelayClient::new(&self.url, &self.user, &self.password)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the latest status held by the relay.
    Status {
        #[arg(long, help = "Print the raw JSON view")]
        json: bool,
    },
    /// Publish a status read from a JSON file ("-" for stdin).
    Push {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Publish simulated statuses on an interval.
    Simulate(simulate::SimulateOptions),
    /// Check relay liveness.
    Health,
    /// Print a salted PBKDF2 hash to store as a user's `password_hash`.
    HashPassword {
        password: String,
        #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
        iterations: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_cli();
    let cli = Cli::parse();
    if cli.version {
        println!("vcmctl {VERSION}");
        return Ok(());
    }
    match cli.command.unwrap_or(Commands::Status { json: false }) {
        Commands::Status { json } => {
            let status = cli.relay.client()?.fetch_status().await?;
            if json {
                println!("{}", status_json(&status)?);
            } else {
                print!("{}", render_status(&status));
            }
        }
        Commands::Push { file } => {
            let status = read_status(&file)?;
            cli.relay.client()?.publish(&status).await?;
            println!("Updated");
        }
        Commands::Simulate(options) => simulate::run(&cli.relay.client()?, options).await?,
        Commands::Health => {
            let health = cli.relay.client()?.health().await?;
            println!(
                "version {}, up {}s, status {}",
                health.version,
                health.uptime_seconds,
                if health.has_status { "stored" } else { "none" }
            );
        }
        Commands::HashPassword {
            password,
            iterations,
        } => println!("{}", hash_password_rounds(&password, iterations)?),
    }
    Ok(())
}

fn read_status(path: &Path) -> Result<ChargerStatus> {
    let raw = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read status from stdin")?;
        buffer
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("unable to read status file {}", path.display()))?
    };
    let status: ChargerStatus = serde_json::from_str(&raw).context("invalid status JSON")?;
    status.validate()?;
    Ok(status)
}

fn status_json(status: &RelayStatus) -> Result<String> {
    let value = match status {
        RelayStatus::Fresh(view) => serde_json::to_value(view)?,
        RelayStatus::Stale => serde_json::Value::Null,
        RelayStatus::Empty => serde_json::json!({ "status": "empty_db" }),
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

fn render_status(status: &RelayStatus) -> String {
    match status {
        RelayStatus::Fresh(view) => render_view(view),
        RelayStatus::Stale => "No recent status (last update is too old)\n".to_owned(),
        RelayStatus::Empty => "No status received yet\n".to_owned(),
    }
}

fn render_view(view: &StatusView) -> String {
    let status = &view.status;
    let mut out = String::new();
    for (kind, reading) in status.components() {
        out.push_str(&format!(
            "{:<11} {:>8.1} W {:>7.2} A {:>6.2} V\n",
            kind.as_str(),
            reading.power_w,
            reading.current_a,
            reading.voltage_v
        ));
    }
    out.push_str(&format!("battery     {:>6} %\n", status.battery_percentage));
    out.push_str(&format!("daily       {:>6} Ah\n", status.total_daily_charge_ah));
    let [bits1, bits2, bits3] = status.status_bits();
    out.push_str(&format!("status bits {bits1} {bits2} {bits3}\n"));
    out.push_str(&format!("received    {:.3}\n", view.timestamp));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcm_telemetry::{ComponentStatus, StatusBits};

    #[test]
    fn renders_each_lookup_state() {
        assert!(render_status(&RelayStatus::Empty).contains("No status"));
        assert!(render_status(&RelayStatus::Stale).contains("too old"));

        let view = StatusView {
            status: ChargerStatus {
                solar: ComponentStatus::new(150.0, 8.5, 17.6),
                battery_percentage: 88,
                status_bits2: StatusBits::new(0x0102),
                ..ChargerStatus::default()
            },
            timestamp: 1_700_000_000.25,
        };
        let text = render_status(&RelayStatus::Fresh(view));
        assert!(text.contains("solar"));
        assert!(text.contains("150.0 W"));
        assert!(text.contains("88 %"));
        assert!(text.contains("0x0000 0x0102 0x0000"));
    }

    #[test]
    fn json_output_mirrors_relay_bodies() {
        assert_eq!(status_json(&RelayStatus::Stale).unwrap(), "null");
        assert!(status_json(&RelayStatus::Empty).unwrap().contains("empty_db"));
    }

    #[test]
    fn cli_parses_global_relay_flags() {
        let cli = Cli::try_parse_from([
            "vcmctl",
            "status",
            "--json",
            "--url",
            "http://relay:8000",
            "--user",
            "battery_status",
        ])
        .unwrap();
        assert_eq!(cli.relay.url, "http://relay:8000");
        assert_eq!(cli.relay.user, "battery_status");
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));
    }

    #[test]
    fn hash_password_output_verifies_in_config() {
        let cli = Cli::try_parse_from(["vcmctl", "hash-password", "view", "--iterations", "1000"])
            .unwrap();
        let Some(Commands::HashPassword { password, iterations }) = cli.command else {
            panic!("expected hash-password");
        };
        assert_eq!(iterations, 1_000);
        let encoded = hash_password_rounds(&password, iterations).unwrap();
        assert!(encoded.starts_with("pbkdf2-sha256$1000$"));

        let toml = format!(
            "[auth.users.view]\npassword_hash = \"{encoded}\"\nroles = [\"viewer\"]\n"
        );
        let config: vcm_common::config::AppConfig = toml.parse().unwrap();
        let user = config.auth.user("view").unwrap();
        assert!(vcm_common::auth::verify_password("view", &user.password_hash));
        assert!(hash_password_rounds("view", 0).is_err());
    }
}

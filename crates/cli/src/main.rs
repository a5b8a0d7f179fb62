//! usb-auth CLI
//!
//! Host-side front end for the USB guard. Drives the same configuration,
//! whitelist and transfer backends the Android app uses through the native
//! bridge, which makes it handy for testing rules on a Linux gadget device.

mod devices;
mod prompt;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use common::{UsbDeviceDescriptor, parse_device_spec, setup_logging};
use guard::{AttachOutcome, AuthOutcome, GuardConfig, PendingAuth, UsbGuard};
use std::io::Write;
use std::time::Instant;
use tokio::io::BufReader;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "usb-auth")]
#[command(author, version, about = "Password-gated USB data transfer")]
#[command(long_about = "
Blocks USB data transfer for unknown devices until the unlock password is
entered. Remembered devices are kept in a whitelist.

EXAMPLES:
    # Show current state
    usb-auth status

    # Simulate plugging in a device and answer the challenge
    usb-auth attach 0x0781:0x5567:4C530001 --remember

    # Turn protection on
    usb-auth protection on

CONFIGURATION:
    The CLI looks for settings in the following order:
    1. Path specified with --config
    2. ~/.config/usb-auth/settings.toml
    3. /etc/usb-auth/settings.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Block USB data transfer
    Block,
    /// Allow USB data transfer
    Allow,
    /// Show protection, backend and whitelist state
    Status,
    /// List USB devices connected to this host
    ListDevices,
    /// Handle an attach event for VID:PID[:SERIAL]
    Attach {
        device: String,
        /// Remember the device after a successful unlock
        #[arg(long)]
        remember: bool,
        /// Manufacturer string shown in the prompt
        #[arg(long)]
        manufacturer: Option<String>,
        /// Product string shown in the prompt
        #[arg(long)]
        product: Option<String>,
    },
    /// Manage remembered devices
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },
    /// Turn protection on or off
    Protection { state: Toggle },
    /// Set the unlock password (read twice from stdin)
    SetPassword,
    /// Save default configuration to the default location and exit
    SaveConfig,
}

#[derive(Subcommand, Debug)]
enum WhitelistAction {
    List,
    Remove { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::SaveConfig = args.command {
        let config = GuardConfig::default();
        let path = GuardConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let (config, config_path) = match &args.config {
        Some(path) => {
            guard::config::load_config(path).context("Failed to load configuration")?
        }
        None => (GuardConfig::load_or_default(), GuardConfig::default_path()),
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.guard.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-auth v{}", env!("CARGO_PKG_VERSION"));

    let mut guard = UsbGuard::new(config, Some(config_path));

    match args.command {
        Command::Block => {
            if !guard.block() {
                bail!("Failed to block USB data transfer");
            }
            println!("USB data transfer blocked");
        }
        Command::Allow => {
            if !guard.allow() {
                bail!("Failed to allow USB data transfer");
            }
            println!("USB data transfer allowed");
        }
        Command::Status => print_status(&guard),
        Command::ListDevices => {
            for device in devices::list_devices()? {
                println!(
                    "{:<24} {:04x}:{:04x}  {}  id={}",
                    device.device_name,
                    device.vendor_id,
                    device.product_id,
                    device.display_name(),
                    device.device_id()
                );
            }
        }
        Command::Attach {
            device,
            remember,
            manufacturer,
            product,
        } => {
            let mut device = parse_device_spec(&device)?;
            device.manufacturer = manufacturer;
            device.product = product;
            attach(&mut guard, &device, remember).await?
        }
        Command::Whitelist { action } => match action {
            WhitelistAction::List => {
                let devices = guard.whitelisted_devices();
                if devices.is_empty() {
                    println!("No whitelisted devices");
                }
                for device in devices {
                    println!("{}  {}  (added {} ms)", device.id, device.name, device.added_timestamp);
                }
            }
            WhitelistAction::Remove { id } => {
                if guard.remove_from_whitelist(&id)? {
                    println!("Removed {}", id);
                } else {
                    bail!("{} is not whitelisted", id);
                }
            }
        },
        Command::Protection { state } => {
            guard.set_protection(matches!(state, Toggle::On))?;
            println!(
                "Protection {}",
                if guard.protection_enabled() { "enabled" } else { "disabled" }
            );
        }
        Command::SetPassword => {
            let password = read_stdin_line("New password: ")?;
            let confirm = read_stdin_line("Confirm password: ")?;
            guard.set_password(&password, &confirm)?;
            println!("Password saved");
        }
        Command::SaveConfig => unreachable!("handled before loading configuration"),
    }

    Ok(())
}

fn print_status(guard: &UsbGuard) {
    let controller = guard.controller();
    println!(
        "Protection: {}",
        if guard.protection_enabled() { "enabled" } else { "disabled" }
    );
    println!("Backend:    {}", controller.backend_name());
    match controller.query_state() {
        Ok(Some(state)) => println!("Transfer:   {:?}", state),
        Ok(None) => println!("Transfer:   unknown"),
        Err(e) => println!("Transfer:   unreadable ({})", e),
    }
    println!("Whitelist:  {} device(s)", guard.whitelisted_devices().len());
    println!(
        "Password:   {}",
        if guard.config().auth.has_password() { "set" } else { "not set" }
    );
}

/// Run attach handling and, if needed, the interactive challenge
async fn attach(guard: &mut UsbGuard, device: &UsbDeviceDescriptor, remember: bool) -> Result<()> {
    let mut pending = match guard.on_device_attached(device) {
        AttachOutcome::Ignored => {
            println!("Protection disabled, device left alone");
            return Ok(());
        }
        AttachOutcome::Allowed { transfer_ok } => {
            println!("Device is whitelisted, access allowed");
            if !transfer_ok {
                bail!("Failed to allow USB data transfer");
            }
            return Ok(());
        }
        AttachOutcome::ChallengeRequired(pending) => pending,
    };

    println!("Device: {}", pending.device_name());
    let mut stdin = BufReader::new(tokio::io::stdin());

    loop {
        let now = Instant::now();
        let remaining = pending.remaining(now);
        let urgency = if pending.is_urgent(now) { " (hurry!)" } else { "" };
        print!("Password ({}s left{}): ", remaining.as_secs(), urgency);
        std::io::stdout().flush()?;

        let Some(entered) = prompt::read_line_within(&mut stdin, remaining).await? else {
            // Timed out or stdin closed
            if !abandon_challenge(guard, &mut pending, Instant::now())? {
                eprintln!("Warning: failed to block USB data transfer");
            }
            println!();
            bail!("Access denied");
        };

        match guard.complete_challenge(&mut pending, &entered, remember)? {
            AuthOutcome::Granted => {
                if remember {
                    println!("Device added to whitelist");
                }
                println!("Access granted");
                return Ok(());
            }
            AuthOutcome::WrongPassword => println!("Wrong password"),
            AuthOutcome::Expired => bail!("Time is up, access denied"),
        }
    }
}

/// Close a challenge that got no answer
///
/// Returns `false` when transfer could not be blocked afterwards.
fn abandon_challenge(guard: &mut UsbGuard, pending: &mut PendingAuth, now: Instant) -> Result<bool> {
    if pending.is_expired(now) {
        let failures = guard.controller().stats().failures;
        guard.complete_challenge_at(pending, "", false, now)?;
        Ok(guard.controller().stats().failures == failures)
    } else {
        Ok(guard.cancel_challenge(pending))
    }
}

fn read_stdin_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard::control::SysfsControl;
    use guard::{TransferController, TransferState};
    use std::sync::Arc;
    use std::time::Duration;

    fn guard_with(controller: TransferController) -> UsbGuard {
        let mut config = GuardConfig::default();
        config.guard.protection_enabled = true;
        config.auth.password = "secret".to_string();
        config.storage.whitelist_path = std::env::temp_dir().join("usb-auth-cli-test-unused.json");
        UsbGuard::with_controller(config, None, Arc::new(controller))
    }

    fn unreachable_sysfs() -> TransferController {
        TransferController::new(Box::new(SysfsControl::new(
            "/nonexistent/usb-auth/android0/enable",
        )))
    }

    fn challenge(guard: &UsbGuard, now: Instant) -> PendingAuth {
        match guard.on_device_attached_at(&UsbDeviceDescriptor::new(1, 2), now) {
            AttachOutcome::ChallengeRequired(pending) => pending,
            other => panic!("expected challenge, got {:?}", other),
        }
    }

    #[test]
    fn test_abandon_blocks_transfer() {
        let mut guard = guard_with(TransferController::simulated());
        let now = Instant::now();
        let mut pending = challenge(&guard, now);
        guard.allow();

        assert!(abandon_challenge(&mut guard, &mut pending, now).unwrap());
        assert_eq!(guard.controller().last_state(), Some(TransferState::Blocked));
    }

    #[test]
    fn test_abandon_reports_failed_block() {
        let mut guard = guard_with(unreachable_sysfs());
        let now = Instant::now();

        let mut pending = challenge(&guard, now);
        assert!(!abandon_challenge(&mut guard, &mut pending, now).unwrap());

        let mut pending = challenge(&guard, now);
        let late = now + Duration::from_secs(31);
        assert!(!abandon_challenge(&mut guard, &mut pending, late).unwrap());
    }
}

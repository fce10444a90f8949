mod cmd;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use xvf_dfu::suffix::WILDCARD_ID;
use xvf_dfu::{CommandTransport, DeviceId, ImageError, UsbTransport};

#[derive(clap::Parser)]
#[clap(
    name = "xvf-dfu",
    about = "Firmware upgrade utility for XVF-series audio DSP devices",
    version
)]
struct Cli {
    #[clap(flatten)]
    common: CommonOptions,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Write a firmware upgrade, data image first, and reboot into it
    WriteUpgrade(cmd::write_upgrade::Cmd),
    /// Send a replacement flash SPI specification to the device
    OverrideSpispec(cmd::override_spispec::Cmd),
    /// Switch the device from application mode into DFU mode
    DetachAndBusReset(cmd::detach_and_bus_reset::Cmd),
    /// Reboot the device
    Reboot(cmd::reboot::Cmd),
}

/// Transport used to reach the device control interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum TransportKind {
    Usb,
    I2c,
}

#[derive(Debug, clap::Args)]
struct CommonOptions {
    /// Expected USB vendor ID
    #[clap(
        long,
        global = true,
        value_parser = parse_u16,
        default_value = "0x20B1",
        help_heading = "DEVICE SELECTION"
    )]
    vendor_id: u16,

    /// Expected USB product ID
    #[clap(
        long,
        global = true,
        value_parser = parse_u16,
        default_value = "0x0014",
        help_heading = "DEVICE SELECTION"
    )]
    product_id: u16,

    /// Expected bcdDevice; 0xFFFF skips the check
    #[clap(
        long,
        global = true,
        value_parser = parse_u16,
        default_value = "0xFFFF",
        help_heading = "DEVICE SELECTION"
    )]
    bcd_device: u16,

    /// Transport to the device control interface
    #[clap(
        long,
        global = true,
        value_enum,
        default_value_t = TransportKind::Usb,
        help_heading = "DEVICE SELECTION"
    )]
    transport: TransportKind,

    /// I2C slave address of the control interface
    #[clap(
        long,
        global = true,
        value_parser = parse_u8,
        default_value = "0x2C",
        help_heading = "DEVICE SELECTION"
    )]
    i2c_address: u8,

    /// I2C bus device
    #[clap(
        long,
        global = true,
        default_value = "/dev/i2c-1",
        help_heading = "DEVICE SELECTION"
    )]
    i2c_bus: PathBuf,

    /// Only report warnings and errors
    #[clap(long, short, global = true)]
    quiet: bool,
}

impl CommonOptions {
    fn validate(&self) -> Result<()> {
        if self.vendor_id == WILDCARD_ID || self.product_id == WILDCARD_ID {
            bail!(
                "vendor/product ID 0xFFFF is the ignore value for DFU suffix verification; \
                 this is not safe and the utility will not proceed"
            );
        }
        Ok(())
    }

    fn device_id(&self) -> DeviceId {
        DeviceId {
            vendor: self.vendor_id,
            product: self.product_id,
            bcddevice: self.bcd_device,
            transport_address: self.i2c_address,
        }
    }

    /// Connect to the device over the selected transport.
    fn open(&self) -> Result<Box<dyn CommandTransport>> {
        match self.transport {
            TransportKind::Usb => Ok(Box::new(UsbTransport::open(&self.device_id())?)),
            #[cfg(target_os = "linux")]
            TransportKind::I2c => Ok(Box::new(xvf_dfu::I2cTransport::open(
                &self.i2c_bus,
                &self.device_id(),
            )?)),
            #[cfg(not(target_os = "linux"))]
            TransportKind::I2c => bail!("the I2C transport is only available on Linux"),
        }
    }
}

fn parse_u16(input: &str) -> Result<u16, String> {
    parse_int::parse::<u16>(input).map_err(|e| e.to_string())
}

fn parse_u8(input: &str) -> Result<u8, String> {
    parse_int::parse::<u8>(input).map_err(|e| e.to_string())
}

fn setup_logging(quiet: bool) {
    let default_filter = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_env("XVF_DFU_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

impl Cli {
    fn run(self) -> Result<()> {
        self.common.validate()?;

        match self.subcommand {
            Subcommand::WriteUpgrade(cmd) => cmd.run(&self.common),
            Subcommand::OverrideSpispec(cmd) => cmd.run(&self.common),
            Subcommand::DetachAndBusReset(cmd) => cmd.run(&self.common),
            Subcommand::Reboot(cmd) => cmd.run(&self.common),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.common.quiet);

    if let Err(error) = cli.run() {
        eprintln!("{} {error:?}", "error:".red());

        // suffix verification failures keep their stable exit codes
        let code = error
            .downcast_ref::<ImageError>()
            .map(ImageError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

//! # Host-side DFU engine for XVF-series audio DSP devices
//!
//! This crate drives a firmware upgrade of an XMOS XVF-class device over
//! USB or I2C using a DFU-style protocol carried on the device control
//! channel. It covers the whole host side of an upgrade:
//!
//! - the CRC32 primitive and the DFU file suffix codec, which
//!   authenticate an upgrade image before any wire traffic happens,
//! - the device interface state machine the protocol must respect,
//! - the block-transfer orchestrator that takes a device from application
//!   mode through DETACH, chunked DNLOAD and manifestation back to idle.
//!
//! ## Example
//!
//! ```no_run
//! use xvf_dfu::{DeviceId, Dfu, UpgradeImage, UsbTransport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let id = DeviceId::default();
//!
//! // Suffix verification happens at load time; a bad image never
//! // reaches the device.
//! let boot = UpgradeImage::load("boot.dfu", &id)?;
//! let data = UpgradeImage::load("data.dfu", &id)?;
//!
//! let transport = UsbTransport::open(&id)?;
//! let mut dfu = Dfu::new(transport);
//! dfu.write_upgrade(
//!     Some(boot.payload()),
//!     Some(data.payload()),
//!     128,
//!     false,
//!     false,
//! )?;
//! dfu.reboot()?;
//! # Ok(())
//! # }
//! ```

pub mod crc;
mod device;
#[warn(missing_docs)]
pub mod image;
#[warn(missing_docs)]
pub mod protocol;
#[warn(missing_docs)]
pub mod suffix;
#[warn(missing_docs)]
pub mod transfer;
pub mod transport;

pub use crate::device::DeviceId;
pub use crate::image::{ImageError, UpgradeImage};
pub use crate::protocol::{
    DfuCommand, DfuState, DfuStatus, GetStatus, ProtocolError, DATA_IMAGE_MARKER,
};
pub use crate::suffix::{DfuSuffix, SuffixError};
pub use crate::transfer::{Dfu, TransferError};
pub use crate::transport::{CommandTransport, TransportError, UsbTransport};

#[cfg(target_os = "linux")]
pub use crate::transport::I2cTransport;

// Exports only used in tests
#[cfg(any(test, feature = "test"))]
pub use crate::transport::mock::{MockTransport, Operation};

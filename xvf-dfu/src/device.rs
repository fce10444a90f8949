/// Identity of the device an upgrade is intended for.
///
/// The vendor/product/bcdDevice triple doubles as the expected identity
/// for DFU suffix verification and as the USB device selector. A field
/// set to `0xFFFF` is the suffix wildcard: that side of the identity
/// comparison is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    /// USB vendor ID.
    pub vendor: u16,
    /// USB product ID.
    pub product: u16,
    /// Device release number in binary-coded decimal.
    pub bcddevice: u16,
    /// Bus address for addressed transports (the I2C slave address).
    /// Ignored by the USB transport.
    pub transport_address: u8,
}

impl DeviceId {
    /// XMOS vendor ID.
    pub const DEFAULT_VENDOR: u16 = 0x20B1;
    /// XVF3510 product ID.
    pub const DEFAULT_PRODUCT: u16 = 0x0014;
    /// Skip the bcdDevice check by default; a release is usually
    /// expected to upgrade across firmware versions.
    pub const DEFAULT_BCDDEVICE: u16 = 0xFFFF;
    /// Default I2C slave address of the device control interface.
    pub const DEFAULT_TRANSPORT_ADDRESS: u8 = 0x2C;
}

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId {
            vendor: Self::DEFAULT_VENDOR,
            product: Self::DEFAULT_PRODUCT,
            bcddevice: Self::DEFAULT_BCDDEVICE,
            transport_address: Self::DEFAULT_TRANSPORT_ADDRESS,
        }
    }
}

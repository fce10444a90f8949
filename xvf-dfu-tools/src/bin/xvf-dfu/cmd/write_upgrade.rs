use std::path::PathBuf;

use anyhow::Result;
use xvf_dfu::{Dfu, UpgradeImage};

use crate::CommonOptions;

#[derive(clap::Parser)]
pub struct Cmd {
    /// Boot image with DFU suffix
    boot: PathBuf,

    /// Data image with DFU suffix
    data: PathBuf,

    /// DNLOAD payload bytes per block (at most 512)
    #[clap(long, default_value_t = 128)]
    block_size: usize,

    /// Leave the boot image untouched
    #[clap(long)]
    skip_boot_image: bool,

    /// Leave the data image untouched
    #[clap(long)]
    skip_data_image: bool,
}

impl Cmd {
    pub fn run(self, common: &CommonOptions) -> Result<()> {
        let id = common.device_id();

        // both inputs are authenticated before the device is touched
        let boot = UpgradeImage::load(&self.boot, &id)?;
        let data = UpgradeImage::load(&self.data, &id)?;

        let mut dfu = Dfu::new(common.open()?);
        dfu.write_upgrade(
            Some(boot.payload()),
            Some(data.payload()),
            self.block_size,
            self.skip_boot_image,
            self.skip_data_image,
        )?;

        // boot into the new firmware
        dfu.reboot()?;

        Ok(())
    }
}

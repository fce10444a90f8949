use std::path::PathBuf;

use anyhow::Result;
use xvf_dfu::{Dfu, UpgradeImage};

use crate::CommonOptions;

#[derive(clap::Parser)]
pub struct Cmd {
    /// Flash SPI specification blob with DFU suffix
    spispec: PathBuf,
}

impl Cmd {
    pub fn run(self, common: &CommonOptions) -> Result<()> {
        let spispec = UpgradeImage::load(&self.spispec, &common.device_id())?;

        let mut dfu = Dfu::new(common.open()?);
        dfu.override_spispec(spispec.payload())?;

        tracing::info!("override spispec successful");
        Ok(())
    }
}

use anyhow::Result;
use xvf_dfu::Dfu;

use crate::CommonOptions;

#[derive(clap::Parser)]
pub struct Cmd {}

impl Cmd {
    pub fn run(self, common: &CommonOptions) -> Result<()> {
        let mut dfu = Dfu::new(common.open()?);
        dfu.detach_and_bus_reset()?;
        Ok(())
    }
}

pub mod detach_and_bus_reset;
pub mod override_spispec;
pub mod reboot;
pub mod write_upgrade;

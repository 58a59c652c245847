//! ptm:u HLE - Power and pedometer

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::module::ModuleState;

/// Battery level as reported by the PTM service (0-5)
pub const BATTERY_LEVEL_MAX: u8 = 5;

/// ptm:u service state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtmU {
    battery_level: u8,
    adapter_connected: bool,
    charging: bool,
    shell_open: bool,
    step_count: u32,
    pedometer_counting: bool,
    shutdown_requested: bool,
}

impl Default for PtmU {
    fn default() -> Self {
        Self {
            battery_level: BATTERY_LEVEL_MAX,
            adapter_connected: true,
            charging: true,
            shell_open: true,
            step_count: 0,
            pedometer_counting: false,
            shutdown_requested: false,
        }
    }
}

impl ModuleState for PtmU {
    const KEY: &'static str = "ptm:u";
}

impl PtmU {
    pub fn battery_level(&self) -> u8 {
        self.battery_level
    }

    pub fn set_battery_level(&mut self, level: u8) {
        self.battery_level = level.min(BATTERY_LEVEL_MAX);
    }

    pub fn adapter_connected(&self) -> bool {
        self.adapter_connected
    }

    /// Unplugging the adapter also stops charging
    pub fn set_adapter_connected(&mut self, connected: bool) {
        self.adapter_connected = connected;
        self.charging = connected && self.battery_level < BATTERY_LEVEL_MAX;
    }

    pub fn charging(&self) -> bool {
        self.charging
    }

    pub fn shell_open(&self) -> bool {
        self.shell_open
    }

    pub fn set_shell_open(&mut self, open: bool) {
        self.shell_open = open;
    }

    pub fn set_pedometer_counting(&mut self, counting: bool) {
        self.pedometer_counting = counting;
    }

    pub fn add_steps(&mut self, steps: u32) {
        self.step_count = self.step_count.saturating_add(steps);
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    /// The guest asked to power off
    pub fn request_shutdown(&mut self) {
        info!("ptm:u: shutdown requested by guest");
        self.shutdown_requested = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ptm = PtmU::default();
        assert_eq!(ptm.battery_level(), BATTERY_LEVEL_MAX);
        assert!(ptm.adapter_connected());
        assert!(ptm.shell_open());
        assert!(!ptm.shutdown_requested());
    }

    #[test]
    fn test_steps_saturate() {
        let mut ptm = PtmU::default();
        ptm.add_steps(u32::MAX - 1);
        ptm.add_steps(10);
        assert_eq!(ptm.step_count(), u32::MAX);
    }

    #[test]
    fn test_adapter_controls_charging() {
        let mut ptm = PtmU::default();
        ptm.set_battery_level(3);
        ptm.set_adapter_connected(false);
        assert!(!ptm.charging());
        ptm.set_adapter_connected(true);
        assert!(ptm.charging());
        ptm.set_battery_level(9);
        assert_eq!(ptm.battery_level(), BATTERY_LEVEL_MAX);
    }

    #[test]
    fn test_shutdown_request() {
        let mut ptm = PtmU::default();
        ptm.request_shutdown();
        assert!(ptm.shutdown_requested());
    }
}

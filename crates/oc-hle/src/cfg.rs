//! cfg:u HLE - System configuration
//!
//! Console settings the emulated OS reads through the config service.

use serde::{Deserialize, Serialize};

use crate::module::ModuleState;

/// Console region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SystemRegion {
    Japan,
    #[default]
    Usa,
    Europe,
    Australia,
    China,
    Korea,
    Taiwan,
}

/// System language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SystemLanguage {
    Japanese,
    #[default]
    English,
    French,
    German,
    Italian,
    Spanish,
    Chinese,
    Korean,
    Dutch,
    Portuguese,
    Russian,
    Taiwanese,
}

/// Audio output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SoundOutputMode {
    Mono,
    #[default]
    Stereo,
    Surround,
}

/// cfg:u service state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfgU {
    pub region: SystemRegion,
    pub language: SystemLanguage,
    pub sound_output: SoundOutputMode,
    pub username: String,
    /// (month, day)
    pub birthday: (u8, u8),
    pub country_code: u8,
    pub console_id: u64,
}

impl Default for CfgU {
    fn default() -> Self {
        Self {
            region: SystemRegion::default(),
            language: SystemLanguage::default(),
            sound_output: SoundOutputMode::default(),
            username: "OXIDIZED".to_string(),
            birthday: (3, 25),
            country_code: 49,
            console_id: 0,
        }
    }
}

impl ModuleState for CfgU {
    const KEY: &'static str = "cfg:u";
}

/// Maximum username length in UTF-16 code units
pub const USERNAME_MAX_LEN: usize = 10;

impl CfgU {
    /// Set the username, truncated to the console limit
    pub fn set_username(&mut self, name: &str) {
        self.username = name.chars().take(USERNAME_MAX_LEN).collect();
    }

    /// Set the birthday. Rejects impossible dates.
    pub fn set_birthday(&mut self, month: u8, day: u8) -> bool {
        let max_day = match month {
            2 => 29,
            4 | 6 | 9 | 11 => 30,
            1..=12 => 31,
            _ => return false,
        };
        if day == 0 || day > max_day {
            return false;
        }
        self.birthday = (month, day);
        true
    }

    /// Derive a console id from a random seed, as done on first boot
    pub fn generate_console_id(&mut self, random: u32) -> u64 {
        self.console_id = ((random as u64) << 32) | 0x0000_0001;
        self.console_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_truncated() {
        let mut cfg = CfgU::default();
        cfg.set_username("AVeryLongUsername");
        assert_eq!(cfg.username, "AVeryLongU");
    }

    #[test]
    fn test_birthday_validation() {
        let mut cfg = CfgU::default();
        assert!(cfg.set_birthday(2, 29));
        assert!(!cfg.set_birthday(2, 30));
        assert!(!cfg.set_birthday(13, 1));
        assert!(!cfg.set_birthday(4, 0));
        assert_eq!(cfg.birthday, (2, 29));
    }

    #[test]
    fn test_console_id() {
        let mut cfg = CfgU::default();
        assert_eq!(cfg.generate_console_id(0xDEAD_BEEF), 0xDEAD_BEEF_0000_0001);
    }
}

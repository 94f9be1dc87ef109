use crate::tsl4531::{self, IntegrationTime, Mode};

use embedded_hal::i2c::SevenBitAddress;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Which I2C address the sensor answers on.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum SensorAddress {
    /// 0x29: TSL45315 & TSL45311
    #[default]
    Primary,
    /// 0x39: TSL45317 & TSL45313
    Alternate,
    Custom(u8),
}

impl SensorAddress {
    pub fn to_i2c(self) -> SevenBitAddress {
        match self {
            SensorAddress::Primary => tsl4531::PRIMARY_ADDR,
            SensorAddress::Alternate => tsl4531::ALTERNATE_ADDR,
            SensorAddress::Custom(addr) => addr,
        }
    }
}

/// USB IDs of the FTDI bridge the sensor hangs off of.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    pub vid: u16,
    pub pid: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        // FT232H
        BridgeConfig {
            vid: 0x0403,
            pid: 0x6014,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub address: SensorAddress,
    /// 100, 200 or 400. Anything else is treated as 400.
    pub integration_time_ms: u32,
    pub mode: Mode,
    pub power_save_skip: bool,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bridge: BridgeConfig::default(),
            address: SensorAddress::Primary,
            integration_time_ms: 100,
            mode: Mode::Normal,
            power_save_skip: true,
            poll_interval_ms: 1_000,
        }
    }
}

impl Config {
    pub fn from_str(conf: &str) -> Result<Self, anyhow::Error> {
        Ok(ron::from_str::<Config>(conf)?)
    }

    pub fn read_from_file<P: AsRef<Path>>(file: P) -> Result<Self, anyhow::Error> {
        Ok(ron::de::from_reader(BufReader::new(File::open(file)?))?)
    }

    pub fn integration_time(&self) -> IntegrationTime {
        IntegrationTime::from_millis(self.integration_time_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    const TEST_CONFIG: &str = r#"
        (
            bridge: (vid: 0x0403, pid: 0x6010),
            address: Custom(0x2a),
            integration_time_ms: 200,
            mode: OneShot,
            power_save_skip: false,
            poll_interval_ms: 250,
        )
    "#;

    #[test]
    fn test_deserialize_config() {
        let parsed: Config = ron::from_str(TEST_CONFIG).unwrap();

        assert_eq!(
            parsed,
            Config {
                bridge: BridgeConfig {
                    vid: 0x0403,
                    pid: 0x6010
                },
                address: SensorAddress::Custom(0x2a),
                integration_time_ms: 200,
                mode: Mode::OneShot,
                power_save_skip: false,
                poll_interval_ms: 250,
            }
        );
        assert_eq!(IntegrationTime::Ms200, parsed.integration_time());
        assert_eq!(0x2a, parsed.address.to_i2c());
    }

    #[test]
    fn test_partial_config() {
        let parsed = Config::from_str("(address: Alternate, bridge: (pid: 0x6011))").unwrap();

        assert_eq!(SensorAddress::Alternate, parsed.address);
        assert_eq!(0x39, parsed.address.to_i2c());
        assert_eq!(0x0403, parsed.bridge.vid);
        assert_eq!(0x6011, parsed.bridge.pid);
        assert_eq!(Mode::Normal, parsed.mode);
        assert_eq!(IntegrationTime::Ms100, parsed.integration_time());
        assert!(parsed.power_save_skip);
    }

    #[test]
    fn test_empty_config() {
        assert_eq!(Config::default(), Config::from_str("()").unwrap());
    }

    #[test]
    fn test_unknown_integration_time() {
        let parsed = Config::from_str("(integration_time_ms: 300)").unwrap();
        assert_eq!(IntegrationTime::Ms400, parsed.integration_time());
    }

    #[test]
    fn test_bad_mode() {
        assert!(Config::from_str("(mode: Sleep)").is_err());
    }
}

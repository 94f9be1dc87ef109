/// Represents a TSL4531x sensor (TSL45311/3/5/7) and provides methods to configure & read from it over I2C.
use embedded_hal::i2c::{I2c, SevenBitAddress};
use tracing::{debug, warn};

/// Address of the TSL45315 and TSL45311.
pub const PRIMARY_ADDR: SevenBitAddress = 0x29;
/// Address of the TSL45317 and TSL45313.
pub const ALTERNATE_ADDR: SevenBitAddress = 0x39;

/// Register addresses, with the command bit (0x80) already set.
#[allow(unused)]
pub mod register {
    pub const CONTROL: u8 = 0x80;
    pub const CONFIG: u8 = 0x81;
    pub const DATA_LO: u8 = 0x84;
    pub const DATA_HI: u8 = 0x85;
    pub const ID: u8 = 0x8A;
}

mod control {
    pub const MODE_OFF: u8 = 0x00;
    pub const MODE_ONESHOT: u8 = 0x02;
    pub const MODE_NORMAL: u8 = 0x03;
}

mod config {
    pub const PSAVESKIP: u8 = 0x08;
    pub const TCNTRL_400MS: u8 = 0x00;
    pub const TCNTRL_200MS: u8 = 0x01;
    pub const TCNTRL_100MS: u8 = 0x02;
}

/// Only the upper nibble of the ID register identifies the part.
const ID_MASK: u8 = 0xF0;

#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    /// The ID register did not hold a known TSL4531 part: wrong device, or nothing at this address.
    #[error("no TSL4531 at this address (device ID {id:#04x})")]
    DeviceNotRecognized { id: u8 },

    #[error("I2C transfer failed: {0:?}")]
    Transport(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    TSL45317,
    TSL45313,
    TSL45315,
    TSL45311,
}

impl Part {
    /// Look up the part from the masked device ID.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x80 => Some(Part::TSL45317),
            0x90 => Some(Part::TSL45313),
            0xA0 => Some(Part::TSL45315),
            0xB0 => Some(Part::TSL45311),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationTime {
    Ms400,
    Ms200,
    Ms100,
}

impl IntegrationTime {
    /// Integration time for a duration in milliseconds.
    ///
    /// Anything other than 100, 200 or 400 falls back to 400ms, same as the
    /// device does for the reserved timing code.
    pub fn from_millis(ms: u32) -> Self {
        match ms {
            200 => IntegrationTime::Ms200,
            100 => IntegrationTime::Ms100,
            _ => IntegrationTime::Ms400,
        }
    }

    pub fn as_millis(self) -> u32 {
        match self {
            IntegrationTime::Ms400 => 400,
            IntegrationTime::Ms200 => 200,
            IntegrationTime::Ms100 => 100,
        }
    }

    fn timing_code(self) -> u8 {
        match self {
            IntegrationTime::Ms400 => config::TCNTRL_400MS,
            IntegrationTime::Ms200 => config::TCNTRL_200MS,
            IntegrationTime::Ms100 => config::TCNTRL_100MS,
        }
    }

    /// Shorter windows collect proportionally less light, so scale up to the 400ms equivalent.
    fn lux_multiplier(self) -> f32 {
        match self {
            IntegrationTime::Ms400 => 1.0,
            IntegrationTime::Ms200 => 2.0,
            IntegrationTime::Ms100 => 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum Mode {
    Off,
    OneShot,
    Normal,
}

impl Mode {
    fn control_code(self) -> u8 {
        match self {
            Mode::Off => control::MODE_OFF,
            Mode::OneShot => control::MODE_ONESHOT,
            Mode::Normal => control::MODE_NORMAL,
        }
    }
}

pub struct TSL4531<I: I2c> {
    i2c: I,
    address: SevenBitAddress,

    // config values, always what was last written to the device:
    /// integration time: defaults to 100ms
    integration_time: IntegrationTime,
    /// operating mode: defaults to normal (continuous conversion)
    mode: Mode,
    /// skip the power save state between conversions: defaults to on
    power_save_skip: bool,
}

impl<I: I2c> TSL4531<I> {
    /// Create a driver for the sensor at `address`, or at [`PRIMARY_ADDR`] if `None`.
    ///
    /// Nothing is sent on the bus until [`TSL4531::initialize`] is called.
    pub fn new(i2c: I, address: impl Into<Option<SevenBitAddress>>) -> Self {
        TSL4531 {
            i2c,
            address: address.into().unwrap_or(PRIMARY_ADDR),
            integration_time: IntegrationTime::Ms100,
            mode: Mode::Normal,
            power_save_skip: true,
        }
    }

    /// Give back the I2C bus.
    pub fn release(self) -> I {
        self.i2c
    }

    // Register access

    fn write8(&mut self, register: u8, value: u8) -> Result<(), Error<I::Error>> {
        debug!(address = self.address, "write register {register:#04x} = {value:#04x}");
        self.i2c
            .write(self.address, &[register, value])
            .map_err(Error::Transport)
    }

    fn read8(&mut self, register: u8) -> Result<u8, Error<I::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(Error::Transport)?;
        debug!(address = self.address, "read register {register:#04x} = {:#04x}", buf[0]);
        Ok(buf[0])
    }

    // Device control

    /// Check the device is a TSL4531 and write the current mode & integration time to it.
    ///
    /// Safe to call again: the ID is re-checked and the configuration re-applied.
    pub fn initialize(&mut self) -> Result<Part, Error<I::Error>> {
        let id = self.device_id()?;
        let Some(part) = Part::from_id(id) else {
            warn!(address = self.address, "unrecognized device ID {id:#04x}");
            return Err(Error::DeviceNotRecognized { id });
        };

        self.set_mode(self.mode)?;
        self.set_integration_time(self.integration_time)?;

        Ok(part)
    }

    pub fn set_integration_time(&mut self, time: IntegrationTime) -> Result<(), Error<I::Error>> {
        self.write_config(time, self.power_save_skip)?;
        self.integration_time = time;
        Ok(())
    }

    /// Enable or disable skipping the power save state between conversions.
    ///
    /// Rewrites the config register, so it does nothing when the value is unchanged.
    pub fn set_power_save_skip(&mut self, enabled: bool) -> Result<(), Error<I::Error>> {
        if self.power_save_skip != enabled {
            self.write_config(self.integration_time, enabled)?;
            self.power_save_skip = enabled;
        }
        Ok(())
    }

    fn write_config(
        &mut self,
        time: IntegrationTime,
        power_save_skip: bool,
    ) -> Result<(), Error<I::Error>> {
        let psave = if power_save_skip { config::PSAVESKIP } else { 0 };
        self.write8(register::CONFIG, psave | time.timing_code())
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error<I::Error>> {
        self.write8(register::CONTROL, mode.control_code())?;
        self.mode = mode;
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn integration_time(&self) -> IntegrationTime {
        self.integration_time
    }

    pub fn power_save_skip(&self) -> bool {
        self.power_save_skip
    }

    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    /// Read the raw 16-bit count from the data registers.
    pub fn raw_reading(&mut self) -> Result<u16, Error<I::Error>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register::DATA_LO], &mut buf)
            .map_err(Error::Transport)?;
        let raw: u16 = (buf[1] as u16) << 8 | (buf[0] as u16);
        debug!(address = self.address, raw, "read data registers");

        Ok(raw)
    }

    /// Convert a raw count to lux for the current integration time.
    pub fn calculate_lux(&self, raw: u16) -> f32 {
        raw as f32 * self.integration_time.lux_multiplier()
    }

    /// Read current illuminance from the sensor, scaled for the integration time.
    pub fn lux(&mut self) -> Result<f32, Error<I::Error>> {
        let raw = self.raw_reading()?;
        Ok(self.calculate_lux(raw))
    }

    /// Read the device ID, with the revision bits masked off.
    pub fn device_id(&mut self) -> Result<u8, Error<I::Error>> {
        Ok(self.read8(register::ID)? & ID_MASK)
    }
}

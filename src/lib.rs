#![no_std]
//! Platform-agnostic driver for the Microchip MCP79410 battery backed real-time clock.
//!
//! The MCP79410 combines an RTC with two alarms, 64 bytes of battery backed
//! SRAM and 128 bytes of EEPROM (plus an 8 byte protected block) behind two
//! I2C addresses. This crate talks to it through the `embedded-hal` 1.0
//! [`I2c`] trait.
//!
//! # Features
//!
//! - RTC time get/set as Unix seconds, chrono `DateTime<Utc>` or [`RawTime`]
//! - Synchronization policy between the RTC and a host clock ([`TimeSource`])
//! - Two alarms with polarity, match mode and interrupt flag handling
//! - Square wave output, digital oscillator trim, battery switchover
//! - Power fail time stamps
//! - SRAM and EEPROM access with typed get/put ([`Memory`])
//! - Optional async support (`async` feature)
//! - Optional logging through `log` or `defmt`
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp79410::{AlarmSlot, Mcp79410, Memory, Polarity};
//!
//! let mut rtc = Mcp79410::new(i2c);
//! rtc.setup(&mut host_clock)?;
//!
//! // in the application main loop
//! rtc.periodic_tick(&host_clock)?;
//!
//! // wake up in 10 minutes
//! rtc.set_alarm_in(600, Polarity::ActiveHigh, AlarmSlot::Zero)?;
//!
//! rtc.sram().put(0, &42u32)?;
//! ```

use chrono::{DateTime, Utc};
use embedded_hal::i2c::I2c;
use paste::paste;

pub(crate) mod fmt;

pub mod alarm;
#[cfg(feature = "async")]
pub mod asynch;
pub mod datetime;
pub mod memory;
pub mod registers;
pub mod transport;

pub use alarm::{AlarmError, AlarmMode, AlarmSlot};
use alarm::{AlarmRegisters, ALARM_REGISTER_COUNT};
pub use datetime::{bcd_to_int, int_to_bcd, DateTimeError, RawTime};
use datetime::TIME_REGISTER_COUNT;
use fmt::{debug, info};
pub use memory::{Eeprom, Memory, MemoryValue, Sram};
pub use registers::{
    AlarmWeekday, BlockProtection, Control, OscTrim, Polarity, RegAddr, Seconds,
    SquareWaveFrequency, Weekday,
};
use registers::RTC_ADDRESS;
use transport::Transport;

/// Size of a power fail time stamp in bytes.
pub(crate) const POWER_FAIL_REGISTER_COUNT: usize = 4;

/// Errors reported by the driver.
#[derive(Debug, PartialEq)]
pub enum Mcp79410Error<I2CE> {
    /// Bus error
    I2c(I2CE),
    /// Date/time conversion error
    DateTime(DateTimeError),
    /// Alarm slot or mode error
    Alarm(AlarmError),
    /// Memory access past the end of the block; nothing was transferred
    OutOfRange,
    /// The RTC has never been set or its oscillator is not running
    RtcNotValid,
    /// The oscillator is stopped so an alarm cannot be armed
    RtcNotRunning,
    /// The host clock is not valid
    HostTimeNotValid,
    /// Protected EEPROM block writes are not enabled in [`Config`]
    ProtectedWriteDisabled,
}

impl<I2CE> From<I2CE> for Mcp79410Error<I2CE> {
    fn from(e: I2CE) -> Self {
        Mcp79410Error::I2c(e)
    }
}

/// Direction(s) in which time is synchronized between the host and the RTC.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeSyncMode {
    /// No automatic synchronization
    None = 0b00,
    /// The RTC is set from the host once the host clock has been synchronized
    HostToRtc = 0b01,
    /// The host clock is set from the RTC at setup if the host clock is not valid
    RtcToHost = 0b10,
    /// Both directions
    #[default]
    Automatic = 0b11,
}

impl TimeSyncMode {
    #[must_use]
    pub fn host_to_rtc(self) -> bool {
        (self as u8) & (TimeSyncMode::HostToRtc as u8) != 0
    }

    #[must_use]
    pub fn rtc_to_host(self) -> bool {
        (self as u8) & (TimeSyncMode::RtcToHost as u8) != 0
    }
}

/// Driver configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Synchronization between host and RTC, see [`Mcp79410::setup`] and [`Mcp79410::periodic_tick`]
    pub time_sync_mode: TimeSyncMode,
    /// Keep time on the backup battery when main power is lost
    pub battery_enable: bool,
    /// Allow [`Eeprom::protected_block_write`]
    pub protected_block_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_sync_mode: TimeSyncMode::Automatic,
            battery_enable: true,
            protected_block_write: false,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_time_sync_mode(mut self, mode: TimeSyncMode) -> Self {
        self.time_sync_mode = mode;
        self
    }

    #[must_use]
    pub fn with_battery_enable(mut self, enable: bool) -> Self {
        self.battery_enable = enable;
        self
    }

    #[must_use]
    pub fn with_protected_block_write(mut self, enable: bool) -> Self {
        self.protected_block_write = enable;
        self
    }
}

/// The host's wall clock.
pub trait TimeSource {
    /// Whether the host clock currently holds a real time.
    fn is_valid(&self) -> bool;

    /// Current time in Unix seconds (UTC).
    fn now(&self) -> i64;

    /// Sets the host clock to Unix seconds (UTC).
    fn set_time(&mut self, time: i64);

    /// Whether the host clock has been synchronized from an external source at least once.
    fn is_synchronized(&self) -> bool;
}

/// MCP79410 driver.
///
/// Owns the bus. SRAM and EEPROM are reached through [`Mcp79410::sram`] and
/// [`Mcp79410::eeprom`], which borrow the driver.
pub struct Mcp79410<I2C> {
    transport: Transport<I2C>,
    config: Config,
    setup_done: bool,
    time_set: bool,
}

impl<I2C: I2c> Mcp79410<I2C> {
    /// Creates a driver with the default [`Config`].
    pub fn new(i2c: I2C) -> Self {
        Self::with_config(i2c, Config::default())
    }

    pub fn with_config(i2c: I2C, config: Config) -> Self {
        Self {
            transport: Transport::new(i2c),
            config,
            setup_done: false,
            time_set: false,
        }
    }

    /// Releases the bus.
    pub fn destroy(self) -> I2C {
        self.transport.destroy()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_time_sync_mode(&mut self, mode: TimeSyncMode) {
        self.config.time_sync_mode = mode;
    }

    /// The 64 byte SRAM.
    pub fn sram(&mut self) -> Sram<'_, I2C> {
        Sram::new(&mut self.transport)
    }

    /// The 128 byte EEPROM and its protected block.
    pub fn eeprom(&mut self) -> Eeprom<'_, I2C> {
        Eeprom::new(&mut self.transport, self.config.protected_block_write)
    }

    /// Call once at startup.
    ///
    /// If the host clock is not valid and the sync mode includes RTC to host,
    /// the host clock is set from the RTC when the RTC holds a valid time.
    /// The driver counts as set up afterwards even if this fails.
    ///
    /// # Errors
    ///
    /// Returns the bus error from reading the RTC.
    pub fn setup<T: TimeSource>(
        &mut self,
        host: &mut T,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        let result = if !host.is_valid() && self.config.time_sync_mode.rtc_to_host() {
            self.set_host_from_rtc(host)
        } else {
            Ok(())
        };
        self.setup_done = true;
        result
    }

    fn set_host_from_rtc<T: TimeSource>(
        &mut self,
        host: &mut T,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        match self.rtc_unix_time() {
            Ok(time) => {
                host.set_time(time);
                info!("set host time from RTC {}", time);
                Ok(())
            }
            Err(Mcp79410Error::RtcNotValid | Mcp79410Error::DateTime(_)) => {
                info!("RTC time not valid, host time not set");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Call periodically from the application loop.
    ///
    /// The first time the host clock is valid and has been synchronized, the
    /// RTC is set from it if the sync mode includes host to RTC. This happens
    /// once per driver instance.
    ///
    /// # Errors
    ///
    /// Returns the bus error from writing the RTC. It is not retried.
    pub fn periodic_tick<T: TimeSource>(
        &mut self,
        host: &T,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        if self.time_set || !host.is_valid() || !host.is_synchronized() {
            return Ok(());
        }
        self.time_set = true;
        if self.config.time_sync_mode.host_to_rtc() {
            self.set_rtc_from_host(host)?;
        }
        Ok(())
    }

    /// Sets the RTC from the host clock.
    ///
    /// # Errors
    ///
    /// `HostTimeNotValid` if the host clock is not valid, otherwise see [`Mcp79410::set_rtc_time`].
    pub fn set_rtc_from_host<T: TimeSource>(
        &mut self,
        host: &T,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        if !host.is_valid() {
            info!("host time not valid, RTC not set");
            return Err(Mcp79410Error::HostTimeNotValid);
        }
        let now = host.now();
        self.set_rtc_time(now)?;
        info!("set RTC from host time {}", now);
        Ok(())
    }

    /// Sets the RTC to Unix seconds (UTC) and starts the oscillator.
    ///
    /// The battery enable bit is written from the configuration.
    ///
    /// # Errors
    ///
    /// `DateTime` if the time cannot be broken down, or the bus error.
    pub fn set_rtc_time(&mut self, time: i64) -> Result<(), Mcp79410Error<I2C::Error>> {
        let mut raw = RawTime::from_unix_time(time).map_err(Mcp79410Error::DateTime)?;
        raw.prepare_rtc_write(self.config.battery_enable);
        let data: [u8; TIME_REGISTER_COUNT] = (&raw).into();
        self.transport
            .write(RTC_ADDRESS, RegAddr::Seconds as u8, &data)?;
        Ok(())
    }

    /// Reads the RTC time.
    ///
    /// # Errors
    ///
    /// `RtcNotValid` if the year is zero or the oscillator is not running, or the bus error.
    pub fn rtc_time(&mut self) -> Result<RawTime, Mcp79410Error<I2C::Error>> {
        let mut data = [0; TIME_REGISTER_COUNT];
        self.transport
            .read(RTC_ADDRESS, RegAddr::Seconds as u8, &mut data)?;
        let raw = RawTime::from(data);
        if !raw.is_valid_rtc_time() {
            return Err(Mcp79410Error::RtcNotValid);
        }
        Ok(raw)
    }

    /// Reads the RTC time as Unix seconds (UTC).
    ///
    /// # Errors
    ///
    /// See [`Mcp79410::rtc_time`]; also `DateTime` if the registers do not hold a real date.
    pub fn rtc_unix_time(&mut self) -> Result<i64, Mcp79410Error<I2C::Error>> {
        self.rtc_time()?
            .to_unix_time()
            .map_err(Mcp79410Error::DateTime)
    }

    /// Reads the RTC time as a chrono `DateTime<Utc>`.
    ///
    /// # Errors
    ///
    /// See [`Mcp79410::rtc_unix_time`].
    pub fn rtc_datetime(&mut self) -> Result<DateTime<Utc>, Mcp79410Error<I2C::Error>> {
        let datetime = self
            .rtc_time()?
            .to_datetime()
            .map_err(Mcp79410Error::DateTime)?;
        Ok(datetime.and_utc())
    }

    /// Whether the RTC holds a valid time.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn is_rtc_valid(&mut self) -> Result<bool, Mcp79410Error<I2C::Error>> {
        match self.rtc_time() {
            Ok(_) => Ok(true),
            Err(Mcp79410Error::RtcNotValid) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the oscillator is running (OSCRUN).
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn oscillator_running(&mut self) -> Result<bool, Mcp79410Error<I2C::Error>> {
        Ok(self.weekday_status()?.oscillator_running())
    }

    /// Whether battery switchover is enabled on the chip (VBATEN).
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn battery_enable(&mut self) -> Result<bool, Mcp79410Error<I2C::Error>> {
        Ok(self.weekday_status()?.battery_enable())
    }

    /// Enables or disables battery switchover.
    ///
    /// Before [`Mcp79410::setup`] the value is only stored and is applied by the next RTC time write.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn set_battery_enable(&mut self, enable: bool) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.config.battery_enable = enable;
        if self.setup_done {
            self.transport.write_register_flag(
                RegAddr::Weekday as u8,
                Weekday::BATTERY_ENABLE,
                enable,
            )?;
        }
        Ok(())
    }

    /// Whether power fail time stamps have been captured (PWRFAIL).
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn power_fail(&mut self) -> Result<bool, Mcp79410Error<I2C::Error>> {
        Ok(self.weekday_status()?.power_fail())
    }

    /// Clears the power fail flag, which also clears the time stamps.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn clear_power_fail(&mut self) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.transport
            .write_register_flag(RegAddr::Weekday as u8, Weekday::POWER_FAIL, false)?;
        Ok(())
    }

    /// Time main power was lost. Second and year are not recorded and read as cleared.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn power_down_time(&mut self) -> Result<RawTime, Mcp79410Error<I2C::Error>> {
        self.read_power_fail_time(RegAddr::PowerDown)
    }

    /// Time main power was restored. Second and year are not recorded and read as cleared.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn power_up_time(&mut self) -> Result<RawTime, Mcp79410Error<I2C::Error>> {
        self.read_power_fail_time(RegAddr::PowerUp)
    }

    fn read_power_fail_time(
        &mut self,
        register: RegAddr,
    ) -> Result<RawTime, Mcp79410Error<I2C::Error>> {
        let mut data = [0; POWER_FAIL_REGISTER_COUNT];
        self.transport
            .read(RTC_ADDRESS, register as u8, &mut data)?;
        Ok(RawTime::from_power_fail(data))
    }

    /// Programs and enables an alarm.
    ///
    /// Any pending interrupt of the slot is cleared first, otherwise the new alarm would not fire.
    ///
    /// # Errors
    ///
    /// `RtcNotRunning` if the oscillator is stopped, in which case nothing is written, or the bus error.
    pub fn set_alarm(
        &mut self,
        time: &RawTime,
        polarity: Polarity,
        slot: AlarmSlot,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        if !self.oscillator_running()? {
            return Err(Mcp79410Error::RtcNotRunning);
        }
        self.clear_interrupt(slot)?;

        let regs = AlarmRegisters::from_time(time, polarity);
        debug!("set alarm {:?} {:?} {}", slot, polarity, time);
        let data: [u8; ALARM_REGISTER_COUNT] = (&regs).into();
        self.transport.write(RTC_ADDRESS, slot.base(), &data)?;
        self.transport
            .write_register_flag(RegAddr::Control as u8, slot.enable_mask(), true)?;
        Ok(())
    }

    /// Programs an alarm matching the full date and time `seconds` from now.
    ///
    /// # Errors
    ///
    /// `RtcNotValid` if the RTC time is not valid, otherwise see [`Mcp79410::set_alarm`].
    pub fn set_alarm_in(
        &mut self,
        seconds: i64,
        polarity: Polarity,
        slot: AlarmSlot,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        let now = self.rtc_unix_time()?;
        let at = now
            .checked_add(seconds)
            .ok_or(Mcp79410Error::DateTime(DateTimeError::InvalidTimestamp))?;
        let mut time = RawTime::default();
        time.set_alarm_time(at).map_err(Mcp79410Error::DateTime)?;
        self.set_alarm(&time, polarity, slot)
    }

    /// Disables an alarm.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn clear_alarm(&mut self, slot: AlarmSlot) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.transport
            .write_register_flag(RegAddr::Control as u8, slot.enable_mask(), false)?;
        Ok(())
    }

    /// Whether an alarm is enabled.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn alarm_enabled(&mut self, slot: AlarmSlot) -> Result<bool, Mcp79410Error<I2C::Error>> {
        Ok(u8::from(self.control()?) & slot.enable_mask() != 0)
    }

    /// Reads back an alarm's time, match mode and polarity. The year is cleared.
    ///
    /// # Errors
    ///
    /// `Alarm` if the match mode bits hold a reserved value, or the bus error.
    pub fn read_alarm(
        &mut self,
        slot: AlarmSlot,
    ) -> Result<(RawTime, Polarity), Mcp79410Error<I2C::Error>> {
        let mut data = [0; ALARM_REGISTER_COUNT];
        self.transport.read(RTC_ADDRESS, slot.base(), &mut data)?;
        let regs = AlarmRegisters::from(data);
        let time = regs.to_time().map_err(Mcp79410Error::Alarm)?;
        Ok((time, regs.polarity()))
    }

    /// Whether an alarm has fired. The flag stays set until [`Mcp79410::clear_interrupt`].
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn interrupt(&mut self, slot: AlarmSlot) -> Result<bool, Mcp79410Error<I2C::Error>> {
        let value = self.transport.read_register(slot.weekday_register())?;
        Ok(AlarmWeekday::from(value).interrupt_flag())
    }

    /// Clears an alarm's interrupt flag.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn clear_interrupt(&mut self, slot: AlarmSlot) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.transport.write_register_flag(
            slot.weekday_register(),
            AlarmWeekday::INTERRUPT_FLAG,
            false,
        )?;
        Ok(())
    }

    /// Outputs a square wave on MFP. Starts the oscillator and disables both alarms.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn set_square_wave_mode(
        &mut self,
        frequency: SquareWaveFrequency,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.transport.write_register_flag(
            RegAddr::Seconds as u8,
            Seconds::START_OSCILLATOR,
            true,
        )?;
        let mut control = Control::default();
        control.set_square_wave_enable(true);
        control.set_square_wave_frequency(frequency);
        self.transport.write_register_mask(
            RegAddr::Control as u8,
            !Control::SQUARE_WAVE_CLEAR_MASK,
            control.into(),
        )?;
        Ok(())
    }

    /// Stops the square wave output.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn clear_square_wave_mode(&mut self) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.transport.write_register_flag(
            RegAddr::Control as u8,
            Control::SQUARE_WAVE_ENABLE,
            false,
        )?;
        Ok(())
    }

    /// Sets the digital trim. Positive values add clock cycles, negative values subtract.
    /// The magnitude saturates at 127.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn set_osc_trim(&mut self, trim: i8) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.set_oscillator_trim(OscTrim::from_signed(trim))
    }

    /// Reads the digital trim as a signed value.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn osc_trim(&mut self) -> Result<i8, Mcp79410Error<I2C::Error>> {
        Ok(self.oscillator_trim()?.to_signed())
    }
}

// Register access implementations
macro_rules! impl_register_access {
    ($(($name:ident, $regaddr:expr, $typ:ty)),+) => {
        impl<I2C: I2c> Mcp79410<I2C> {
            $(
                paste! {
                    #[doc = concat!("Reads the raw ", stringify!($name), " register.")]
                    #[doc = "\n\n# Errors\n\nReturns the bus error."]
                    pub fn $name(&mut self) -> Result<$typ, Mcp79410Error<I2C::Error>> {
                        let value = self.transport.read_register($regaddr as u8)?;
                        Ok(<$typ>::from(value))
                    }

                    #[doc = concat!("Writes the raw ", stringify!($name), " register.")]
                    #[doc = "\n\n# Errors\n\nReturns the bus error."]
                    pub fn [<set_ $name>](&mut self, value: $typ) -> Result<(), Mcp79410Error<I2C::Error>> {
                        self.transport.write_register($regaddr as u8, value.into())?;
                        Ok(())
                    }
                }
            )+
        }
    }
}

impl_register_access!(
    (seconds_register, RegAddr::Seconds, Seconds),
    (weekday_status, RegAddr::Weekday, Weekday),
    (control, RegAddr::Control, Control),
    (oscillator_trim, RegAddr::OscTrim, OscTrim)
);

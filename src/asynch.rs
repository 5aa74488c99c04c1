//! Async implementation of the MCP79410 driver.
//!
//! This module provides an async interface to the MCP79410 RTC using
//! `embedded-hal-async` traits. It is only available when the `async` feature
//! is enabled. Time, alarm and memory semantics are the same as for the
//! blocking [`crate::Mcp79410`].
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp79410::asynch::Mcp79410;
//!
//! let mut rtc = Mcp79410::new(i2c);
//!
//! rtc.set_rtc_time(1_700_000_000).await?;
//! let now = rtc.rtc_unix_time().await?;
//! ```

use chrono::{DateTime, Utc};
use embedded_hal_async::i2c::I2c;
use paste::paste;

use crate::alarm::{AlarmRegisters, ALARM_REGISTER_COUNT};
use crate::datetime::TIME_REGISTER_COUNT;
use crate::fmt::{debug, info, warn};
use crate::memory::{check_range, EEPROM_LENGTH, SRAM_LENGTH};
use crate::registers::{
    EepromStatus, EEPROM_ADDRESS, EEPROM_STATUS, RTC_ADDRESS,
};
use crate::transport::{EEPROM_POLL_ATTEMPTS, MAX_READ_CHUNK, MAX_WRITE_CHUNK};
use crate::{
    AlarmSlot, AlarmWeekday, BlockProtection, Config, Control, DateTimeError, Mcp79410Error,
    OscTrim, Polarity, RawTime, RegAddr, Seconds, SquareWaveFrequency, Weekday,
};

/// MCP79410 async driver.
///
/// This struct provides the async interface to the MCP79410 RTC.
/// It supports async I2C operations through the `embedded-hal-async` traits.
pub struct Mcp79410<I2C> {
    i2c: I2C,
    config: Config,
}

impl<I2C: I2c> Mcp79410<I2C> {
    /// Creates a new async driver instance with the default configuration.
    ///
    /// # Arguments
    /// * `i2c` - The async I2C bus implementation
    pub fn new(i2c: I2C) -> Self {
        Self::with_config(i2c, Config::default())
    }

    /// Creates a new async driver instance.
    ///
    /// # Arguments
    /// * `i2c` - The async I2C bus implementation
    /// * `config` - Battery and protected block settings; the sync mode is not used
    pub fn with_config(i2c: I2C, config: Config) -> Self {
        Self { i2c, config }
    }

    /// Releases the bus.
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    async fn read(&mut self, device: u8, register: u8, buf: &mut [u8]) -> Result<(), I2C::Error> {
        let mut address = register;
        for chunk in buf.chunks_mut(MAX_READ_CHUNK) {
            if let Err(e) = self.i2c.write_read(device, &[address], chunk).await {
                info!("read failed device={:#x} register={:#x}", device, address);
                return Err(e);
            }
            // chunks never exceed 32 bytes
            address = address.wrapping_add(chunk.len() as u8);
        }
        Ok(())
    }

    async fn write(&mut self, device: u8, register: u8, data: &[u8]) -> Result<(), I2C::Error> {
        let mut buf = [0u8; MAX_WRITE_CHUNK + 1];
        let mut address = register;
        for chunk in data.chunks(MAX_WRITE_CHUNK) {
            buf[0] = address;
            buf[1..=chunk.len()].copy_from_slice(chunk);
            if let Err(e) = self.i2c.write(device, &buf[..=chunk.len()]).await {
                info!("write failed device={:#x} register={:#x}", device, address);
                return Err(e);
            }
            address = address.wrapping_add(chunk.len() as u8);
        }
        Ok(())
    }

    async fn write_eeprom(&mut self, register: u8, data: &[u8]) -> Result<(), I2C::Error> {
        let mut address = register;
        for &byte in data {
            if let Err(e) = self.i2c.write(EEPROM_ADDRESS, &[address, byte]).await {
                info!("eeprom write failed register={:#x}", address);
                return Err(e);
            }
            self.wait_for_eeprom().await;
            address = address.wrapping_add(1);
        }
        Ok(())
    }

    async fn wait_for_eeprom(&mut self) {
        for _ in 0..EEPROM_POLL_ATTEMPTS {
            if self.i2c.write(EEPROM_ADDRESS, &[]).await.is_ok() {
                return;
            }
        }
        warn!(
            "eeprom still busy after {} polls, continuing",
            EEPROM_POLL_ATTEMPTS
        );
    }

    async fn read_register(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut data = [0];
        self.read(RTC_ADDRESS, register, &mut data).await?;
        Ok(data[0])
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), I2C::Error> {
        self.write(RTC_ADDRESS, register, &[value]).await
    }

    async fn write_register_flag(
        &mut self,
        register: u8,
        flags: u8,
        set: bool,
    ) -> Result<(), I2C::Error> {
        let (and_mask, or_mask) = if set { (0xFF, flags) } else { (!flags, 0x00) };
        self.write_register_mask(register, and_mask, or_mask).await
    }

    async fn write_register_mask(
        &mut self,
        register: u8,
        and_mask: u8,
        or_mask: u8,
    ) -> Result<(), I2C::Error> {
        let old = self.read_register(register).await?;
        self.write_register(register, (old & and_mask) | or_mask)
            .await
    }

    /// Sets the RTC to Unix seconds (UTC) and starts the oscillator.
    ///
    /// # Arguments
    /// * `time` - Unix seconds, 2000-2099
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err(Mcp79410Error)` on error
    pub async fn set_rtc_time(&mut self, time: i64) -> Result<(), Mcp79410Error<I2C::Error>> {
        let mut raw = RawTime::from_unix_time(time).map_err(Mcp79410Error::DateTime)?;
        raw.prepare_rtc_write(self.config.battery_enable);
        let data: [u8; TIME_REGISTER_COUNT] = (&raw).into();
        self.write(RTC_ADDRESS, RegAddr::Seconds as u8, &data)
            .await?;
        Ok(())
    }

    /// Reads the RTC time.
    ///
    /// # Returns
    /// * `Ok(RawTime)` - The RTC time if it is valid
    /// * `Err(Mcp79410Error::RtcNotValid)` if the year is zero or the oscillator is not running
    /// * `Err(Mcp79410Error)` on other errors
    pub async fn rtc_time(&mut self) -> Result<RawTime, Mcp79410Error<I2C::Error>> {
        let mut data = [0; TIME_REGISTER_COUNT];
        self.read(RTC_ADDRESS, RegAddr::Seconds as u8, &mut data)
            .await?;
        let raw = RawTime::from(data);
        if !raw.is_valid_rtc_time() {
            return Err(Mcp79410Error::RtcNotValid);
        }
        Ok(raw)
    }

    /// Reads the RTC time as Unix seconds (UTC).
    pub async fn rtc_unix_time(&mut self) -> Result<i64, Mcp79410Error<I2C::Error>> {
        self.rtc_time()
            .await?
            .to_unix_time()
            .map_err(Mcp79410Error::DateTime)
    }

    /// Reads the RTC time as a chrono `DateTime<Utc>`.
    pub async fn rtc_datetime(&mut self) -> Result<DateTime<Utc>, Mcp79410Error<I2C::Error>> {
        let datetime = self
            .rtc_time()
            .await?
            .to_datetime()
            .map_err(Mcp79410Error::DateTime)?;
        Ok(datetime.and_utc())
    }

    /// Whether the oscillator is running (OSCRUN).
    pub async fn oscillator_running(&mut self) -> Result<bool, Mcp79410Error<I2C::Error>> {
        Ok(self.weekday_status().await?.oscillator_running())
    }

    /// Programs and enables an alarm, clearing the slot's pending interrupt first.
    ///
    /// # Arguments
    /// * `time` - Alarm time and match mode
    /// * `polarity` - MFP level when the alarm fires
    /// * `slot` - Alarm unit
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err(Mcp79410Error::RtcNotRunning)` if the oscillator is stopped; nothing is written
    /// * `Err(Mcp79410Error)` on other errors
    pub async fn set_alarm(
        &mut self,
        time: &RawTime,
        polarity: Polarity,
        slot: AlarmSlot,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        if !self.oscillator_running().await? {
            return Err(Mcp79410Error::RtcNotRunning);
        }
        self.clear_interrupt(slot).await?;

        let regs = AlarmRegisters::from_time(time, polarity);
        debug!("set alarm {:?} {:?} {}", slot, polarity, time);
        let data: [u8; ALARM_REGISTER_COUNT] = (&regs).into();
        self.write(RTC_ADDRESS, slot.base(), &data).await?;
        self.write_register_flag(RegAddr::Control as u8, slot.enable_mask(), true)
            .await?;
        Ok(())
    }

    /// Programs an alarm matching the full date and time `seconds` from now.
    pub async fn set_alarm_in(
        &mut self,
        seconds: i64,
        polarity: Polarity,
        slot: AlarmSlot,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        let now = self.rtc_unix_time().await?;
        let at = now
            .checked_add(seconds)
            .ok_or(Mcp79410Error::DateTime(DateTimeError::InvalidTimestamp))?;
        let mut time = RawTime::default();
        time.set_alarm_time(at).map_err(Mcp79410Error::DateTime)?;
        self.set_alarm(&time, polarity, slot).await
    }

    /// Disables an alarm.
    pub async fn clear_alarm(&mut self, slot: AlarmSlot) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.write_register_flag(RegAddr::Control as u8, slot.enable_mask(), false)
            .await?;
        Ok(())
    }

    /// Whether an alarm has fired.
    pub async fn interrupt(&mut self, slot: AlarmSlot) -> Result<bool, Mcp79410Error<I2C::Error>> {
        let value = self.read_register(slot.weekday_register()).await?;
        Ok(AlarmWeekday::from(value).interrupt_flag())
    }

    /// Clears an alarm's interrupt flag.
    pub async fn clear_interrupt(
        &mut self,
        slot: AlarmSlot,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.write_register_flag(
            slot.weekday_register(),
            AlarmWeekday::INTERRUPT_FLAG,
            false,
        )
        .await?;
        Ok(())
    }

    /// Outputs a square wave on MFP. Starts the oscillator and disables both alarms.
    pub async fn set_square_wave_mode(
        &mut self,
        frequency: SquareWaveFrequency,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.write_register_flag(RegAddr::Seconds as u8, Seconds::START_OSCILLATOR, true)
            .await?;
        let mut control = Control::default();
        control.set_square_wave_enable(true);
        control.set_square_wave_frequency(frequency);
        self.write_register_mask(
            RegAddr::Control as u8,
            !Control::SQUARE_WAVE_CLEAR_MASK,
            control.into(),
        )
        .await?;
        Ok(())
    }

    /// Stops the square wave output.
    pub async fn clear_square_wave_mode(&mut self) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.write_register_flag(RegAddr::Control as u8, Control::SQUARE_WAVE_ENABLE, false)
            .await?;
        Ok(())
    }

    /// Sets the digital trim, see [`crate::Mcp79410::set_osc_trim`].
    pub async fn set_osc_trim(&mut self, trim: i8) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.set_oscillator_trim(OscTrim::from_signed(trim)).await
    }

    /// Reads from the SRAM.
    ///
    /// # Arguments
    /// * `offset` - Offset within the 64 byte SRAM
    /// * `buf` - Destination; its length is the number of bytes read
    pub async fn sram_read(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        check_range(offset, buf.len(), SRAM_LENGTH)?;
        // offset < 64 after the range check
        self.read(RTC_ADDRESS, RegAddr::Sram as u8 + offset as u8, buf)
            .await?;
        Ok(())
    }

    /// Writes to the SRAM.
    pub async fn sram_write(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        check_range(offset, data.len(), SRAM_LENGTH)?;
        self.write(RTC_ADDRESS, RegAddr::Sram as u8 + offset as u8, data)
            .await?;
        Ok(())
    }

    /// Reads from the EEPROM.
    pub async fn eeprom_read(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        check_range(offset, buf.len(), EEPROM_LENGTH)?;
        self.read(EEPROM_ADDRESS, offset as u8, buf).await?;
        Ok(())
    }

    /// Writes to the EEPROM one byte at a time, polling for completion after each.
    pub async fn eeprom_write(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        check_range(offset, data.len(), EEPROM_LENGTH)?;
        self.write_eeprom(offset as u8, data).await?;
        Ok(())
    }

    /// Reads the EEPROM block write protection level.
    pub async fn block_protection(
        &mut self,
    ) -> Result<BlockProtection, Mcp79410Error<I2C::Error>> {
        let mut data = [0];
        self.read(EEPROM_ADDRESS, EEPROM_STATUS, &mut data).await?;
        Ok(EepromStatus::from(data[0]).block_protection())
    }

    /// Sets the EEPROM block write protection level.
    pub async fn set_block_protection(
        &mut self,
        level: BlockProtection,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        let mut status = EepromStatus::default();
        status.set_block_protection(level);
        self.write(EEPROM_ADDRESS, EEPROM_STATUS, &[status.into()])
            .await?;
        self.wait_for_eeprom().await;
        Ok(())
    }
}

// Register access implementations
macro_rules! impl_register_access {
    ($(($name:ident, $regaddr:expr, $typ:ty)),+) => {
        impl<I2C: I2c> Mcp79410<I2C> {
            $(
                paste! {
                    #[doc = concat!("Gets the value of the ", stringify!($name), " register.")]
                    #[doc = "\n\n# Returns"]
                    #[doc = concat!("* `Ok(", stringify!($typ), ")` - The register value on success")]
                    #[doc = "* `Err(Mcp79410Error)` on error"]
                    pub async fn $name(&mut self) -> Result<$typ, Mcp79410Error<I2C::Error>> {
                        let value = self.read_register($regaddr as u8).await?;
                        Ok(<$typ>::from(value))
                    }

                    #[doc = concat!("Sets the value of the ", stringify!($name), " register.")]
                    #[doc = "\n\n# Arguments"]
                    #[doc = concat!("* `value` - The value to write to the ", stringify!($name), " register")]
                    #[doc = "\n\n# Returns"]
                    #[doc = "* `Ok(())` on success"]
                    #[doc = "* `Err(Mcp79410Error)` on error"]
                    pub async fn [<set_ $name>](&mut self, value: $typ) -> Result<(), Mcp79410Error<I2C::Error>> {
                        self.write_register($regaddr as u8, value.into()).await?;
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

#[cfg(test)]
mod tests {
    extern crate alloc;
    use super::*;
    use alloc::vec;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};

    const DEVICE_ADDRESS: u8 = RTC_ADDRESS;

    async fn setup_mock(expectations: &[I2cTrans]) -> I2cMock {
        I2cMock::new(expectations)
    }

    #[tokio::test]
    async fn test_async_set_rtc_time() {
        let mock = setup_mock(&[I2cTrans::write(
            DEVICE_ADDRESS,
            vec![0x00, 0xA6, 0x01, 0x13, 0x0A, 0x25, 0x02, 0x19],
        )])
        .await;
        let mut dev = Mcp79410::new(mock);
        dev.set_rtc_time(1_551_099_686).await.unwrap();
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_rtc_time() {
        let registers = vec![0xA6, 0x01, 0x13, 0x2A, 0x25, 0x02, 0x19];
        let mock = setup_mock(&[
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x00], registers.clone()),
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x00], registers),
        ])
        .await;
        let mut dev = Mcp79410::new(mock);
        assert_eq!(dev.rtc_unix_time().await.unwrap(), 1_551_099_686);
        assert_eq!(dev.rtc_datetime().await.unwrap().timestamp(), 1_551_099_686);
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_rtc_time_not_valid() {
        let mock = setup_mock(&[I2cTrans::write_read(
            DEVICE_ADDRESS,
            vec![0x00],
            vec![0x26, 0x01, 0x13, 0x0A, 0x25, 0x02, 0x19],
        )])
        .await;
        let mut dev = Mcp79410::new(mock);
        assert_eq!(dev.rtc_time().await, Err(Mcp79410Error::RtcNotValid));
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_set_alarm() {
        let mock = setup_mock(&[
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x03], vec![0x20]),
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x14], vec![0x08]),
            I2cTrans::write(DEVICE_ADDRESS, vec![0x14, 0x00]),
            I2cTrans::write(
                DEVICE_ADDRESS,
                vec![0x11, 0x00, 0x00, 0x18, 0x21, 0x01, 0x01],
            ),
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x07], vec![0x00]),
            I2cTrans::write(DEVICE_ADDRESS, vec![0x07, 0x20]),
        ])
        .await;
        let mut dev = Mcp79410::new(mock);
        let mut time = RawTime::default();
        time.set_alarm_hour(18);
        dev.set_alarm(&time, Polarity::ActiveLow, AlarmSlot::One)
            .await
            .unwrap();
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_set_alarm_requires_running_oscillator() {
        let mock = setup_mock(&[I2cTrans::write_read(DEVICE_ADDRESS, vec![0x03], vec![0x00])]).await;
        let mut dev = Mcp79410::new(mock);
        let time = RawTime::default();
        assert_eq!(
            dev.set_alarm(&time, Polarity::ActiveHigh, AlarmSlot::Zero)
                .await,
            Err(Mcp79410Error::RtcNotRunning)
        );
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_interrupt_and_clear_alarm() {
        let mock = setup_mock(&[
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x0D], vec![0x08]),
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x07], vec![0x10]),
            I2cTrans::write(DEVICE_ADDRESS, vec![0x07, 0x00]),
        ])
        .await;
        let mut dev = Mcp79410::new(mock);
        assert!(dev.interrupt(AlarmSlot::Zero).await.unwrap());
        dev.clear_alarm(AlarmSlot::Zero).await.unwrap();
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_square_wave_and_trim() {
        let mock = setup_mock(&[
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x00], vec![0x80]),
            I2cTrans::write(DEVICE_ADDRESS, vec![0x00, 0x80]),
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x07], vec![0x10]),
            I2cTrans::write(DEVICE_ADDRESS, vec![0x07, 0x40]),
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x07], vec![0x40]),
            I2cTrans::write(DEVICE_ADDRESS, vec![0x07, 0x00]),
            I2cTrans::write(DEVICE_ADDRESS, vec![0x08, 0x03]),
        ])
        .await;
        let mut dev = Mcp79410::new(mock);
        dev.set_square_wave_mode(SquareWaveFrequency::Hz1)
            .await
            .unwrap();
        dev.clear_square_wave_mode().await.unwrap();
        dev.set_osc_trim(-3).await.unwrap();
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_sram() {
        let mock = setup_mock(&[
            I2cTrans::write(DEVICE_ADDRESS, vec![0x5E, 0x01, 0x02]),
            I2cTrans::write_read(DEVICE_ADDRESS, vec![0x5E], vec![0x01, 0x02]),
        ])
        .await;
        let mut dev = Mcp79410::new(mock);
        dev.sram_write(62, &[0x01, 0x02]).await.unwrap();
        let mut buf = [0u8; 2];
        dev.sram_read(62, &mut buf).await.unwrap();
        assert_eq!(buf, [0x01, 0x02]);
        assert_eq!(
            dev.sram_write(63, &[0x01, 0x02]).await,
            Err(Mcp79410Error::OutOfRange)
        );
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_eeprom() {
        let mock = setup_mock(&[
            I2cTrans::write(EEPROM_ADDRESS, vec![0x00, 0xAB]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
            I2cTrans::write_read(EEPROM_ADDRESS, vec![0x00], vec![0xAB]),
            I2cTrans::write(EEPROM_ADDRESS, vec![0xFF, 0x04]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
            I2cTrans::write_read(EEPROM_ADDRESS, vec![0xFF], vec![0x04]),
        ])
        .await;
        let mut dev = Mcp79410::new(mock);
        dev.eeprom_write(0, &[0xAB]).await.unwrap();
        let mut buf = [0u8; 1];
        dev.eeprom_read(0, &mut buf).await.unwrap();
        assert_eq!(buf, [0xAB]);
        dev.set_block_protection(BlockProtection::UpperQuarter)
            .await
            .unwrap();
        assert_eq!(
            dev.block_protection().await.unwrap(),
            BlockProtection::UpperQuarter
        );
        let mut big = [0u8; 129];
        assert_eq!(
            dev.eeprom_read(0, &mut big).await,
            Err(Mcp79410Error::OutOfRange)
        );
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_eeprom_write_stops_on_error() {
        let mock = setup_mock(&[
            I2cTrans::write(EEPROM_ADDRESS, vec![0x10, 0x01]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
            I2cTrans::write(EEPROM_ADDRESS, vec![0x11, 0x02]).with_error(ErrorKind::Other),
        ])
        .await;
        let mut dev = Mcp79410::new(mock);
        assert_eq!(
            dev.eeprom_write(0x10, &[0x01, 0x02, 0x03]).await,
            Err(Mcp79410Error::I2c(ErrorKind::Other))
        );
        dev.i2c.done();
    }

    #[tokio::test]
    async fn test_async_read_control() {
        let mock = setup_mock(&[I2cTrans::write_read(
            DEVICE_ADDRESS,
            vec![RegAddr::Control as u8],
            vec![0x30],
        )])
        .await;
        let mut dev = Mcp79410::new(mock);
        let control = dev.control().await.unwrap();
        assert!(control.alarm0_enable());
        assert!(control.alarm1_enable());
        assert!(!control.square_wave_enable());
        dev.i2c.done();
    }
}

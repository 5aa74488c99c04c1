//! Byte level access to the MCP79410 register file, SRAM and EEPROM.
//!
//! Transfers longer than the bus transaction limit are split into chunks,
//! each one addressed at the register it starts at. EEPROM writes are issued
//! one byte at a time, each followed by a write completion poll.

use embedded_hal::i2c::I2c;

use crate::fmt::{info, trace, warn};
use crate::registers::{EEPROM_ADDRESS, RTC_ADDRESS};

/// Largest read issued in a single transaction.
pub const MAX_READ_CHUNK: usize = 32;

/// Largest write payload in a single transaction; the register address takes one more byte.
pub const MAX_WRITE_CHUNK: usize = 31;

/// Number of times the EEPROM is addressed while waiting for a write to finish.
pub const EEPROM_POLL_ATTEMPTS: usize = 50;

/// Owns the bus and performs chunked register transfers.
pub struct Transport<I2C> {
    pub(crate) i2c: I2C,
}

impl<I2C: I2c> Transport<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Releases the bus.
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    /// Reads `buf.len()` bytes starting at `register` of `device`.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first bus error.
    pub fn read(&mut self, device: u8, register: u8, buf: &mut [u8]) -> Result<(), I2C::Error> {
        let mut address = register;
        for chunk in buf.chunks_mut(MAX_READ_CHUNK) {
            if let Err(e) = self.i2c.write_read(device, &[address], chunk) {
                info!("read failed device={:#x} register={:#x}", device, address);
                return Err(e);
            }
            // chunks never exceed 32 bytes
            address = address.wrapping_add(chunk.len() as u8);
        }
        Ok(())
    }

    /// Writes `data` starting at `register` of `device`.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first bus error. Chunks already written stay written.
    pub fn write(&mut self, device: u8, register: u8, data: &[u8]) -> Result<(), I2C::Error> {
        let mut buf = [0u8; MAX_WRITE_CHUNK + 1];
        let mut address = register;
        for chunk in data.chunks(MAX_WRITE_CHUNK) {
            buf[0] = address;
            buf[1..=chunk.len()].copy_from_slice(chunk);
            if let Err(e) = self.i2c.write(device, &buf[..=chunk.len()]) {
                info!("write failed device={:#x} register={:#x}", device, address);
                return Err(e);
            }
            address = address.wrapping_add(chunk.len() as u8);
        }
        Ok(())
    }

    /// Writes `data` to the EEPROM one byte per transaction, polling for completion after each.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first bus error.
    pub fn write_eeprom(&mut self, register: u8, data: &[u8]) -> Result<(), I2C::Error> {
        let mut address = register;
        for &byte in data {
            if let Err(e) = self.i2c.write(EEPROM_ADDRESS, &[address, byte]) {
                info!("eeprom write failed register={:#x}", address);
                return Err(e);
            }
            self.wait_for_eeprom();
            address = address.wrapping_add(1);
        }
        Ok(())
    }

    /// Polls the EEPROM until it acknowledges its address again.
    ///
    /// Giving up after [`EEPROM_POLL_ATTEMPTS`] is not an error; the caller proceeds.
    pub fn wait_for_eeprom(&mut self) {
        for _ in 0..EEPROM_POLL_ATTEMPTS {
            if self.i2c.write(EEPROM_ADDRESS, &[]).is_ok() {
                return;
            }
        }
        warn!(
            "eeprom still busy after {} polls, continuing",
            EEPROM_POLL_ATTEMPTS
        );
    }

    /// Reads one register of the time keeping block.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn read_register(&mut self, register: u8) -> Result<u8, I2C::Error> {
        let mut data = [0];
        self.read(RTC_ADDRESS, register, &mut data)?;
        Ok(data[0])
    }

    /// Writes one register of the time keeping block.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), I2C::Error> {
        self.write(RTC_ADDRESS, register, &[value])
    }

    /// Read-modify-write: the new value is `(old & and_mask) | or_mask`.
    ///
    /// # Errors
    ///
    /// Returns the bus error of either transfer. Nothing is written if the read fails.
    pub fn write_register_mask(
        &mut self,
        register: u8,
        and_mask: u8,
        or_mask: u8,
    ) -> Result<(), I2C::Error> {
        let old = self.read_register(register)?;
        let value = (old & and_mask) | or_mask;
        trace!(
            "register {:#x}: {:#x} -> {:#x}",
            register,
            old,
            value
        );
        self.write_register(register, value)
    }

    /// Sets or clears `flags` in a register, leaving the other bits alone.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn write_register_flag(
        &mut self,
        register: u8,
        flags: u8,
        set: bool,
    ) -> Result<(), I2C::Error> {
        if set {
            self.write_register_mask(register, 0xFF, flags)
        } else {
            self.write_register_mask(register, !flags, 0x00)
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};

    fn setup_mock(expectations: &[I2cTrans]) -> Transport<I2cMock> {
        Transport::new(I2cMock::new(expectations))
    }

    #[test]
    fn test_read_single_chunk() {
        let mut transport = setup_mock(&[I2cTrans::write_read(
            RTC_ADDRESS,
            vec![0x20],
            vec![1, 2, 3, 4],
        )]);
        let mut buf = [0u8; 4];
        transport.read(RTC_ADDRESS, 0x20, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        transport.i2c.done();
    }

    #[test]
    fn test_read_is_chunked_at_32_bytes() {
        let first: Vec<u8> = (0..32).collect();
        let second: Vec<u8> = (32..64).collect();
        let third: Vec<u8> = (64..70).collect();
        let mut transport = setup_mock(&[
            I2cTrans::write_read(EEPROM_ADDRESS, vec![0x00], first),
            I2cTrans::write_read(EEPROM_ADDRESS, vec![0x20], second),
            I2cTrans::write_read(EEPROM_ADDRESS, vec![0x40], third),
        ]);
        let mut buf = [0u8; 70];
        transport.read(EEPROM_ADDRESS, 0x00, &mut buf).unwrap();
        for (i, b) in buf.iter().enumerate() {
            assert_eq!(usize::from(*b), i);
        }
        transport.i2c.done();
    }

    #[test]
    fn test_read_stops_on_error() {
        let mut transport = setup_mock(&[I2cTrans::write_read(
            RTC_ADDRESS,
            vec![0x20],
            vec![0; 32],
        )
        .with_error(ErrorKind::Other)]);
        let mut buf = [0u8; 64];
        assert_eq!(
            transport.read(RTC_ADDRESS, 0x20, &mut buf),
            Err(ErrorKind::Other)
        );
        transport.i2c.done();
    }

    #[test]
    fn test_write_is_chunked_at_31_bytes() {
        let data: Vec<u8> = (0..40).collect();
        let mut first = vec![0x20];
        first.extend(0..31u8);
        let mut second = vec![0x3F];
        second.extend(31..40u8);
        let mut transport = setup_mock(&[
            I2cTrans::write(RTC_ADDRESS, first),
            I2cTrans::write(RTC_ADDRESS, second),
        ]);
        transport.write(RTC_ADDRESS, 0x20, &data).unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_write_stops_on_error() {
        let data = [0xAAu8; 40];
        let mut first = vec![0x20];
        first.extend([0xAAu8; 31]);
        let mut transport =
            setup_mock(&[I2cTrans::write(RTC_ADDRESS, first).with_error(ErrorKind::Other)]);
        assert!(transport.write(RTC_ADDRESS, 0x20, &data).is_err());
        transport.i2c.done();
    }

    #[test]
    fn test_write_eeprom_single_bytes_with_poll() {
        let mut transport = setup_mock(&[
            I2cTrans::write(EEPROM_ADDRESS, vec![0x10, 0xDE]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
            I2cTrans::write(EEPROM_ADDRESS, vec![0x11, 0xAD]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
        ]);
        transport.write_eeprom(0x10, &[0xDE, 0xAD]).unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_eeprom_poll_retries_until_ack() {
        let mut transport = setup_mock(&[
            I2cTrans::write(EEPROM_ADDRESS, vec![]).with_error(ErrorKind::Other),
            I2cTrans::write(EEPROM_ADDRESS, vec![]).with_error(ErrorKind::Other),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
        ]);
        transport.wait_for_eeprom();
        transport.i2c.done();
    }

    #[test]
    fn test_eeprom_poll_gives_up_without_error() {
        let busy: Vec<I2cTrans> = (0..EEPROM_POLL_ATTEMPTS)
            .map(|_| I2cTrans::write(EEPROM_ADDRESS, vec![]).with_error(ErrorKind::Other))
            .collect();
        let mut expectations = vec![I2cTrans::write(EEPROM_ADDRESS, vec![0x00, 0x42])];
        expectations.extend(busy);
        let mut transport = setup_mock(&expectations);
        transport.write_eeprom(0x00, &[0x42]).unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_write_register_mask() {
        let mut transport = setup_mock(&[
            I2cTrans::write_read(RTC_ADDRESS, vec![0x07], vec![0b1011_0001]),
            I2cTrans::write(RTC_ADDRESS, vec![0x07, 0b1100_0010]),
        ]);
        transport
            .write_register_mask(0x07, !0b0011_0011, 0b0100_0010)
            .unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_write_register_mask_read_failure_skips_write() {
        let mut transport = setup_mock(&[I2cTrans::write_read(
            RTC_ADDRESS,
            vec![0x07],
            vec![0x00],
        )
        .with_error(ErrorKind::Other)]);
        assert!(transport.write_register_mask(0x07, 0xFF, 0x10).is_err());
        transport.i2c.done();
    }

    #[test]
    fn test_write_register_flag() {
        let mut transport = setup_mock(&[
            I2cTrans::write_read(RTC_ADDRESS, vec![0x03], vec![0x21]),
            I2cTrans::write(RTC_ADDRESS, vec![0x03, 0x29]),
            I2cTrans::write_read(RTC_ADDRESS, vec![0x03], vec![0x39]),
            I2cTrans::write(RTC_ADDRESS, vec![0x03, 0x29]),
        ]);
        transport.write_register_flag(0x03, 0x08, true).unwrap();
        transport.write_register_flag(0x03, 0x10, false).unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_destroy_returns_bus() {
        let transport = setup_mock(&[]);
        let mut i2c = transport.destroy();
        i2c.done();
    }
}

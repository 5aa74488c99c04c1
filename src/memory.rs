//! SRAM and EEPROM accessors.
//!
//! Both memories implement [`Memory`], which provides bounds checked raw
//! access plus `erase`, `get` and `put` on top of it. Typed values are stored
//! little-endian through [`MemoryValue`].
//!
//! ```rust,ignore
//! use mcp79410::{Mcp79410, Memory};
//!
//! let mut rtc = Mcp79410::new(i2c);
//! rtc.sram().put(0, &0x1234_5678u32)?;
//! let boot_count: u32 = rtc.eeprom().get(0x10)?;
//! ```

use embedded_hal::i2c::I2c;

use crate::registers::{
    BlockProtection, EepromStatus, RegAddr, EEPROM_ADDRESS, EEPROM_PROTECTED_BLOCK,
    EEPROM_PROTECTED_BLOCK_SIZE, EEPROM_STATUS, EEPROM_UNLOCK_SEQUENCE, RTC_ADDRESS,
};
use crate::transport::Transport;
use crate::Mcp79410Error;

/// Size of the battery backed SRAM in bytes.
pub const SRAM_LENGTH: usize = 64;

/// Size of the EEPROM array in bytes, not counting the protected block.
pub const EEPROM_LENGTH: usize = 128;

/// Bytes written per `write_data` call while erasing.
pub const ERASE_CHUNK: usize = 16;

/// Largest value `get` and `put` can transfer.
pub const MAX_VALUE_SIZE: usize = EEPROM_LENGTH;

pub(crate) fn check_range<E>(
    offset: usize,
    len: usize,
    capacity: usize,
) -> Result<(), Mcp79410Error<E>> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(Mcp79410Error::OutOfRange),
    }
}

/// A value with a fixed size byte encoding.
pub trait MemoryValue: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Writes the encoding into `buf`, which is exactly `SIZE` bytes long.
    fn encode(&self, buf: &mut [u8]);

    /// Reads a value from `buf`, which is exactly `SIZE` bytes long.
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_memory_value_le {
    ($($typ:ty),+) => {
        $(
            impl MemoryValue for $typ {
                const SIZE: usize = core::mem::size_of::<$typ>();

                fn encode(&self, buf: &mut [u8]) {
                    buf.copy_from_slice(&self.to_le_bytes());
                }

                fn decode(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; core::mem::size_of::<$typ>()];
                    bytes.copy_from_slice(buf);
                    <$typ>::from_le_bytes(bytes)
                }
            }
        )+
    };
}

impl_memory_value_le!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl MemoryValue for bool {
    const SIZE: usize = 1;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = u8::from(*self);
    }

    fn decode(buf: &[u8]) -> Self {
        buf[0] != 0
    }
}

impl<const N: usize> MemoryValue for [u8; N] {
    const SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(buf);
        bytes
    }
}

/// Common interface of the SRAM and EEPROM.
///
/// Offsets are relative to the start of the memory. A transfer that would run
/// past [`Memory::length`] fails with [`Mcp79410Error::OutOfRange`] before any
/// bus traffic.
pub trait Memory {
    /// Error type of the underlying bus.
    type BusError;

    /// Size of the memory in bytes.
    fn length(&self) -> usize;

    /// Value every byte holds after [`Memory::erase`].
    fn erase_value(&self) -> u8;

    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the range does not fit, or the bus error.
    fn read_data(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Mcp79410Error<Self::BusError>>;

    /// Writes `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the range does not fit, or the bus error.
    fn write_data(&mut self, offset: usize, data: &[u8])
        -> Result<(), Mcp79410Error<Self::BusError>>;

    /// Fills the whole memory with [`Memory::erase_value`].
    ///
    /// # Errors
    ///
    /// Returns the first bus error; the memory is then partially erased.
    fn erase(&mut self) -> Result<(), Mcp79410Error<Self::BusError>> {
        let chunk = [self.erase_value(); ERASE_CHUNK];
        let length = self.length();
        let mut offset = 0;
        while offset < length {
            let count = ERASE_CHUNK.min(length - offset);
            self.write_data(offset, &chunk[..count])?;
            offset += count;
        }
        Ok(())
    }

    /// Reads a typed value stored at `offset`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the value does not fit, or the bus error.
    fn get<T: MemoryValue>(&mut self, offset: usize) -> Result<T, Mcp79410Error<Self::BusError>> {
        let mut buf = [0u8; MAX_VALUE_SIZE];
        let bytes = buf.get_mut(..T::SIZE).ok_or(Mcp79410Error::OutOfRange)?;
        self.read_data(offset, bytes)?;
        Ok(T::decode(bytes))
    }

    /// Stores a typed value at `offset`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the value does not fit, or the bus error.
    fn put<T: MemoryValue>(
        &mut self,
        offset: usize,
        value: &T,
    ) -> Result<(), Mcp79410Error<Self::BusError>> {
        let mut buf = [0u8; MAX_VALUE_SIZE];
        let bytes = buf.get_mut(..T::SIZE).ok_or(Mcp79410Error::OutOfRange)?;
        value.encode(bytes);
        self.write_data(offset, bytes)
    }
}

/// The 64 byte battery backed SRAM. Erased to 0x00.
pub struct Sram<'a, I2C> {
    transport: &'a mut Transport<I2C>,
}

impl<'a, I2C: I2c> Sram<'a, I2C> {
    pub(crate) fn new(transport: &'a mut Transport<I2C>) -> Self {
        Self { transport }
    }

    fn register(offset: usize) -> u8 {
        // offset has been range checked against SRAM_LENGTH
        RegAddr::Sram as u8 + offset as u8
    }
}

impl<I2C: I2c> Memory for Sram<'_, I2C> {
    type BusError = I2C::Error;

    fn length(&self) -> usize {
        SRAM_LENGTH
    }

    fn erase_value(&self) -> u8 {
        0x00
    }

    fn read_data(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Mcp79410Error<Self::BusError>> {
        check_range(offset, buf.len(), SRAM_LENGTH)?;
        self.transport
            .read(RTC_ADDRESS, Self::register(offset), buf)?;
        Ok(())
    }

    fn write_data(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Mcp79410Error<Self::BusError>> {
        check_range(offset, data.len(), SRAM_LENGTH)?;
        self.transport
            .write(RTC_ADDRESS, Self::register(offset), data)?;
        Ok(())
    }
}

/// The 128 byte EEPROM plus its 8 byte protected block. Erased to 0xFF.
///
/// Every byte written is followed by a write completion poll, so large writes are slow.
pub struct Eeprom<'a, I2C> {
    transport: &'a mut Transport<I2C>,
    protected_block_write: bool,
}

impl<'a, I2C: I2c> Eeprom<'a, I2C> {
    pub(crate) fn new(transport: &'a mut Transport<I2C>, protected_block_write: bool) -> Self {
        Self {
            transport,
            protected_block_write,
        }
    }

    /// Reads the block write protection level.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn block_protection(&mut self) -> Result<BlockProtection, Mcp79410Error<I2C::Error>> {
        let mut data = [0];
        self.transport
            .read(EEPROM_ADDRESS, EEPROM_STATUS, &mut data)?;
        Ok(EepromStatus::from(data[0]).block_protection())
    }

    /// Sets the block write protection level. Protected bytes ignore writes.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn set_block_protection(
        &mut self,
        level: BlockProtection,
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        let mut status = EepromStatus::default();
        status.set_block_protection(level);
        self.transport
            .write(EEPROM_ADDRESS, EEPROM_STATUS, &[status.into()])?;
        self.transport.wait_for_eeprom();
        Ok(())
    }

    /// Reads the 8 byte protected block.
    ///
    /// # Errors
    ///
    /// Returns the bus error.
    pub fn protected_block_read(
        &mut self,
        buf: &mut [u8; EEPROM_PROTECTED_BLOCK_SIZE],
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        self.transport
            .read(EEPROM_ADDRESS, EEPROM_PROTECTED_BLOCK, buf)?;
        Ok(())
    }

    /// Writes the 8 byte protected block.
    ///
    /// Only available when [`crate::Config::protected_block_write`] is set. The
    /// unlock sequence and the block are sent back to back, the block as one
    /// transaction.
    ///
    /// # Errors
    ///
    /// `ProtectedWriteDisabled` if not enabled, or the bus error.
    pub fn protected_block_write(
        &mut self,
        data: &[u8; EEPROM_PROTECTED_BLOCK_SIZE],
    ) -> Result<(), Mcp79410Error<I2C::Error>> {
        if !self.protected_block_write {
            return Err(Mcp79410Error::ProtectedWriteDisabled);
        }
        for value in EEPROM_UNLOCK_SEQUENCE {
            self.transport
                .write_register(RegAddr::EeUnlock as u8, value)?;
        }
        self.transport
            .write(EEPROM_ADDRESS, EEPROM_PROTECTED_BLOCK, data)?;
        self.transport.wait_for_eeprom();
        Ok(())
    }
}

impl<I2C: I2c> Memory for Eeprom<'_, I2C> {
    type BusError = I2C::Error;

    fn length(&self) -> usize {
        EEPROM_LENGTH
    }

    fn erase_value(&self) -> u8 {
        0xFF
    }

    fn read_data(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Mcp79410Error<Self::BusError>> {
        check_range(offset, buf.len(), EEPROM_LENGTH)?;
        // offset < 128 after the range check
        self.transport.read(EEPROM_ADDRESS, offset as u8, buf)?;
        Ok(())
    }

    fn write_data(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Mcp79410Error<Self::BusError>> {
        check_range(offset, data.len(), EEPROM_LENGTH)?;
        self.transport.write_eeprom(offset as u8, data)?;
        Ok(())
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

    fn eeprom_byte_write(register: u8, value: u8) -> [I2cTrans; 2] {
        [
            I2cTrans::write(EEPROM_ADDRESS, vec![register, value]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
        ]
    }

    #[test]
    fn test_memory_value_encoding() {
        let mut buf = [0u8; 4];
        0x1234_5678u32.encode(&mut buf);
        assert_eq!(buf, [0x78, 0x56, 0x34, 0x12]);
        assert_eq!(u32::decode(&buf), 0x1234_5678);

        let mut buf = [0u8; 2];
        (-2i16).encode(&mut buf);
        assert_eq!(buf, [0xFE, 0xFF]);

        let mut buf = [0u8; 4];
        1.5f32.encode(&mut buf);
        assert_eq!(f32::decode(&buf), 1.5);

        assert!(bool::decode(&[0x01]));
        assert!(!bool::decode(&[0x00]));
        assert_eq!(<[u8; 3]>::decode(&[1, 2, 3]), [1, 2, 3]);
        assert_eq!(<[u8; 3] as MemoryValue>::SIZE, 3);
    }

    #[test]
    fn test_lengths_and_erase_values() {
        let mut transport = setup_mock(&[]);
        {
            let sram = Sram::new(&mut transport);
            assert_eq!(sram.length(), 64);
            assert_eq!(sram.erase_value(), 0x00);
        }
        {
            let eeprom = Eeprom::new(&mut transport, false);
            assert_eq!(eeprom.length(), 128);
            assert_eq!(eeprom.erase_value(), 0xFF);
        }
        transport.i2c.done();
    }

    #[test]
    fn test_sram_read_write() {
        let mut transport = setup_mock(&[
            I2cTrans::write(RTC_ADDRESS, vec![0x28, 0xAA, 0xBB]),
            I2cTrans::write_read(RTC_ADDRESS, vec![0x28], vec![0xAA, 0xBB]),
        ]);
        let mut sram = Sram::new(&mut transport);
        sram.write_data(8, &[0xAA, 0xBB]).unwrap();
        let mut buf = [0u8; 2];
        sram.read_data(8, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB]);
        transport.i2c.done();
    }

    #[test]
    fn test_sram_out_of_range_issues_no_io() {
        let mut transport = setup_mock(&[]);
        let mut sram = Sram::new(&mut transport);
        let mut buf = [0u8; 4];
        assert_eq!(
            sram.read_data(61, &mut buf),
            Err(Mcp79410Error::OutOfRange)
        );
        assert_eq!(
            sram.write_data(64, &[0x01]),
            Err(Mcp79410Error::OutOfRange)
        );
        assert_eq!(
            sram.write_data(usize::MAX, &[0x01]),
            Err(Mcp79410Error::OutOfRange)
        );
        assert_eq!(sram.get::<u64>(60), Err(Mcp79410Error::OutOfRange));
        // empty range at the end fits
        assert_eq!(sram.read_data(64, &mut []), Ok(()));
        transport.i2c.done();
    }

    #[test]
    fn test_sram_last_byte() {
        let mut transport = setup_mock(&[
            I2cTrans::write(RTC_ADDRESS, vec![0x5F, 0x7E]),
            I2cTrans::write_read(RTC_ADDRESS, vec![0x5F], vec![0x7E]),
        ]);
        let mut sram = Sram::new(&mut transport);
        sram.write_data(63, &[0x7E]).unwrap();
        let mut buf = [0u8; 1];
        sram.read_data(63, &mut buf).unwrap();
        assert_eq!(buf, [0x7E]);
        assert_eq!(
            sram.read_data(64, &mut buf),
            Err(Mcp79410Error::OutOfRange)
        );
        transport.i2c.done();
    }

    #[test]
    fn test_sram_read_full_block() {
        let data: Vec<u8> = (0..64).collect();
        let mut transport = setup_mock(&[
            I2cTrans::write_read(RTC_ADDRESS, vec![0x20], data[..32].to_vec()),
            I2cTrans::write_read(RTC_ADDRESS, vec![0x40], data[32..].to_vec()),
        ]);
        let mut sram = Sram::new(&mut transport);
        let mut buf = [0u8; 64];
        sram.read_data(0, &mut buf).unwrap();
        assert_eq!(buf.as_slice(), data.as_slice());
        transport.i2c.done();
    }

    #[test]
    fn test_sram_erase() {
        let expectations: Vec<I2cTrans> = (0..4u8)
            .map(|i| {
                let mut bytes = vec![0x20 + i * 16];
                bytes.extend([0x00u8; 16]);
                I2cTrans::write(RTC_ADDRESS, bytes)
            })
            .collect();
        let mut transport = setup_mock(&expectations);
        Sram::new(&mut transport).erase().unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_sram_erase_stops_on_error() {
        let mut first = vec![0x20];
        first.extend([0x00u8; 16]);
        let mut second = vec![0x30];
        second.extend([0x00u8; 16]);
        let mut transport = setup_mock(&[
            I2cTrans::write(RTC_ADDRESS, first),
            I2cTrans::write(RTC_ADDRESS, second).with_error(ErrorKind::Other),
        ]);
        assert_eq!(
            Sram::new(&mut transport).erase(),
            Err(Mcp79410Error::I2c(ErrorKind::Other))
        );
        transport.i2c.done();
    }

    #[test]
    fn test_sram_get_put() {
        let mut transport = setup_mock(&[
            I2cTrans::write(RTC_ADDRESS, vec![0x24, 0x78, 0x56, 0x34, 0x12]),
            I2cTrans::write_read(RTC_ADDRESS, vec![0x24], vec![0x78, 0x56, 0x34, 0x12]),
            I2cTrans::write(RTC_ADDRESS, vec![0x5F, 0x01]),
        ]);
        let mut sram = Sram::new(&mut transport);
        sram.put(4, &0x1234_5678u32).unwrap();
        assert_eq!(sram.get::<u32>(4).unwrap(), 0x1234_5678);
        sram.put(63, &true).unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_eeprom_write_is_byte_at_a_time() {
        let mut expectations = Vec::new();
        expectations.extend(eeprom_byte_write(0x7E, 0x01));
        expectations.extend(eeprom_byte_write(0x7F, 0x02));
        let mut transport = setup_mock(&expectations);
        let mut eeprom = Eeprom::new(&mut transport, false);
        eeprom.write_data(0x7E, &[0x01, 0x02]).unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_eeprom_out_of_range_issues_no_io() {
        let mut transport = setup_mock(&[]);
        let mut eeprom = Eeprom::new(&mut transport, false);
        assert_eq!(
            eeprom.write_data(0x7F, &[0x01, 0x02]),
            Err(Mcp79410Error::OutOfRange)
        );
        let mut buf = [0u8; 129];
        assert_eq!(
            eeprom.read_data(0, &mut buf),
            Err(Mcp79410Error::OutOfRange)
        );
        assert_eq!(
            eeprom.get::<[u8; 129]>(0),
            Err(Mcp79410Error::OutOfRange)
        );
        transport.i2c.done();
    }

    #[test]
    fn test_eeprom_erase() {
        let mut expectations = Vec::new();
        for register in 0..128u8 {
            expectations.extend(eeprom_byte_write(register, 0xFF));
        }
        let mut transport = setup_mock(&expectations);
        Eeprom::new(&mut transport, false).erase().unwrap();
        transport.i2c.done();
    }

    #[test]
    fn test_eeprom_get_put() {
        let mut expectations = Vec::new();
        expectations.extend(eeprom_byte_write(0x10, 0x34));
        expectations.extend(eeprom_byte_write(0x11, 0x12));
        expectations.push(I2cTrans::write_read(
            EEPROM_ADDRESS,
            vec![0x10],
            vec![0x34, 0x12],
        ));
        let mut transport = setup_mock(&expectations);
        let mut eeprom = Eeprom::new(&mut transport, false);
        eeprom.put(0x10, &0x1234u16).unwrap();
        assert_eq!(eeprom.get::<u16>(0x10).unwrap(), 0x1234);
        transport.i2c.done();
    }

    #[test]
    fn test_eeprom_block_protection() {
        let mut transport = setup_mock(&[
            I2cTrans::write(EEPROM_ADDRESS, vec![0xFF, 0x0C]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
            I2cTrans::write_read(EEPROM_ADDRESS, vec![0xFF], vec![0x0C]),
            I2cTrans::write(EEPROM_ADDRESS, vec![0xFF, 0x00]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
            I2cTrans::write_read(EEPROM_ADDRESS, vec![0xFF], vec![0x00]),
        ]);
        let mut eeprom = Eeprom::new(&mut transport, false);
        eeprom.set_block_protection(BlockProtection::All).unwrap();
        assert_eq!(eeprom.block_protection().unwrap(), BlockProtection::All);
        eeprom.set_block_protection(BlockProtection::None).unwrap();
        assert_eq!(eeprom.block_protection().unwrap(), BlockProtection::None);
        transport.i2c.done();
    }

    #[test]
    fn test_protected_block_read() {
        let mut transport = setup_mock(&[I2cTrans::write_read(
            EEPROM_ADDRESS,
            vec![0xF0],
            vec![1, 2, 3, 4, 5, 6, 7, 8],
        )]);
        let mut eeprom = Eeprom::new(&mut transport, false);
        let mut buf = [0u8; 8];
        eeprom.protected_block_read(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        transport.i2c.done();
    }

    #[test]
    fn test_protected_block_write_disabled() {
        let mut transport = setup_mock(&[]);
        let mut eeprom = Eeprom::new(&mut transport, false);
        assert_eq!(
            eeprom.protected_block_write(&[0; 8]),
            Err(Mcp79410Error::ProtectedWriteDisabled)
        );
        transport.i2c.done();
    }

    #[test]
    fn test_protected_block_write_unlocks_then_writes_once() {
        let mut transport = setup_mock(&[
            I2cTrans::write(RTC_ADDRESS, vec![0x09, 0x55]),
            I2cTrans::write(RTC_ADDRESS, vec![0x09, 0xAA]),
            I2cTrans::write(EEPROM_ADDRESS, vec![0xF0, 8, 7, 6, 5, 4, 3, 2, 1]),
            I2cTrans::write(EEPROM_ADDRESS, vec![]),
        ]);
        let mut eeprom = Eeprom::new(&mut transport, true);
        eeprom
            .protected_block_write(&[8, 7, 6, 5, 4, 3, 2, 1])
            .unwrap();
        transport.i2c.done();
    }
}

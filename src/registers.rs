//! Register definitions and bitfield structures for the MCP79410 RTC.
//!
//! This module contains the bus addresses, register addresses, bitfield
//! definitions and small enumerations used to talk to the MCP79410 time
//! keeping registers, alarm registers and EEPROM status byte.

use bitfield::bitfield;

/// 7-bit bus address of the time keeping registers and SRAM.
pub const RTC_ADDRESS: u8 = 0x6F;

/// 7-bit bus address of the EEPROM.
pub const EEPROM_ADDRESS: u8 = 0x57;

/// EEPROM address of the 8-byte protected block.
pub const EEPROM_PROTECTED_BLOCK: u8 = 0xF0;

/// Size of the protected EEPROM block in bytes.
pub const EEPROM_PROTECTED_BLOCK_SIZE: usize = 8;

/// EEPROM address of the block protection status byte.
pub const EEPROM_STATUS: u8 = 0xFF;

/// Values written to [`RegAddr::EeUnlock`], in this order, before a protected block write.
pub const EEPROM_UNLOCK_SEQUENCE: [u8; 2] = [0x55, 0xAA];

/// Register addresses for the MCP79410 RTC.
#[allow(unused)]
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegAddr {
    /// Seconds register with oscillator start bit
    Seconds = 0x00,
    /// Minutes register (0-59)
    Minutes = 0x01,
    /// Hours register (1-12 + AM/PM or 0-23)
    Hours = 0x02,
    /// Day of week register with oscillator, power fail and battery bits
    Weekday = 0x03,
    /// Date register (1-31)
    Date = 0x04,
    /// Month register (1-12) with leap year bit
    Month = 0x05,
    /// Year register (0-99)
    Year = 0x06,
    /// Control register
    Control = 0x07,
    /// Oscillator digital trim register
    OscTrim = 0x08,
    /// Protected EEPROM block unlock register
    EeUnlock = 0x09,
    /// First register of the alarm 0 block
    Alarm0 = 0x0A,
    /// First register of the alarm 1 block
    Alarm1 = 0x11,
    /// First register of the power-down time stamp
    PowerDown = 0x18,
    /// First register of the power-up time stamp
    PowerUp = 0x1C,
    /// First byte of the 64-byte SRAM
    Sram = 0x20,
}

/// Time representation format stored in the hours register.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeRepresentation {
    /// 24-hour format (0-23)
    TwentyFourHour = 0,
    /// 12-hour format (1-12 + AM/PM)
    TwelveHour = 1,
}
impl From<u8> for TimeRepresentation {
    /// Creates a `TimeRepresentation` from the single 12/24 bit.
    fn from(v: u8) -> Self {
        if v & 0x01 == 0 {
            TimeRepresentation::TwentyFourHour
        } else {
            TimeRepresentation::TwelveHour
        }
    }
}
impl From<TimeRepresentation> for u8 {
    /// Converts a `TimeRepresentation` to its raw register value.
    fn from(v: TimeRepresentation) -> Self {
        v as u8
    }
}

/// Square wave output frequency on the MFP pin.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SquareWaveFrequency {
    /// 1 Hz, affected by digital trimming
    Hz1 = 0b00,
    /// 4.096 kHz, affected by digital trimming
    Hz4096 = 0b01,
    /// 8.192 kHz, affected by digital trimming
    Hz8192 = 0b10,
    /// 32.768 kHz, the raw crystal output
    Hz32768 = 0b11,
}
impl From<u8> for SquareWaveFrequency {
    /// Creates a `SquareWaveFrequency` from the two SQWFS bits.
    fn from(v: u8) -> Self {
        match v & 0b11 {
            0b00 => SquareWaveFrequency::Hz1,
            0b01 => SquareWaveFrequency::Hz4096,
            0b10 => SquareWaveFrequency::Hz8192,
            _ => SquareWaveFrequency::Hz32768,
        }
    }
}
impl From<SquareWaveFrequency> for u8 {
    /// Converts a `SquareWaveFrequency` to its raw register value.
    fn from(v: SquareWaveFrequency) -> Self {
        v as u8
    }
}

/// Alarm output polarity (ALMPOL).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// MFP falls when the alarm matches
    ActiveLow = 0,
    /// MFP rises when the alarm matches
    #[default]
    ActiveHigh = 1,
}
impl From<u8> for Polarity {
    fn from(v: u8) -> Self {
        if v & 0x01 == 0 {
            Polarity::ActiveLow
        } else {
            Polarity::ActiveHigh
        }
    }
}
impl From<Polarity> for u8 {
    fn from(v: Polarity) -> Self {
        v as u8
    }
}

/// EEPROM block write protection, applied to the top of the 128-byte array.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockProtection {
    /// All bytes writable
    #[default]
    None = 0b00,
    /// 0x60-0x7F protected
    UpperQuarter = 0b01,
    /// 0x40-0x7F protected
    UpperHalf = 0b10,
    /// 0x00-0x7F protected
    All = 0b11,
}
impl From<u8> for BlockProtection {
    /// Creates a `BlockProtection` from the two BP bits.
    fn from(v: u8) -> Self {
        match v & 0b11 {
            0b00 => BlockProtection::None,
            0b01 => BlockProtection::UpperQuarter,
            0b10 => BlockProtection::UpperHalf,
            _ => BlockProtection::All,
        }
    }
}
impl From<BlockProtection> for u8 {
    fn from(v: BlockProtection) -> Self {
        v as u8
    }
}

// This macro generates the From<u8> and Into<u8> implementations for the
// register type
macro_rules! from_register_u8 {
    ($typ:ty) => {
        impl From<u8> for $typ {
            fn from(v: u8) -> Self {
                paste::paste!([< $typ >](v))
            }
        }
        impl From<$typ> for u8 {
            fn from(v: $typ) -> Self {
                v.0
            }
        }
    };
}

bitfield! {
    /// RTCSEC: seconds (0-59) in BCD with the oscillator start bit.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Seconds(u8);
    impl Debug;
    /// Oscillator start bit (ST), 1 = run
    pub start_oscillator, set_start_oscillator: 7;
    /// Packed BCD seconds
    pub bcd, set_bcd: 6, 0;
}
from_register_u8!(Seconds);

impl Seconds {
    /// ST bit mask.
    pub const START_OSCILLATOR: u8 = 0x80;
}

bitfield! {
    /// RTCMIN: minutes (0-59) in BCD.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Minutes(u8);
    impl Debug;
    /// Packed BCD minutes
    pub bcd, set_bcd: 6, 0;
}
from_register_u8!(Minutes);

bitfield! {
    /// RTCHOUR: hours with 12/24 format selection and BCD encoding.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Hours(u8);
    impl Debug;
    /// Time representation format (12/24 hour)
    pub from into TimeRepresentation, time_representation, set_time_representation: 6, 6;
    /// PM flag, only meaningful in 12-hour format
    pub pm, set_pm: 5;
    /// Packed BCD hours in 24-hour format
    pub bcd_twenty_four, set_bcd_twenty_four: 5, 0;
    /// Packed BCD hours in 12-hour format
    pub bcd_twelve, set_bcd_twelve: 4, 0;
}
from_register_u8!(Hours);

bitfield! {
    /// RTCWKDAY: day of week (1-7) plus oscillator, power fail and battery status.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Weekday(u8);
    impl Debug;
    /// Oscillator running (OSCRUN), read only
    pub oscillator_running, set_oscillator_running: 5;
    /// Power failure time stamps captured (PWRFAIL)
    pub power_fail, set_power_fail: 4;
    /// Backup battery enabled (VBATEN)
    pub battery_enable, set_battery_enable: 3;
    /// Day of week (1-7)
    pub weekday, set_weekday: 2, 0;
}
from_register_u8!(Weekday);

impl Weekday {
    /// PWRFAIL bit mask.
    pub const POWER_FAIL: u8 = 0x10;
    /// VBATEN bit mask.
    pub const BATTERY_ENABLE: u8 = 0x08;
}

bitfield! {
    /// RTCDATE: day of month (1-31) in BCD.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Date(u8);
    impl Debug;
    /// Packed BCD day of month
    pub bcd, set_bcd: 5, 0;
}
from_register_u8!(Date);

bitfield! {
    /// RTCMTH: month (1-12) in BCD with the leap year flag.
    ///
    /// The power fail time stamps reuse this layout with the day of week in bits 7-5.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Month(u8);
    impl Debug;
    /// Leap year (LPYR), read only
    pub leap_year, set_leap_year: 5;
    /// Packed BCD month
    pub bcd, set_bcd: 4, 0;
}
from_register_u8!(Month);

bitfield! {
    /// RTCYEAR: year (0-99) in BCD.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Year(u8);
    impl Debug;
    /// Packed BCD year
    pub bcd, set_bcd: 7, 0;
}
from_register_u8!(Year);

bitfield! {
    /// CONTROL register.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Control(u8);
    impl Debug;
    /// MFP level when neither square wave nor alarms are enabled
    pub output, set_output: 7;
    /// Square wave output enable (SQWEN)
    pub square_wave_enable, set_square_wave_enable: 6;
    /// Alarm 1 enable (ALM1EN)
    pub alarm1_enable, set_alarm1_enable: 5;
    /// Alarm 0 enable (ALM0EN)
    pub alarm0_enable, set_alarm0_enable: 4;
    /// External oscillator input (EXTOSC)
    pub external_oscillator, set_external_oscillator: 3;
    /// Coarse trim mode (CRSTRIM)
    pub coarse_trim, set_coarse_trim: 2;
    /// Square wave frequency select (SQWFS)
    pub from into SquareWaveFrequency, square_wave_frequency, set_square_wave_frequency: 1, 0;
}
from_register_u8!(Control);

impl Control {
    /// SQWEN bit mask.
    pub const SQUARE_WAVE_ENABLE: u8 = 0x40;
    /// Bits cleared when entering square wave mode: both alarm enables and SQWFS.
    pub const SQUARE_WAVE_CLEAR_MASK: u8 = 0b0011_0011;
}

bitfield! {
    /// OSCTRIM: sign-magnitude digital trim value.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct OscTrim(u8);
    impl Debug;
    /// Sign bit, 1 = add clock cycles, 0 = subtract
    pub add, set_add: 7;
    /// Trim magnitude (0-127)
    pub magnitude, set_magnitude: 6, 0;
}
from_register_u8!(OscTrim);

impl OscTrim {
    /// Encodes a signed trim value. The magnitude saturates at 127.
    #[must_use]
    pub fn from_signed(trim: i8) -> Self {
        let mut value = OscTrim::default();
        value.set_add(trim >= 0);
        value.set_magnitude(trim.unsigned_abs().min(0x7F));
        value
    }

    /// Decodes the register back into a signed trim value.
    #[must_use]
    pub fn to_signed(self) -> i8 {
        // magnitude is 7 bits wide so the cast cannot overflow
        let magnitude = self.magnitude() as i8;
        if self.add() {
            magnitude
        } else {
            -magnitude
        }
    }
}

bitfield! {
    /// ALMxWKDAY: alarm day of week with polarity, match mode and interrupt flag.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct AlarmWeekday(u8);
    impl Debug;
    /// Alarm output polarity (ALMPOL)
    pub from into Polarity, polarity, set_polarity: 7, 7;
    /// Alarm match mode (ALMxMSK)
    pub mask, set_mask: 6, 4;
    /// Alarm interrupt flag (ALMxIF)
    pub interrupt_flag, set_interrupt_flag: 3;
    /// Day of week (1-7)
    pub weekday, set_weekday: 2, 0;
}
from_register_u8!(AlarmWeekday);

impl AlarmWeekday {
    /// ALMxIF bit mask.
    pub const INTERRUPT_FLAG: u8 = 0x08;
}

bitfield! {
    /// EEPROM status byte holding the block protection bits.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct EepromStatus(u8);
    impl Debug;
    /// Block protection level (BP1:BP0)
    pub from into BlockProtection, block_protection, set_block_protection: 3, 2;
}
from_register_u8!(EepromStatus);

#[cfg(feature = "defmt")]
impl defmt::Format for Weekday {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Weekday({}", self.weekday());
        if self.oscillator_running() {
            defmt::write!(f, ", OSCRUN");
        }
        if self.power_fail() {
            defmt::write!(f, ", PWRFAIL");
        }
        if self.battery_enable() {
            defmt::write!(f, ", VBATEN");
        }
        defmt::write!(f, ")");
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Control {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Control(");
        if self.square_wave_enable() {
            defmt::write!(f, "SQWEN {}", self.square_wave_frequency());
        } else {
            defmt::write!(f, "ALM0EN={} ALM1EN={}", self.alarm0_enable(), self.alarm1_enable());
        }
        defmt::write!(f, ")");
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AlarmWeekday {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "AlarmWeekday(day {}, mask {}, {}",
            self.weekday(),
            self.mask(),
            self.polarity()
        );
        if self.interrupt_flag() {
            defmt::write!(f, ", ALMIF");
        }
        defmt::write!(f, ")");
    }
}

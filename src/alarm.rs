//! Alarm configuration and register conversion for the MCP79410 RTC.
//!
//! The MCP79410 has two identical alarm units. Each one occupies a six byte
//! register window (seconds, minutes, hours, weekday, date, month) and has an
//! enable bit in the control register. The weekday byte also carries the
//! output polarity, the match mode and the interrupt flag.
//!
//! [`AlarmRegisters`] converts between a [`RawTime`] plus [`Polarity`] and that
//! six byte window.

use crate::datetime::RawTime;
use crate::registers::{AlarmWeekday, Date, Hours, Minutes, Month, Polarity, RegAddr, Seconds};

/// Offset of the weekday/polarity/mode/flag byte within an alarm window.
pub const ALARM_WEEKDAY_OFFSET: u8 = 3;

/// Size of an alarm register window in bytes.
pub const ALARM_REGISTER_COUNT: usize = 6;

/// Errors that can occur while addressing or decoding an alarm.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmError {
    /// The alarm slot index is not 0 or 1
    InvalidSlot(u8),
    /// The alarm mask bits hold a reserved value
    InvalidMode(u8),
}

/// One of the two alarm units.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmSlot {
    /// Alarm 0, registers 0x0A-0x0F
    Zero,
    /// Alarm 1, registers 0x11-0x16
    One,
}

impl AlarmSlot {
    /// First register of this slot's window.
    #[must_use]
    pub fn base(self) -> u8 {
        match self {
            AlarmSlot::Zero => RegAddr::Alarm0 as u8,
            AlarmSlot::One => RegAddr::Alarm1 as u8,
        }
    }

    /// Register holding polarity, mode, interrupt flag and weekday.
    #[must_use]
    pub fn weekday_register(self) -> u8 {
        self.base() + ALARM_WEEKDAY_OFFSET
    }

    /// Enable bit of this slot in the control register.
    #[must_use]
    pub fn enable_mask(self) -> u8 {
        match self {
            AlarmSlot::Zero => 0x10,
            AlarmSlot::One => 0x20,
        }
    }
}

impl TryFrom<u8> for AlarmSlot {
    type Error = AlarmError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AlarmSlot::Zero),
            1 => Ok(AlarmSlot::One),
            _ => Err(AlarmError::InvalidSlot(value)),
        }
    }
}

/// Which fields the alarm compare hardware evaluates.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmMode {
    /// Seconds match
    #[default]
    Second = 0,
    /// Minutes match
    Minute = 1,
    /// Hours match
    Hour = 2,
    /// Day of week match
    DayOfWeek = 3,
    /// Day of month match
    DayOfMonth = 4,
    /// Seconds, minutes, hours, day of week, date and month all match
    Full = 7,
}

impl TryFrom<u8> for AlarmMode {
    type Error = AlarmError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AlarmMode::Second),
            1 => Ok(AlarmMode::Minute),
            2 => Ok(AlarmMode::Hour),
            3 => Ok(AlarmMode::DayOfWeek),
            4 => Ok(AlarmMode::DayOfMonth),
            7 => Ok(AlarmMode::Full),
            _ => Err(AlarmError::InvalidMode(value)),
        }
    }
}

impl From<AlarmMode> for u8 {
    fn from(v: AlarmMode) -> Self {
        v as u8
    }
}

/// The six byte register window of one alarm unit.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct AlarmRegisters {
    seconds: Seconds,
    minutes: Minutes,
    hours: Hours,
    weekday: AlarmWeekday,
    date: Date,
    month: Month,
}

impl AlarmRegisters {
    /// Builds the window from a time value. The interrupt flag is always written as clear.
    pub(crate) fn from_time(time: &RawTime, polarity: Polarity) -> Self {
        let mut seconds = time.seconds;
        seconds.set_start_oscillator(false);

        let mut weekday = AlarmWeekday::default();
        weekday.set_weekday(time.weekday.weekday());
        weekday.set_mask(u8::from(time.alarm_mode));
        weekday.set_polarity(polarity);

        AlarmRegisters {
            seconds,
            minutes: Minutes::from(time.minutes.bcd()),
            hours: time.hours,
            weekday,
            date: Date::from(time.date.bcd()),
            month: Month::from(time.month.bcd()),
        }
    }

    /// Decodes the window back into a time value. The year is left cleared.
    pub(crate) fn to_time(self) -> Result<RawTime, AlarmError> {
        let mut time = RawTime::default();
        time.seconds = self.seconds;
        time.minutes = self.minutes;
        time.hours = self.hours;
        time.weekday.set_weekday(self.weekday.weekday());
        time.date = self.date;
        time.month = self.month;
        time.alarm_mode = AlarmMode::try_from(self.weekday.mask())?;
        Ok(time)
    }

    pub(crate) fn polarity(&self) -> Polarity {
        self.weekday.polarity()
    }
}

impl From<[u8; ALARM_REGISTER_COUNT]> for AlarmRegisters {
    fn from(data: [u8; ALARM_REGISTER_COUNT]) -> Self {
        AlarmRegisters {
            seconds: Seconds::from(data[0]),
            minutes: Minutes::from(data[1]),
            hours: Hours::from(data[2]),
            weekday: AlarmWeekday::from(data[3]),
            date: Date::from(data[4]),
            month: Month::from(data[5]),
        }
    }
}

impl From<&AlarmRegisters> for [u8; ALARM_REGISTER_COUNT] {
    fn from(regs: &AlarmRegisters) -> [u8; ALARM_REGISTER_COUNT] {
        [
            u8::from(regs.seconds),
            u8::from(regs.minutes),
            u8::from(regs.hours),
            u8::from(regs.weekday),
            u8::from(regs.date),
            u8::from(regs.month),
        ]
    }
}

//! BCD codec and time value for the MCP79410 RTC.
//!
//! [`RawTime`] keeps a calendar time in the chip's own packed BCD register
//! layout. The accessors mask out the format and status bits that share those
//! bytes, and convert to and from Unix seconds or chrono `NaiveDateTime`.
//!
//! # Register Model
//!
//! The MCP79410 stores date and time in 7 consecutive registers:
//! - Seconds, Minutes, Hours, Weekday, Date, Month, Year
//!
//! Only years 2000-2099 are representable. The weekday register is numbered
//! 1 (Sunday) to 7 (Saturday); the public accessors use 0-6.
//!
//! # Error Handling
//!
//! Conversion errors are reported via [`DateTimeError`].

use core::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::alarm::AlarmMode;
use crate::fmt::{debug, warn};
use crate::registers::{Date, Hours, Minutes, Month, Seconds, TimeRepresentation, Weekday, Year};

/// Number of time keeping registers, seconds through year.
pub const TIME_REGISTER_COUNT: usize = 7;

/// Converts a packed BCD byte to its integer value.
///
/// Nibbles above 9 are not rejected; they are weighted the same way as valid digits.
#[must_use]
pub fn bcd_to_int(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

/// Converts an integer to a packed BCD byte. Only the last two decimal digits are kept.
#[must_use]
pub fn int_to_bcd(value: u8) -> u8 {
    (((value / 10) % 10) << 4) | (value % 10)
}

fn field_to_bcd(value: u32) -> u8 {
    // value % 100 always fits
    int_to_bcd(u8::try_from(value % 100).unwrap_or_default())
}

/// Errors that can occur during date/time conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DateTimeError {
    /// The Unix timestamp cannot be broken down into a calendar date
    InvalidTimestamp,
    /// The register content is not a valid calendar date and time
    InvalidDateTime,
}

/// A calendar time in the MCP79410's packed BCD register layout.
///
/// The same value is used for RTC time, alarm time and power fail time
/// stamps. For alarms `alarm_mode` selects which fields the hardware compares.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RawTime {
    pub(crate) seconds: Seconds,
    pub(crate) minutes: Minutes,
    pub(crate) hours: Hours,
    pub(crate) weekday: Weekday,
    pub(crate) date: Date,
    pub(crate) month: Month,
    pub(crate) year: Year,
    pub(crate) alarm_mode: AlarmMode,
}

impl Default for RawTime {
    /// The cleared value: year absent, January 1st, weekday Sunday, midnight.
    fn default() -> Self {
        RawTime {
            seconds: Seconds::default(),
            minutes: Minutes::default(),
            hours: Hours::default(),
            weekday: Weekday::from(0x01),
            date: Date::from(0x01),
            month: Month::from(0x01),
            year: Year::default(),
            alarm_mode: AlarmMode::Second,
        }
    }
}

impl RawTime {
    /// Resets every field to the cleared value.
    pub fn clear(&mut self) {
        *self = RawTime::default();
    }

    /// Creates a time value from Unix seconds (UTC).
    ///
    /// # Errors
    ///
    /// Returns [`DateTimeError::InvalidTimestamp`] if chrono cannot represent the timestamp.
    pub fn from_unix_time(time: i64) -> Result<Self, DateTimeError> {
        let datetime =
            DateTime::from_timestamp(time, 0).ok_or(DateTimeError::InvalidTimestamp)?;
        Ok(Self::from_datetime(&datetime.naive_utc()))
    }

    /// Creates a time value from a chrono `NaiveDateTime` taken as UTC.
    ///
    /// Years outside 2000-2099 lose their century.
    #[must_use]
    pub fn from_datetime(datetime: &NaiveDateTime) -> Self {
        let year = datetime.year();
        if !(2000..=2099).contains(&year) {
            warn!("year {} outside 2000-2099, century is dropped", year);
        }

        let mut raw = RawTime::default();
        raw.set_year(year.rem_euclid(100).unsigned_abs());
        raw.set_month(datetime.month());
        raw.set_day_of_month(datetime.day());
        raw.set_day_of_week(datetime.weekday().num_days_from_sunday());
        raw.set_hour(datetime.hour());
        raw.set_minute(datetime.minute());
        // leap seconds are reported as nanoseconds by chrono, never as second 60
        raw.set_second(datetime.second().min(59));

        debug!("raw={:?}", raw);

        raw
    }

    /// Converts to a chrono `NaiveDateTime`. The weekday field is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DateTimeError::InvalidDateTime`] if the fields do not form a real date and time.
    pub fn to_datetime(&self) -> Result<NaiveDateTime, DateTimeError> {
        let hour = self.hour();
        let minute = self.minute();
        let second = self.second();
        debug!(
            "raw_hour={:#x} h={} m={} s={}",
            u8::from(self.hours),
            hour,
            minute,
            second
        );

        NaiveDate::from_ymd_opt(self.year(), self.month(), self.day_of_month())
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or(DateTimeError::InvalidDateTime)
    }

    /// Converts to Unix seconds (UTC). The weekday field is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DateTimeError::InvalidDateTime`] if the fields do not form a real date and time.
    pub fn to_unix_time(&self) -> Result<i64, DateTimeError> {
        Ok(self.to_datetime()?.and_utc().timestamp())
    }

    /// Year, 2000-2099.
    #[must_use]
    pub fn year(&self) -> i32 {
        2000 + i32::from(bcd_to_int(self.year.bcd()))
    }

    /// Stores the last two digits of `value`.
    pub fn set_year(&mut self, value: u32) {
        self.year.set_bcd(field_to_bcd(value));
    }

    /// Month, 1-12. The leap year flag is not part of the value.
    #[must_use]
    pub fn month(&self) -> u32 {
        u32::from(bcd_to_int(self.month.bcd()))
    }

    pub fn set_month(&mut self, value: u32) {
        self.month = Month::from(field_to_bcd(value));
    }

    /// Day of month, 1-31.
    #[must_use]
    pub fn day_of_month(&self) -> u32 {
        u32::from(bcd_to_int(self.date.bcd()))
    }

    pub fn set_day_of_month(&mut self, value: u32) {
        self.date.set_bcd(field_to_bcd(value));
    }

    /// Day of week, 0 (Sunday) to 6 (Saturday).
    #[must_use]
    pub fn day_of_week(&self) -> u32 {
        u32::from(bcd_to_int(self.weekday.weekday())).saturating_sub(1)
    }

    /// Sets the day of week, 0 (Sunday) to 6 (Saturday). Status bits in the same byte are kept.
    pub fn set_day_of_week(&mut self, value: u32) {
        self.weekday.set_weekday(field_to_bcd(value.saturating_add(1)));
    }

    /// Hour in 24-hour format, decoding 12-hour register content if needed.
    #[must_use]
    pub fn hour(&self) -> u32 {
        match self.hours.time_representation() {
            TimeRepresentation::TwentyFourHour => {
                u32::from(bcd_to_int(self.hours.bcd_twenty_four()))
            }
            TimeRepresentation::TwelveHour => {
                let hour = u32::from(bcd_to_int(self.hours.bcd_twelve()));
                match (hour, self.hours.pm()) {
                    (12, false) => 0,    // 12 AM = 0:xx
                    (12, true) => 12,    // 12 PM = 12:xx
                    (h, false) => h,     // 1-11 AM = 1-11:xx
                    (h, true) => h + 12, // 1-11 PM = 13-23:xx
                }
            }
        }
    }

    /// Sets the hour (0-23). The register is always written in 24-hour format.
    pub fn set_hour(&mut self, value: u32) {
        self.hours = Hours::from(field_to_bcd(value));
    }

    /// Minute, 0-59.
    #[must_use]
    pub fn minute(&self) -> u32 {
        u32::from(bcd_to_int(self.minutes.bcd()))
    }

    pub fn set_minute(&mut self, value: u32) {
        self.minutes = Minutes::from(field_to_bcd(value));
    }

    /// Second, 0-59. The oscillator start bit is not part of the value.
    #[must_use]
    pub fn second(&self) -> u32 {
        u32::from(bcd_to_int(self.seconds.bcd()))
    }

    /// Sets the second. The oscillator start bit is kept.
    pub fn set_second(&mut self, value: u32) {
        self.seconds.set_bcd(field_to_bcd(value));
    }

    /// Which fields an alarm built from this value compares.
    #[must_use]
    pub fn alarm_mode(&self) -> AlarmMode {
        self.alarm_mode
    }

    pub fn set_alarm_mode(&mut self, mode: AlarmMode) {
        self.alarm_mode = mode;
    }

    /// Clears the value and configures an alarm matching only the second.
    pub fn set_alarm_second(&mut self, second: u32) {
        self.clear();
        self.alarm_mode = AlarmMode::Second;
        self.set_second(second);
    }

    /// Clears the value and configures an alarm matching only the minute.
    pub fn set_alarm_minute(&mut self, minute: u32) {
        self.clear();
        self.alarm_mode = AlarmMode::Minute;
        self.set_minute(minute);
    }

    /// Clears the value and configures an alarm matching only the hour (0-23).
    pub fn set_alarm_hour(&mut self, hour: u32) {
        self.clear();
        self.alarm_mode = AlarmMode::Hour;
        self.set_hour(hour);
    }

    /// Clears the value and configures an alarm matching only the day of week (0-6).
    pub fn set_alarm_day_of_week(&mut self, day_of_week: u32) {
        self.clear();
        self.alarm_mode = AlarmMode::DayOfWeek;
        self.set_day_of_week(day_of_week);
    }

    /// Clears the value and configures an alarm matching only the day of month.
    pub fn set_alarm_day_of_month(&mut self, day_of_month: u32) {
        self.clear();
        self.alarm_mode = AlarmMode::DayOfMonth;
        self.set_day_of_month(day_of_month);
    }

    /// Configures an alarm matching month, day, weekday, hour, minute and second
    /// of the given Unix time.
    ///
    /// # Errors
    ///
    /// Returns [`DateTimeError::InvalidTimestamp`] if chrono cannot represent the timestamp.
    pub fn set_alarm_time(&mut self, time: i64) -> Result<(), DateTimeError> {
        *self = Self::from_unix_time(time)?;
        self.alarm_mode = AlarmMode::Full;
        Ok(())
    }

    /// Oscillator running status, only meaningful for a value read from the RTC.
    #[must_use]
    pub fn oscillator_running(&self) -> bool {
        self.weekday.oscillator_running()
    }

    /// An RTC time is valid when the year is set and the oscillator is running.
    pub(crate) fn is_valid_rtc_time(&self) -> bool {
        u8::from(self.year) != 0 && self.weekday.oscillator_running()
    }

    /// Prepares the value for writing to the time keeping registers.
    pub(crate) fn prepare_rtc_write(&mut self, battery_enable: bool) {
        self.seconds.set_start_oscillator(true);
        self.weekday.set_battery_enable(battery_enable);
    }

    /// Builds a value from the four byte power fail time stamp
    /// (minute, hour, date, weekday/month). Second and year are left cleared.
    pub(crate) fn from_power_fail(data: [u8; 4]) -> Self {
        let mut raw = RawTime::default();
        raw.minutes = Minutes::from(data[0]);
        raw.hours = Hours::from(data[1]);
        raw.date = Date::from(data[2]);
        let month = Month::from(data[3]);
        raw.month = Month::from(month.bcd());
        raw.weekday.set_weekday(data[3] >> 5);
        raw
    }
}

impl From<[u8; TIME_REGISTER_COUNT]> for RawTime {
    fn from(data: [u8; TIME_REGISTER_COUNT]) -> Self {
        RawTime {
            seconds: Seconds::from(data[0]),
            minutes: Minutes::from(data[1]),
            hours: Hours::from(data[2]),
            weekday: Weekday::from(data[3]),
            date: Date::from(data[4]),
            month: Month::from(data[5]),
            year: Year::from(data[6]),
            alarm_mode: AlarmMode::Second,
        }
    }
}

impl From<&RawTime> for [u8; TIME_REGISTER_COUNT] {
    fn from(raw: &RawTime) -> [u8; TIME_REGISTER_COUNT] {
        [
            u8::from(raw.seconds),
            u8::from(raw.minutes),
            u8::from(raw.hours),
            u8::from(raw.weekday),
            u8::from(raw.date),
            u8::from(raw.month),
            u8::from(raw.year),
        ]
    }
}

impl fmt::Display for RawTime {
    /// Renders the raw register bytes, as read from or written to the chip.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year={:02x} month={:02x} dayOfMonth={:02x} dayOfWeek={:02x} hour={:02x} minute={:02x} second={:02x} mode={}",
            u8::from(self.year),
            u8::from(self.month),
            u8::from(self.date),
            u8::from(self.weekday),
            u8::from(self.hours),
            u8::from(self.minutes),
            u8::from(self.seconds),
            u8::from(self.alarm_mode),
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RawTime {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "RawTime({=u8:#x} {=u8:#x} {=u8:#x} {=u8:#x} {=u8:#x} {=u8:#x} {=u8:#x} {})",
            u8::from(self.year),
            u8::from(self.month),
            u8::from(self.date),
            u8::from(self.weekday),
            u8::from(self.hours),
            u8::from(self.minutes),
            u8::from(self.seconds),
            self.alarm_mode,
        );
    }
}

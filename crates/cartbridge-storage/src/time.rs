use chrono::{Datelike, Timelike};

/// A FAT-packed date/time pair: two-second granularity, epoch 1980.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

impl DosDateTime {
    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    pub fn from_parts(year: u16, month: u16, day: u16, hour: u16, minute: u16, second: u16) -> Self {
        Self {
            date: (year.saturating_sub(1980) << 9) | (month << 5) | day,
            time: (hour << 11) | (minute << 5) | (second / 2),
        }
    }

    /// Current wall-clock time, clamped into the representable range.
    pub fn now() -> Self {
        let now = chrono::Local::now().naive_local();
        Self::from_parts(
            (now.year().clamp(1980, 2107)) as u16,
            now.month() as u16,
            now.day() as u16,
            now.hour() as u16,
            now.minute() as u16,
            now.second() as u16,
        )
    }

    pub fn year(&self) -> u16 {
        (self.date >> 9) + 1980
    }

    pub fn month(&self) -> u16 {
        (self.date >> 5) & 0x0F
    }

    pub fn day(&self) -> u16 {
        self.date & 0x1F
    }

    pub fn hour(&self) -> u16 {
        self.time >> 11
    }

    pub fn minute(&self) -> u16 {
        (self.time >> 5) & 0x3F
    }

    pub fn second(&self) -> u16 {
        (self.time & 0x1F) * 2
    }
}

impl core::fmt::Debug for DosDateTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:02}/{:02}/{:04} {:02}:{:02}:{:02}",
            self.month(),
            self.day(),
            self.year(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

impl From<chrono::NaiveDateTime> for DosDateTime {
    fn from(dt: chrono::NaiveDateTime) -> Self {
        Self::from_parts(
            dt.year().clamp(1980, 2107) as u16,
            dt.month() as u16,
            dt.day() as u16,
            dt.hour() as u16,
            dt.minute() as u16,
            dt.second() as u16,
        )
    }
}

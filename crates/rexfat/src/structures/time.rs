/// exFAT packed timestamp
///
/// A single u32 holding calendar date and time of day at two-second
/// granularity. The file entry pairs the create and modify stamps with a
/// separate 10ms increment byte for finer precision; that byte is kept
/// next to this value in the decoded entry, not inside it.
///
/// Bit layout, low to high: double-seconds (5), minute (6), hour (5),
/// day (5), month (4), year since 1980 (7).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ExfatTimestamp {
    raw: u32,
}

impl ExfatTimestamp {
    pub fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn second(&self) -> u32 {
        (self.raw & 0x1F) * 2
    }

    pub fn minute(&self) -> u32 {
        (self.raw >> 5) & 0x3F
    }

    pub fn hour(&self) -> u32 {
        (self.raw >> 11) & 0x1F
    }

    pub fn day(&self) -> u32 {
        (self.raw >> 16) & 0x1F
    }

    pub fn month(&self) -> u32 {
        (self.raw >> 21) & 0x0F
    }

    pub fn year(&self) -> u32 {
        ((self.raw >> 25) & 0x7F) + 1980
    }

    /// Packs calendar fields. Seconds round down to the two-second
    /// granularity the format stores.
    #[cfg(feature = "write")]
    pub fn from_parts(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        debug_assert!((1980..2108).contains(&year));
        debug_assert!((1..=12).contains(&month));
        debug_assert!((1..=31).contains(&day));
        debug_assert!(hour < 24 && minute < 60 && second < 60);
        let raw = (second / 2)
            | (minute << 5)
            | (hour << 11)
            | (day << 16)
            | (month << 21)
            | ((year - 1980) << 25);
        Self { raw }
    }
}

impl core::fmt::Debug for ExfatTimestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // MM/DD/YYYY HH:MM:SS
        f.debug_tuple("ExfatTimestamp")
            .field(&format_args!(
                "{:02}/{:02}/{:04} {:02}:{:02}:{:02}",
                self.month(),
                self.day(),
                self.year(),
                self.hour(),
                self.minute(),
                self.second()
            ))
            .finish()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decodes_bit_fields() {
        // 2021-05-01 12:34:56
        let raw = (56u32 / 2) | (34 << 5) | (12 << 11) | (1 << 16) | (5 << 21) | (41 << 25);
        let time = ExfatTimestamp::from_raw(raw);
        assert_eq!(time.year(), 2021);
        assert_eq!(time.month(), 5);
        assert_eq!(time.day(), 1);
        assert_eq!(time.hour(), 12);
        assert_eq!(time.minute(), 34);
        assert_eq!(time.second(), 56);
    }

    #[cfg(feature = "write")]
    #[test]
    fn test_from_parts_round_trips() {
        let time = ExfatTimestamp::from_parts(1980, 1, 1, 0, 0, 0);
        assert_eq!(time.year(), 1980);
        assert_eq!(time.raw() & 0xFFFF_FFE0, 1 << 16 | 1 << 21);

        let time = ExfatTimestamp::from_parts(2107, 12, 31, 23, 59, 59);
        assert_eq!(time.year(), 2107);
        assert_eq!(time.month(), 12);
        assert_eq!(time.day(), 31);
        assert_eq!(time.hour(), 23);
        assert_eq!(time.minute(), 59);
        // Odd seconds round down
        assert_eq!(time.second(), 58);
    }

    #[test]
    fn test_debug_format() {
        let raw = (0u32) | (7 << 5) | (9 << 11) | (15 << 16) | (3 << 21) | (44 << 25);
        let rendered = format!("{:?}", ExfatTimestamp::from_raw(raw));
        assert_eq!(rendered, "ExfatTimestamp(03/15/2024 09:07:00)");
    }
}

/*!
 # Day-of-week selection for daily timers

 Active days are stored as an 8-bit mask in `0bSMTWTFS0` order: Sunday in
 bit 7 down to Saturday in bit 1. Bit 0 is reserved for the Sunday
 wraparound: the evaluator folds Sunday into it so that a window crossing
 midnight out of Saturday can place its off edge on Sunday.
*/

/// Named day-set templates for timer schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySet {
    /// Sundays only (0b1000_0000)
    Sundays,
    /// Mondays only (0b0100_0000)
    Mondays,
    /// Tuesdays only (0b0010_0000)
    Tuesdays,
    /// Wednesdays only (0b0001_0000)
    Wednesdays,
    /// Thursdays only (0b0000_1000)
    Thursdays,
    /// Fridays only (0b0000_0100)
    Fridays,
    /// Saturdays only (0b0000_0010)
    Saturdays,
    /// Monday through Friday (0b0111_1100)
    Weekdays,
    /// Saturday and Sunday (0b1000_0010)
    Weekends,
    /// All seven days (0b1111_1110)
    EveryDay,
}

impl DaySet {
    /// Returns the bitmask value for this template.
    pub const fn mask(self) -> u8 {
        match self {
            DaySet::Sundays => 0b1000_0000,
            DaySet::Mondays => 0b0100_0000,
            DaySet::Tuesdays => 0b0010_0000,
            DaySet::Wednesdays => 0b0001_0000,
            DaySet::Thursdays => 0b0000_1000,
            DaySet::Fridays => 0b0000_0100,
            DaySet::Saturdays => 0b0000_0010,
            DaySet::Weekdays => 0b0111_1100,
            DaySet::Weekends => 0b1000_0010,
            DaySet::EveryDay => 0b1111_1110,
        }
    }
}

impl From<DaySet> for u8 {
    fn from(days: DaySet) -> u8 {
        days.mask()
    }
}

/// Single-bit indicator for a weekday, numbered 1=Sunday through 7=Saturday
/// (chrono's `number_from_sunday` convention). Sunday is additionally folded
/// into bit 0 so off masks derived from a Saturday window still match it.
pub fn day_bits(number_from_sunday: u32) -> u8 {
    let bit = 1u8 << (8 - number_from_sunday.clamp(1, 7));
    if bit & DaySet::Sundays.mask() != 0 {
        bit | 0b0000_0001
    } else {
        bit
    }
}

use std::fmt;

pub const RESERVE_FLAG_MAINT: u16 = 0x0001;
pub const RESERVE_FLAG_NO_MAINT: u16 = 0x0002;
pub const RESERVE_FLAG_DAILY: u16 = 0x0004;
pub const RESERVE_FLAG_NO_DAILY: u16 = 0x0008;
pub const RESERVE_FLAG_WEEKLY: u16 = 0x0010;
pub const RESERVE_FLAG_NO_WEEKLY: u16 = 0x0020;

/// Modifiers stored on a reservation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReservationFlags {
    pub maint: bool,
    pub daily: bool,
    pub weekly: bool,
}

impl ReservationFlags {
    pub fn to_bits(&self) -> u16 {
        let mut bits = 0;
        if self.maint {
            bits |= RESERVE_FLAG_MAINT;
        }
        if self.daily {
            bits |= RESERVE_FLAG_DAILY;
        }
        if self.weekly {
            bits |= RESERVE_FLAG_WEEKLY;
        }
        bits
    }

    /// Only the set bits are meaningful on a stored reservation, clear bits are ignored.
    pub fn from_bits(bits: u16) -> Self {
        ReservationFlags { maint: bits & RESERVE_FLAG_MAINT != 0, daily: bits & RESERVE_FLAG_DAILY != 0, weekly: bits & RESERVE_FLAG_WEEKLY != 0 }
    }
}

impl fmt::Display for ReservationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.maint {
            names.push("MAINT");
        }
        if self.daily {
            names.push("DAILY");
        }
        if self.weekly {
            names.push("WEEKLY");
        }
        write!(f, "{}", names.join(","))
    }
}

/// Requested change of one modifier in an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlagUpdate {
    #[default]
    Unchanged,
    Set,
    Clear,
}

impl FlagUpdate {
    fn apply(self, flag: &mut bool) {
        match self {
            FlagUpdate::Unchanged => {}
            FlagUpdate::Set => *flag = true,
            FlagUpdate::Clear => *flag = false,
        }
    }

    fn from_pair(bits: u16, set: u16, clear: u16) -> Self {
        if bits & clear != 0 {
            FlagUpdate::Clear
        } else if bits & set != 0 {
            FlagUpdate::Set
        } else {
            FlagUpdate::Unchanged
        }
    }
}

/// Independent tri-state change per modifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagsUpdate {
    pub maint: FlagUpdate,
    pub daily: FlagUpdate,
    pub weekly: FlagUpdate,
}

impl FlagsUpdate {
    pub fn apply(&self, flags: &mut ReservationFlags) {
        self.maint.apply(&mut flags.maint);
        self.daily.apply(&mut flags.daily);
        self.weekly.apply(&mut flags.weekly);
    }

    pub fn is_empty(&self) -> bool {
        *self == FlagsUpdate::default()
    }

    /// Decodes a wire bitmask carrying set and clear bits. Clear wins when both are present.
    pub fn from_bits(bits: u16) -> Self {
        FlagsUpdate {
            maint: FlagUpdate::from_pair(bits, RESERVE_FLAG_MAINT, RESERVE_FLAG_NO_MAINT),
            daily: FlagUpdate::from_pair(bits, RESERVE_FLAG_DAILY, RESERVE_FLAG_NO_DAILY),
            weekly: FlagUpdate::from_pair(bits, RESERVE_FLAG_WEEKLY, RESERVE_FLAG_NO_WEEKLY),
        }
    }
}

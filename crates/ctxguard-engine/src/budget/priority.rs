use std::fmt;

/// Eviction priority of a registration.
///
/// Higher values are more important and less eligible for eviction. Values are
/// bounded to `MIN..=MAX`; construction clamps anything outside that range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(0);
    pub const MAX: Priority = Priority(10);

    /// Creates a priority, clamping `value` into `MIN..=MAX`.
    pub fn new(value: i32) -> Self {
        let clamped = value.clamp(Self::MIN.0 as i32, Self::MAX.0 as i32);
        if clamped != value {
            log::warn!("priority {value} out of range, clamped to {clamped}");
        }
        Priority(clamped as u8)
    }

    /// Creates a priority if `value` is within range.
    pub fn checked(value: i32) -> Option<Self> {
        if (Self::MIN.0 as i32..=Self::MAX.0 as i32).contains(&value) {
            Some(Priority(value as u8))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(5)
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority::new(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

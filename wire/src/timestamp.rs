use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds per second; the exclusive upper bound of `Timestamp::nanos`.
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A point in time as seconds and nanoseconds relative to the Unix epoch.
/// The default value, the epoch itself, is the zero value on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Timestamp { seconds, nanos }
    }

    pub const fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }

    /// Converts to a `SystemTime`, or `None` when the platform cannot
    /// represent the instant.
    pub fn to_system_time(&self) -> Option<SystemTime> {
        let nanos = Duration::from_nanos(u64::from(self.nanos));
        if self.seconds >= 0 {
            UNIX_EPOCH
                .checked_add(Duration::from_secs(self.seconds as u64))?
                .checked_add(nanos)
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(self.seconds.unsigned_abs()))?
                .checked_add(nanos)
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Timestamp::new(d.as_secs() as i64, d.subsec_nanos()),
            Err(e) => {
                let d = e.duration();
                let mut seconds = -(d.as_secs() as i64);
                let mut nanos = d.subsec_nanos();
                if nanos != 0 {
                    seconds -= 1;
                    nanos = NANOS_PER_SEC - nanos;
                }
                Timestamp::new(seconds, nanos)
            }
        }
    }
}

#[test]
fn system_time_conversion() {
    let cases = [
        Timestamp::new(0, 0),
        Timestamp::new(1_500_000_000, 123_456_789),
        Timestamp::new(-1, 999_999_999),
        Timestamp::new(-86_400, 0),
    ];
    for ts in cases {
        let t = ts.to_system_time().unwrap();
        assert_eq!(Timestamp::from(t), ts);
    }
}

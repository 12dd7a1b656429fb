/// Turns a running byte count into integer percentages and drops repeats.
///
/// Only built for transfers with a known, non-zero total.
#[derive(Debug)]
pub struct ProgressThrottle {
    total: u64,
    // -1 so the very first report (0%) always goes out
    last: i16,
}

impl ProgressThrottle {
    pub fn new(total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        Some(Self { total, last: -1 })
    }

    /// Percentage for `transferred`, or `None` if it equals the last one returned.
    pub fn report(&mut self, transferred: u64) -> Option<u8> {
        let pct = percentage(transferred, self.total);
        if i16::from(pct) == self.last {
            return None;
        }
        self.last = i16::from(pct);
        Some(pct)
    }
}

fn percentage(transferred: u64, total: u64) -> u8 {
    // u128 keeps `transferred * 100` exact for any u64 byte count
    let pct = (u128::from(transferred) * 100) / u128::from(total);
    pct.min(100) as u8
}

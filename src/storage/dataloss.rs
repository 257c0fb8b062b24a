use crate::core::COUNTER_MODULUS;

/// Detects frames missing from a wrapping counter sequence
#[derive(Debug, Clone, Default)]
pub struct DatalossTracker {
    last: Option<u8>,
    lost: u64,
    received: u64,
}

impl DatalossTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a counter value, returning how many frames were skipped before it
    pub fn record(&mut self, counter: u8) -> u64 {
        self.received += 1;
        let skipped = match self.last {
            Some(last) => {
                let expected = (last as u16 + 1) % COUNTER_MODULUS;
                ((counter as u16 + COUNTER_MODULUS - expected) % COUNTER_MODULUS) as u64
            }
            None => 0,
        };
        self.last = Some(counter);
        self.lost += skipped;
        skipped
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

use std::sync::atomic::{AtomicU16, Ordering};

/// Source of packet identifiers for outbound packets that need one.
///
/// Ids cycle through 1..=65535 and 0 is never issued. Each handler owns one
/// generator by default; share a single `Arc<PacketIdGenerator>` between handlers
/// to draw ids from one sequence.
#[derive(Debug, Default)]
pub struct PacketIdGenerator {
    counter: AtomicU16,
}

impl PacketIdGenerator {
    pub fn new() -> Self {
        PacketIdGenerator {
            counter: AtomicU16::new(0),
        }
    }

    /// Returns the next id. The counter holds `id - 1` and wraps modulo 65535.
    pub fn next_id(&self) -> u16 {
        let previous = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |counter| {
                Some(((counter as u32 + 1) % 65_535) as u16)
            })
            .unwrap_or_else(|counter| counter);
        previous + 1
    }
}

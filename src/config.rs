use crate::packet_id::PacketIdGenerator;
use crate::varint::MAX_REMAINING_LENGTH;
use std::sync::Arc;

/// Configuration for a packet handler.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub(crate) max_packet_size: usize,
    pub(crate) packet_ids: Option<Arc<PacketIdGenerator>>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig {
            max_packet_size: MAX_REMAINING_LENGTH,
            packet_ids: None,
        }
    }
}

impl HandlerConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        HandlerConfig::default()
    }

    /// Sets the largest frame body accepted or sent. Values above the protocol limit are clamped.
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size.min(MAX_REMAINING_LENGTH);
        self
    }

    /// Draws packet ids from a shared generator instead of a per-handler one.
    pub fn with_packet_ids(mut self, packet_ids: Arc<PacketIdGenerator>) -> Self {
        self.packet_ids = Some(packet_ids);
        self
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

//! Protocol-level constants both peers must agree on.

use std::time::Duration;

/// Size of one binary chunk on the peer channel (16 KiB).
///
/// Both peers must use the same value; the receiver trusts `totalChunks`
/// in `file-start` only as a hint and verifies by byte count.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Size tolerance accepted at `file-end` by legacy browser peers.
pub const LEGACY_INTEGRITY_TOLERANCE_BYTES: u64 = 1;

/// Delay between two binary chunks.
pub const DEFAULT_INTER_CHUNK_DELAY: Duration = Duration::from_millis(5);

/// Time a receiver waits for activity on an announced transfer before
/// declaring it incomplete.
pub const DEFAULT_INCOMPLETE_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for an offer/answer exchange.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Label of the single data channel carrying the transfer.
pub const DATA_CHANNEL_LABEL: &str = "file";

/// Relay path that upgrades to a WebSocket.
pub const RELAY_WS_PATH: &str = "/ws";

/// Relay path that allocates a new room.
pub const RELAY_CREATE_ROOM_PATH: &str = "/create-room";

/// Query parameter carrying the room id on the relay WebSocket URL.
pub const RELAY_ROOM_PARAM: &str = "room";

/// Maximum signaling message size accepted from the relay (1 MiB).
pub const RELAY_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Interval between keepalive pings on the relay connection.
pub const RELAY_PING_PERIOD: Duration = Duration::from_secs(30);

/// Silence on the relay connection longer than this is a dead connection.
pub const RELAY_PONG_WAIT: Duration = Duration::from_secs(60);

/// Number of chunks needed to carry `size` bytes in `chunk_size` slices.
///
/// Saturates at `u32::MAX`; a zero `chunk_size` yields 0.
pub fn total_chunks(size: u64, chunk_size: usize) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    let chunks = size.div_ceil(chunk_size as u64);
    u32::try_from(chunks).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_chunks_rounds_up() {
        assert_eq!(total_chunks(50_000, CHUNK_SIZE), 4);
        assert_eq!(total_chunks(16_384, CHUNK_SIZE), 1);
        assert_eq!(total_chunks(16_385, CHUNK_SIZE), 2);
        assert_eq!(total_chunks(1, CHUNK_SIZE), 1);
        assert_eq!(total_chunks(0, CHUNK_SIZE), 0);
    }

    #[test]
    fn total_chunks_zero_chunk_size() {
        assert_eq!(total_chunks(100, 0), 0);
    }

    #[test]
    fn pong_wait_exceeds_ping_period() {
        assert!(RELAY_PONG_WAIT > RELAY_PING_PERIOD);
    }
}

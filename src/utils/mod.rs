//! # Utility Functions and Types
//!
//! Helpers shared by every stage of the transmuxer:
//!
//! - Bit-level reading of RBSP payloads
//! - CRC32 verification of PSI sections
//! - 90kHz clock conversions and timestamp rollover
//!
//! ## Bit Operations
//!
//! ```rust
//! use vdkmux::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! let value = reader.read_bits(3)?; // 101
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```
//!
//! ## Timestamps
//!
//! ```rust
//! use vdkmux::utils::clock::{handle_rollover, MAX_TS};
//!
//! // a pts just after the 33-bit wrap stays ahead of the previous one
//! assert_eq!(handle_rollover(10, MAX_TS - 10), MAX_TS + 10);
//! ```

/// Bit manipulation and bitstream reading utilities
pub mod bits;

/// 90kHz clock helpers
pub mod clock;

/// CRC calculation implementations
pub mod crc;

pub use bits::BitReader;
pub use crc::Crc32Mpeg2;

//! AAC audio in ADTS framing.

/// ADTS header field readers and parsing
pub mod parser;
/// PES payload to ADTS frame stage
pub mod stream;
/// ADTS header and frame types
pub mod types;

pub use parser::*;
pub use stream::AdtsStream;
pub use types::*;

//! plauder-protocol – Wire-Format des Gespraechskanals
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Client und
//! Gespraechsdienst ausgetauscht werden, die binaere (De-)Serialisierung
//! sowie die Byte-Reihenfolge-Normalisierung fuer Audio-Puffer.

pub mod endian;
pub mod message;
pub mod wire;

pub use endian::Endianness;
pub use message::{Ausgehend, Eingehend, KlientZustand};
pub use wire::FrameCodec;

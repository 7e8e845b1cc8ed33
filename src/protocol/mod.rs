//! Protocol Layer: Position-Independent Binary Encoding
//!
//! Prinsip desain:
//! - Flat Binary: root record di-copy apa adanya, referensi menyusul
//! - Self-Relative: pointer jadi delta dari slot-nya sendiri
//! - Two Pass: measure dulu, lalu tulis tepat sebanyak itu
//! - Mirrored Traversal: measure, encode, decode dan free mengunjungi field
//!   dengan urutan dan aturan per kind yang sama

mod decoder;
mod encoder;
mod measure;
mod rel;

pub use decoder::{decode, decode_raw, Decoded, Decoder};
pub use encoder::{encode, encode_into, encode_raw, encode_raw_into, Encoded, Encoder, MORE_NODES};
pub use measure::{measure, measure_raw};
pub use rel::{RelOffset, REL_SIZE};

//! Cerial - codec biner berbasis descriptor untuk object graph C-layout
//!
//! Arsitektur:
//! - Reflection: tabel descriptor `const` menjelaskan setiap tipe record
//! - Protocol: measure, encode, decode ke satu buffer yang relocatable
//! - Core: allocator yang di-inject, object list, mmap image store
//!
//! ```text
//! live graph ──measure──▶ size ──encode──▶ [root | strings | records | ...]
//!                                                     │ copy ke mana saja
//! heap graph ◀──decode──────────────────────────────────┘
//!     └──free_object / Drop──▶ allocator
//! ```

pub mod core;
pub mod error;
pub mod protocol;
pub mod reflect;

pub use error::{Error, Result};
pub use protocol::{decode, encode, encode_into, measure, Decoded, Encoded};
pub use reflect::{free_object, Field, Kind, Model, Reflect};

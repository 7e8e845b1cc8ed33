//! Error taxonomy
//!
//! Codec hanya mendeteksi satu kegagalan: allocator menolak request.
//! Model yang salah, buffer yang tidak cocok, dan graph yang cyclic adalah
//! precondition dari caller, tidak pernah dilaporkan di sini.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Allocator returned no memory
    #[error("allocator failed to provide {size} bytes")]
    AllocationFailure { size: usize },

    /// Image has no room left for the entry
    #[error("image full: {needed} bytes needed, {available} available")]
    ImageFull { needed: usize, available: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

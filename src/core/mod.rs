//! Core module: memory plumbing di bawah codec
//!
//! Prinsip desain:
//! - Injected Allocator: semua byte lewat satu pasang allocate/release
//! - Object List: linked list payload, sekaligus field kind `list`
//! - Mmap Image: encoded buffer disimpan dan dibaca langsung dari mapping

pub mod alloc;
mod image;
mod obj_list;

pub use alloc::{new_string, Allocator, System, Tracking};
pub use image::{Entries, Image};
pub use obj_list::{Iter, ObjList, ObjNode, NODE_SIZE};

//! Reflection Layer: descriptor model untuk record C-layout
//!
//! Prinsip desain:
//! - Model adalah tabel `const` biasa, ditulis sekali per tipe record
//! - Setiap algoritma dispatch berdasarkan [`Kind`], satu arm per kind
//! - Offset dari `offset_of!`, size dari `size_of`, tidak ada tebakan

mod free;
pub mod model;

use std::ptr;

pub use free::free_object;
pub use model::{align, fields, is_terminated, size_of, Field, Kind, Model, PTR_SIZE};

/// Binds a `#[repr(C)]` type to its descriptor model.
///
/// # Safety
/// `MODEL` must describe `Self` exactly: terminator size equal to
/// `size_of::<Self>()`, every pointer-shaped field (pointers, strings, lists)
/// listed at its real offset with the right kind. Fields missing from the
/// model are copied as raw bytes, which is unsound for pointers.
pub unsafe trait Reflect: Sized {
    const MODEL: Model;
}

#[inline(always)]
pub(crate) unsafe fn read_ptr(slot: *const u8) -> *mut u8 {
    ptr::read_unaligned(slot.cast::<*mut u8>())
}

#[inline(always)]
pub(crate) unsafe fn write_ptr(slot: *mut u8, value: *mut u8) {
    ptr::write_unaligned(slot.cast::<*mut u8>(), value)
}

#[inline(always)]
pub(crate) fn check_model<T: Reflect>() {
    debug_assert_eq!(
        size_of(T::MODEL),
        std::mem::size_of::<T>(),
        "model terminator does not match the record size"
    );
}

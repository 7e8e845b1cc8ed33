//! Position-Independent Encoder
//!
//! Dua pass di graph yang sama: measure, lalu tulis tepat sebanyak itu.
//! Root record di offset 0; semua yang dicapai lewat pointer, string atau
//! list di-append setelahnya, tiap region di-pad ke pointer width. Slot
//! berbentuk pointer berisi [`RelOffset`] dari slot ke datanya.
//!
//! Field list menunjuk ke array node record yang contiguous:
//! `[payload delta][continuation]`. Continuation bernilai `NODE_SIZE` jika
//! masih ada record berikutnya dan `0` di record terakhir. Ini flag, bukan
//! offset.

use std::ffi::CStr;
use std::fmt;
use std::mem::offset_of;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::slice;

use super::measure::measure_raw;
use super::rel::{write_word, RelOffset};
use crate::core::alloc::allocate;
use crate::core::{Allocator, ObjList, ObjNode, NODE_SIZE};
use crate::error::Result;
use crate::reflect::{align, check_model, fields, read_ptr, size_of, Kind, Model, Reflect};

/// Flag continuation di node record yang bukan terakhir
pub const MORE_NODES: usize = NODE_SIZE;

/// Writer di atas buffer yang ukurannya dari [`measure_raw`]
pub struct Encoder<'b> {
    buffer: &'b mut [u8],
}

impl<'b> Encoder<'b> {
    pub fn new(buffer: &'b mut [u8]) -> Self {
        Self { buffer }
    }

    /// Write the record at `src` into `slot` and append what it references
    /// at `cursor`. Returns the number of bytes appended.
    ///
    /// A record entered through a pointer has `slot == cursor`; its aligned
    /// flat prefix counts as appended.
    ///
    /// # Safety
    /// Same contract as [`measure_raw`], and the buffer must hold at least
    /// the measured size from `slot`/`cursor` on.
    pub unsafe fn write_object(
        &mut self,
        src: *const u8,
        slot: usize,
        mut cursor: usize,
        model: Model,
        by_pointer: bool,
    ) -> usize {
        let start = cursor;
        let size = size_of(model);

        let dst = &mut self.buffer[slot..slot + size];
        ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), size);

        if by_pointer {
            self.buffer[slot + size..slot + align(size)].fill(0);
            cursor += align(size);
        }

        for field in fields(model) {
            let from = src.add(field.offset);
            let at = slot + field.offset;
            tracing::trace!(field = field.label(), kind = ?field.kind, at, cursor, "encode");

            if field.is_pointer {
                cursor += self.write_pointer(read_ptr(from), at, cursor, field.sub());
                continue;
            }

            match field.kind {
                Kind::String => {
                    cursor += self.write_string(read_ptr(from), at, cursor);
                }
                Kind::Array => {
                    let sub = field.sub();
                    let item = size_of(sub);
                    for i in 0..field.size {
                        cursor +=
                            self.write_object(from.add(item * i), at + item * i, cursor, sub, false);
                    }
                }
                Kind::Struct => {
                    cursor += self.write_object(from, at, cursor, field.sub(), false);
                }
                Kind::List => {
                    cursor += self.write_list(&*from.cast::<ObjList>(), at, cursor, field.sub());
                }
                _ => {}
            }
        }

        cursor - start
    }

    unsafe fn write_pointer(
        &mut self,
        target: *const u8,
        at: usize,
        cursor: usize,
        model: Model,
    ) -> usize {
        if target.is_null() {
            RelOffset::NULL.write(self.buffer, at);
            return 0;
        }

        RelOffset::between(at, cursor).write(self.buffer, at);
        self.write_object(target, cursor, cursor, model, true)
    }

    unsafe fn write_string(&mut self, s: *const u8, at: usize, cursor: usize) -> usize {
        if s.is_null() {
            RelOffset::NULL.write(self.buffer, at);
            return 0;
        }

        let bytes = CStr::from_ptr(s.cast()).to_bytes_with_nul();
        let padded = align(bytes.len());

        RelOffset::between(at, cursor).write(self.buffer, at);
        self.buffer[cursor..cursor + bytes.len()].copy_from_slice(bytes);
        self.buffer[cursor + bytes.len()..cursor + padded].fill(0);
        padded
    }

    unsafe fn write_list(&mut self, list: &ObjList, at: usize, cursor: usize, model: Model) -> usize {
        let count = list.len();
        if count == 0 {
            RelOffset::NULL.write(self.buffer, at);
            return 0;
        }

        RelOffset::between(at, cursor).write(self.buffer, at);

        let records = cursor;
        let mut cursor = records + count * NODE_SIZE;

        for (i, node) in list.nodes().enumerate() {
            let record = records + i * NODE_SIZE;
            let obj_at = record + offset_of!(ObjNode, obj);
            let next_at = record + offset_of!(ObjNode, next);

            cursor += self.write_pointer(node.obj.cast(), obj_at, cursor, model);
            let more = if node.next.is_null() { 0 } else { MORE_NODES };
            write_word(self.buffer, next_at, more);
        }

        cursor - records
    }
}

/// Encoded buffer, dimiliki oleh allocator asalnya
pub struct Encoded<'a, A: Allocator + ?Sized> {
    ptr: NonNull<u8>,
    len: usize,
    alloc: &'a A,
}

impl<'a, A: Allocator + ?Sized> Encoded<'a, A> {
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        self
    }

    /// Give up ownership; release the pointer through the same allocator.
    pub fn into_raw(self) -> (NonNull<u8>, usize) {
        let raw = (self.ptr, self.len);
        std::mem::forget(self);
        raw
    }
}

impl<'a, A: Allocator + ?Sized> fmt::Debug for Encoded<'a, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoded")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<'a, A: Allocator + ?Sized> Deref for Encoded<'a, A> {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &[u8] {
        // SAFETY: ptr holds len initialized bytes for as long as self lives
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<'a, A: Allocator + ?Sized> Drop for Encoded<'a, A> {
    fn drop(&mut self) {
        // SAFETY: ptr came from alloc and is released exactly once
        unsafe { self.alloc.release(self.ptr) }
    }
}

/// Encode the graph at `obj` into a fresh zero-filled buffer from `alloc`.
///
/// # Safety
/// See [`measure_raw`].
pub unsafe fn encode_raw<'a, A: Allocator + ?Sized>(
    obj: *const u8,
    model: Model,
    alloc: &'a A,
) -> Result<Encoded<'a, A>> {
    let size = measure_raw(obj, model);
    let ptr = allocate(alloc, size)?;

    ptr::write_bytes(ptr.as_ptr(), 0, size);
    let buffer = slice::from_raw_parts_mut(ptr.as_ptr(), size);

    let written = Encoder::new(buffer).write_object(obj, 0, 0, model, true);
    debug_assert_eq!(written, size, "encoder and measure disagree");
    tracing::debug!(size, "encoded object");

    Ok(Encoded {
        ptr,
        len: size,
        alloc,
    })
}

/// Encode ke storage milik caller tanpa alokasi.
///
/// Returns panjang hasil encode, atau None jika `dst` terlalu kecil.
///
/// # Safety
/// See [`measure_raw`].
pub unsafe fn encode_raw_into(obj: *const u8, model: Model, dst: &mut [u8]) -> Option<usize> {
    let size = measure_raw(obj, model);
    let Some(buffer) = dst.get_mut(..size) else {
        tracing::debug!(size, available = dst.len(), "destination too small");
        return None;
    };

    let written = Encoder::new(buffer).write_object(obj, 0, 0, model, true);
    debug_assert_eq!(written, size, "encoder and measure disagree");
    Some(size)
}

/// Typed [`encode_raw`].
///
/// # Safety
/// Every pointer reachable from `obj` must be valid or null and the graph
/// acyclic.
pub unsafe fn encode<'a, T: Reflect, A: Allocator + ?Sized>(
    obj: &T,
    alloc: &'a A,
) -> Result<Encoded<'a, A>> {
    check_model::<T>();
    encode_raw((obj as *const T).cast(), T::MODEL, alloc)
}

/// Typed [`encode_raw_into`].
///
/// # Safety
/// As for [`encode`].
pub unsafe fn encode_into<T: Reflect>(obj: &T, dst: &mut [u8]) -> Option<usize> {
    check_model::<T>();
    encode_raw_into((obj as *const T).cast(), T::MODEL, dst)
}

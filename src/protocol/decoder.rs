//! Decoder: bangun ulang heap graph dari encoded buffer
//!
//! Kebalikan encoder. Delta di-resolve terhadap posisi slot di dalam
//! `buffer`, jadi slice bisa berada di mana saja (heap copy, mmap, flash).
//! Setiap record, string dan list node hasil decode berasal dari allocator
//! yang di-inject dan dimiliki oleh root.
//!
//! Jika alokasi gagal, error langsung dikembalikan; alokasi yang sudah
//! dibuat untuk graph parsial tidak di-reclaim.

use std::fmt;
use std::marker::PhantomData;
use std::mem::offset_of;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use super::rel::{read_word, RelOffset};
use crate::core::alloc::allocate;
use crate::core::{new_string, Allocator, ObjNode, NODE_SIZE};
use crate::error::Result;
use crate::reflect::{check_model, fields, free_object, size_of, write_ptr, Kind, Model, Reflect};

/// Reader untuk satu encoded buffer
pub struct Decoder<'b, A: Allocator + ?Sized> {
    buffer: &'b [u8],
    alloc: &'b A,
}

impl<'b, A: Allocator + ?Sized> Decoder<'b, A> {
    pub fn new(buffer: &'b [u8], alloc: &'b A) -> Self {
        Self { buffer, alloc }
    }

    /// Decode the record at `at` into `dest`, or into a fresh allocation
    /// when `dest` is `None` (records reached through a pointer).
    ///
    /// # Safety
    /// `model` must be well formed (offsets inside the record) and `dest`,
    /// when given, must hold `size_of(model)` writable bytes.
    pub unsafe fn read_object(
        &self,
        at: usize,
        model: Model,
        dest: Option<NonNull<u8>>,
    ) -> Result<NonNull<u8>> {
        let size = size_of(model);
        let src = &self.buffer[at..at + size];

        let obj = match dest {
            Some(dest) => dest,
            None => allocate(self.alloc, size)?,
        };
        ptr::copy_nonoverlapping(src.as_ptr(), obj.as_ptr(), size);

        let base = obj.as_ptr();
        for field in fields(model) {
            let pos = at + field.offset;
            let slot = base.add(field.offset);
            tracing::trace!(field = field.label(), kind = ?field.kind, pos, "decode");

            if field.is_pointer {
                let target = match RelOffset::read(self.buffer, pos).resolve(pos) {
                    Some(target) => self.read_object(target, field.sub(), None)?.as_ptr(),
                    None => ptr::null_mut(),
                };
                write_ptr(slot, target);
                continue;
            }

            match field.kind {
                Kind::String => {
                    let s = match RelOffset::read(self.buffer, pos).resolve(pos) {
                        Some(target) => self.read_string(target)?.as_ptr(),
                        None => ptr::null_mut(),
                    };
                    write_ptr(slot, s);
                }
                Kind::Array => {
                    let sub = field.sub();
                    let item = size_of(sub);
                    for i in 0..field.size {
                        let elem = NonNull::new_unchecked(slot.add(item * i));
                        self.read_object(pos + item * i, sub, Some(elem))?;
                    }
                }
                Kind::Struct => {
                    self.read_object(pos, field.sub(), Some(NonNull::new_unchecked(slot)))?;
                }
                Kind::List => {
                    self.read_list(pos, slot, field.sub())?;
                }
                _ => {}
            }
        }

        Ok(obj)
    }

    fn read_string(&self, at: usize) -> Result<NonNull<u8>> {
        let tail = &self.buffer[at..];
        let len = match tail.iter().position(|&b| b == 0) {
            Some(len) => len,
            None => panic!("unterminated string at offset {at}"),
        };
        Ok(new_string(&tail[..len], self.alloc)?.cast())
    }

    /// Rebuild the list whose head delta sits at `pos` into the head slot
    /// `slot`. Node records are contiguous; a zero continuation ends them.
    unsafe fn read_list(&self, pos: usize, slot: *mut u8, model: Model) -> Result<()> {
        let mut tail = slot.cast::<*mut ObjNode>();
        tail.write(ptr::null_mut());

        let Some(mut record) = RelOffset::read(self.buffer, pos).resolve(pos) else {
            return Ok(());
        };

        loop {
            let node = allocate(self.alloc, NODE_SIZE)?.cast::<ObjNode>();
            node.as_ptr().write(ObjNode {
                obj: ptr::null_mut(),
                next: ptr::null_mut(),
            });
            tail.write(node.as_ptr());
            tail = ptr::addr_of_mut!((*node.as_ptr()).next);

            let obj_at = record + offset_of!(ObjNode, obj);
            if let Some(payload) = RelOffset::read(self.buffer, obj_at).resolve(obj_at) {
                (*node.as_ptr()).obj = self.read_object(payload, model, None)?.as_ptr().cast();
            }

            if read_word(self.buffer, record + offset_of!(ObjNode, next)) == 0 {
                break;
            }
            record += NODE_SIZE;
        }

        Ok(())
    }
}

/// Decoded graph, otomatis deep-free saat di-drop
pub struct Decoded<'a, T: Reflect, A: Allocator + ?Sized> {
    ptr: NonNull<T>,
    alloc: &'a A,
    _owns: PhantomData<T>,
}

impl<'a, T: Reflect, A: Allocator + ?Sized> Decoded<'a, T, A> {
    /// Take over a graph produced by [`decode_raw`] with `T::MODEL`.
    ///
    /// # Safety
    /// `ptr` must be such a graph, allocated by `alloc`, and not owned
    /// elsewhere.
    pub unsafe fn from_raw(ptr: NonNull<T>, alloc: &'a A) -> Self {
        Self {
            ptr,
            alloc,
            _owns: PhantomData,
        }
    }

    /// Hand the graph back; the caller must eventually pass it to
    /// [`free_object`] with `T::MODEL` and the same allocator.
    pub fn into_raw(self) -> NonNull<T> {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }
}

impl<'a, T: Reflect, A: Allocator + ?Sized> fmt::Debug for Decoded<'a, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoded").field("ptr", &self.ptr).finish()
    }
}

impl<'a, T: Reflect, A: Allocator + ?Sized> Deref for Decoded<'a, T, A> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        // SAFETY: ptr is a live, fully decoded record owned by self
        unsafe { self.ptr.as_ref() }
    }
}

impl<'a, T: Reflect, A: Allocator + ?Sized> Drop for Decoded<'a, T, A> {
    fn drop(&mut self) {
        tracing::debug!("freeing decoded graph");
        // SAFETY: the graph was built by the decoder with T::MODEL and alloc
        unsafe { free_object(self.ptr.cast(), T::MODEL, true, self.alloc) }
    }
}

/// Decode `buffer` sebagai record yang dijelaskan `model`.
///
/// # Safety
/// `model` must be well formed. A buffer that was not produced with a
/// layout-compatible model yields garbage or panics on an out-of-range
/// offset.
pub unsafe fn decode_raw<A: Allocator + ?Sized>(
    buffer: &[u8],
    model: Model,
    alloc: &A,
) -> Result<NonNull<u8>> {
    let obj = Decoder::new(buffer, alloc).read_object(0, model, None)?;
    tracing::debug!(len = buffer.len(), "decoded object");
    Ok(obj)
}

/// Decode `buffer` into an owned `T`.
pub fn decode<'a, T: Reflect, A: Allocator + ?Sized>(
    buffer: &[u8],
    alloc: &'a A,
) -> Result<Decoded<'a, T, A>> {
    check_model::<T>();
    // SAFETY: Reflect guarantees T::MODEL describes T
    unsafe {
        let ptr = decode_raw(buffer, T::MODEL, alloc)?;
        Ok(Decoded::from_raw(ptr.cast(), alloc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObjList, Tracking};
    use crate::protocol::encode;
    use crate::reflect::Field;
    use std::ffi::{c_char, c_int, CStr};

    #[repr(C)]
    struct Named {
        name: *const c_char,
        id: c_int,
    }

    unsafe impl Reflect for Named {
        const MODEL: Model = &[
            Field::string("name", offset_of!(Named, name)),
            Field::int("id", offset_of!(Named, id)),
            Field::object::<Named>(),
        ];
    }

    #[repr(C)]
    struct Bag {
        tag: c_int,
        items: ObjList,
    }

    unsafe impl Reflect for Bag {
        const MODEL: Model = &[
            Field::int("tag", offset_of!(Bag, tag)),
            Field::list("items", offset_of!(Bag, items), Named::MODEL),
            Field::object::<Bag>(),
        ];
    }

    fn name_of(rec: &Named) -> &str {
        unsafe { CStr::from_ptr(rec.name) }.to_str().unwrap()
    }

    #[test]
    fn test_decode_string_record() {
        let alloc = Tracking::new();
        let rec = Named {
            name: c"hi".as_ptr(),
            id: 7,
        };
        let encoded = unsafe { encode(&rec, &alloc) }.unwrap();

        {
            let decoded = decode::<Named, _>(&encoded, &alloc).unwrap();
            assert_eq!(name_of(&decoded), "hi");
            assert_eq!(decoded.id, 7);
            assert_ne!(decoded.name, rec.name);
        }

        drop(encoded);
        assert_eq!(alloc.live(), 0);
        assert_eq!(alloc.invalid_releases(), 0);
    }

    #[test]
    fn test_decode_null_string() {
        let alloc = Tracking::new();
        let rec = Named {
            name: ptr::null(),
            id: -1,
        };
        let encoded = unsafe { encode(&rec, &alloc) }.unwrap();
        let decoded = decode::<Named, _>(&encoded, &alloc).unwrap();

        assert!(decoded.name.is_null());
        assert_eq!(decoded.id, -1);
    }

    #[test]
    fn test_decode_list() {
        let alloc = Tracking::new();
        let mut items = [
            Named {
                name: c"one".as_ptr(),
                id: 1,
            },
            Named {
                name: c"two".as_ptr(),
                id: 2,
            },
            Named {
                name: c"three".as_ptr(),
                id: 3,
            },
        ];
        let mut bag = Bag {
            tag: 9,
            items: ObjList::new(),
        };
        for item in items.iter_mut() {
            bag.items.push((item as *mut Named).cast(), &alloc).unwrap();
        }

        let encoded = unsafe { encode(&bag, &alloc) }.unwrap();
        let decoded = decode::<Bag, _>(&encoded, &alloc).unwrap();

        assert_eq!(decoded.tag, 9);
        let got: Vec<(String, c_int)> = decoded
            .items
            .iter()
            .map(|p| {
                let n = unsafe { &*p.cast::<Named>() };
                (name_of(n).to_owned(), n.id)
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("one".to_owned(), 1),
                ("two".to_owned(), 2),
                ("three".to_owned(), 3)
            ]
        );

        drop(decoded);
        drop(encoded);
        unsafe { bag.items.clear(&alloc) };
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_decode_empty_list() {
        let alloc = Tracking::new();
        let bag = Bag {
            tag: 1,
            items: ObjList::new(),
        };
        let encoded = unsafe { encode(&bag, &alloc) }.unwrap();
        let before = alloc.allocations();

        let decoded = decode::<Bag, _>(&encoded, &alloc).unwrap();
        assert!(decoded.items.is_empty());
        // only the root record
        assert_eq!(alloc.allocations() - before, 1);
    }

    #[test]
    fn test_decode_allocation_failure() {
        let alloc = Tracking::new();
        let rec = Named {
            name: c"x".as_ptr(),
            id: 0,
        };
        let encoded = unsafe { encode(&rec, &alloc) }.unwrap();

        // root succeeds, string copy fails
        let failing = Tracking::new().fail_after(1);
        let err = decode::<Named, _>(&encoded, &failing).unwrap_err();
        assert!(matches!(err, crate::Error::AllocationFailure { size: 2 }));
    }

    #[test]
    fn test_into_raw_and_free() {
        let alloc = Tracking::new();
        let rec = Named {
            name: c"raw".as_ptr(),
            id: 5,
        };
        let encoded = unsafe { encode(&rec, &alloc) }.unwrap();
        let raw = decode::<Named, _>(&encoded, &alloc).unwrap().into_raw();

        assert_eq!(unsafe { raw.as_ref() }.id, 5);
        let guard = unsafe { Decoded::<Named, _>::from_raw(raw, &alloc) };
        assert!(format!("{guard:?}").starts_with("Decoded"));
        let raw = guard.into_raw();
        unsafe { free_object(raw.cast(), Named::MODEL, true, &alloc) };

        drop(encoded);
        assert_eq!(alloc.live(), 0);
    }
}

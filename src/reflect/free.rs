//! Deep free
//!
//! Mengikuti bentuk alokasi decoder field per field: target pointer,
//! string, list node dan list payload di-release; array dan struct embedded
//! hanya ditelusuri, karena tinggal di dalam parent-nya.

use std::ptr::NonNull;

use super::model::{fields, size_of, Kind, Model};
use super::read_ptr;
use crate::core::{Allocator, ObjList};

/// Release everything `obj` owns according to `model`, then `obj` itself
/// when `owned` is set.
///
/// # Safety
/// `obj` must be a graph produced by the decoder with the same `model` and
/// `alloc` (or built by hand with the same ownership shape), and must not
/// be used afterwards.
pub unsafe fn free_object<A: Allocator + ?Sized>(
    obj: NonNull<u8>,
    model: Model,
    owned: bool,
    alloc: &A,
) {
    let base = obj.as_ptr();

    for field in fields(model) {
        let slot = base.add(field.offset);
        tracing::trace!(field = field.label(), kind = ?field.kind, "free");

        if field.is_pointer {
            if let Some(target) = NonNull::new(read_ptr(slot)) {
                free_object(target, field.sub(), true, alloc);
            }
            continue;
        }

        match field.kind {
            Kind::String => {
                if let Some(s) = NonNull::new(read_ptr(slot)) {
                    alloc.release(s);
                }
            }
            Kind::Array => {
                let sub = field.sub();
                let item = size_of(sub);
                for i in 0..field.size {
                    free_object(NonNull::new_unchecked(slot.add(item * i)), sub, false, alloc);
                }
            }
            Kind::Struct => {
                free_object(NonNull::new_unchecked(slot), field.sub(), false, alloc);
            }
            Kind::List => {
                let sub = field.sub();
                let list = &mut *slot.cast::<ObjList>();
                list.drain(alloc, |payload| {
                    if let Some(payload) = NonNull::new(payload.cast::<u8>()) {
                        free_object(payload, sub, true, alloc);
                    }
                });
            }
            _ => {}
        }
    }

    if owned {
        alloc.release(obj);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{new_string, Tracking};
    use crate::reflect::model::Field;
    use std::ffi::{c_char, c_int};
    use std::mem::{self, offset_of};
    use std::ptr;

    #[repr(C)]
    struct Leaf {
        label: *mut c_char,
        value: *mut c_int,
    }

    const LEAF: Model = &[
        Field::string("label", offset_of!(Leaf, label)),
        Field::int_ptr("value", offset_of!(Leaf, value)),
        Field::object::<Leaf>(),
    ];

    #[repr(C)]
    struct Tree {
        inline: [Leaf; 2],
        children: ObjList,
    }

    const TREE: Model = &[
        Field::array("inline", offset_of!(Tree, inline), 2, LEAF),
        Field::list("children", offset_of!(Tree, children), LEAF),
        Field::object::<Tree>(),
    ];

    unsafe fn leaf_into(dest: *mut Leaf, alloc: &Tracking, label: &str, value: c_int) {
        let v = alloc.allocate(mem::size_of::<c_int>()).unwrap().cast::<c_int>();
        v.as_ptr().write(value);
        dest.write(Leaf {
            label: new_string(label.as_bytes(), alloc).unwrap().as_ptr(),
            value: v.as_ptr(),
        });
    }

    #[test]
    fn test_free_releases_every_allocation() {
        let alloc = Tracking::new();

        unsafe {
            let tree = alloc
                .allocate(mem::size_of::<Tree>())
                .unwrap()
                .cast::<Tree>();
            let t = tree.as_ptr();
            leaf_into(ptr::addr_of_mut!((*t).inline[0]), &alloc, "a", 1);
            leaf_into(ptr::addr_of_mut!((*t).inline[1]), &alloc, "b", 2);
            ptr::addr_of_mut!((*t).children).write(ObjList::new());

            for (label, value) in [("c", 3), ("d", 4)] {
                let leaf = alloc.allocate(mem::size_of::<Leaf>()).unwrap().cast::<Leaf>();
                leaf_into(leaf.as_ptr(), &alloc, label, value);
                (*t).children.push(leaf.as_ptr().cast(), &alloc).unwrap();
            }

            // tree + 4 leaves * (string + int) + 2 list payloads + 2 nodes
            assert_eq!(alloc.live(), 1 + 8 + 2 + 2);

            free_object(tree.cast(), TREE, true, &alloc);
        }

        assert_eq!(alloc.live(), 0);
        assert_eq!(alloc.invalid_releases(), 0);
    }

    #[test]
    fn test_free_skips_nulls_and_borrowed_root() {
        let alloc = Tracking::new();
        let mut leaf = Leaf {
            label: ptr::null_mut(),
            value: ptr::null_mut(),
        };

        unsafe {
            let v = alloc.allocate(mem::size_of::<c_int>()).unwrap();
            leaf.value = v.as_ptr().cast();
            free_object(NonNull::from(&mut leaf).cast(), LEAF, false, &alloc);
        }

        assert_eq!(alloc.live(), 0);
        assert_eq!(alloc.invalid_releases(), 0);
    }
}

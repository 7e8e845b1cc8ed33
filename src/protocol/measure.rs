//! Serialized size calculator
//!
//! Menelusuri model di atas record hidup dan menjumlahkan apa yang akan
//! ditulis encoder. Harus lock-step dengan `Encoder::write_object`: setiap
//! kind di sini ditangani di sana dengan aritmetika yang sama.

use std::ffi::CStr;

use crate::core::{ObjList, NODE_SIZE};
use crate::reflect::{align, check_model, fields, read_ptr, size_of, Kind, Model, Reflect};

/// Ukuran hasil encode untuk graph dengan root `obj`.
///
/// # Safety
/// `obj` must point to a live record laid out as `model` describes; every
/// reachable pointer, string and list must be valid or null, and the graph
/// must be acyclic.
pub unsafe fn measure_raw(obj: *const u8, model: Model) -> usize {
    let mut size = 0;

    for field in fields(model) {
        let slot = obj.add(field.offset);

        if field.is_pointer {
            let target = read_ptr(slot);
            if !target.is_null() {
                size += measure_raw(target, field.sub());
            }
            continue;
        }

        match field.kind {
            Kind::String => {
                let s = read_ptr(slot);
                if !s.is_null() {
                    size += align(CStr::from_ptr(s.cast()).to_bytes_with_nul().len());
                }
            }
            Kind::Array => {
                let sub = field.sub();
                let item = size_of(sub);
                for i in 0..field.size {
                    // elemen embedded: hanya data yang di-append yang dihitung
                    size += measure_raw(slot.add(item * i), sub) - align(item);
                }
            }
            Kind::Struct => {
                let sub = field.sub();
                size += measure_raw(slot, sub) - align(size_of(sub));
            }
            Kind::List => {
                let sub = field.sub();
                let list = &*slot.cast::<ObjList>();
                for node in list.nodes() {
                    size += NODE_SIZE;
                    if !node.obj.is_null() {
                        size += measure_raw(node.obj.cast(), sub);
                    }
                }
            }
            _ => {}
        }
    }

    size + align(size_of(model))
}

/// Encoded size of `obj`.
///
/// # Safety
/// Every pointer reachable from `obj` must be valid or null and the graph
/// acyclic.
pub unsafe fn measure<T: Reflect>(obj: &T) -> usize {
    check_model::<T>();
    let size = measure_raw((obj as *const T).cast(), T::MODEL);
    tracing::debug!(size, "measured object");
    size
}

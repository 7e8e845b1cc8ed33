//! Singly linked list untuk payload opaque
//!
//! `ObjList` hanya berisi head pointer, jadi bisa ditaruh di dalam record
//! `#[repr(C)]` sebagai field `list`. Node diambil dari allocator yang
//! di-inject; list tidak memiliki dan tidak membaca payload, hanya
//! menyambungkannya.
//!
//! Invariant: setiap node yang reachable dari `head` adalah `ObjNode` yang
//! masih hidup selama list di-borrow.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use super::alloc::{allocate, Allocator};
use crate::error::Result;

/// Satu list node, layout C
#[repr(C)]
#[derive(Debug)]
pub struct ObjNode {
    /// Payload (not owned by the list)
    pub obj: *mut c_void,
    /// Next node, null at the tail
    pub next: *mut ObjNode,
}

/// Byte size of a node record, in memory and in encoded buffers
pub const NODE_SIZE: usize = mem::size_of::<ObjNode>();

#[repr(transparent)]
#[derive(Debug)]
pub struct ObjList {
    head: *mut ObjNode,
}

impl Default for ObjList {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
        }
    }

    #[inline(always)]
    pub fn head(&self) -> *mut ObjNode {
        self.head
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    /// Append `obj` di node yang baru dialokasikan.
    ///
    /// Jika alokasi gagal, list tidak berubah.
    pub fn push<A: Allocator + ?Sized>(&mut self, obj: *mut c_void, alloc: &A) -> Result<()> {
        let node = allocate(alloc, NODE_SIZE)?.cast::<ObjNode>();
        // SAFETY: node is a fresh block of NODE_SIZE bytes, aligned by the allocator
        unsafe {
            node.as_ptr().write(ObjNode {
                obj,
                next: ptr::null_mut(),
            });
            self.push_node(node);
        }
        Ok(())
    }

    /// Link a caller-provided node at the tail.
    ///
    /// # Safety
    /// `node` must be valid, not linked into any list, and outlive its
    /// membership in this one.
    pub unsafe fn push_node(&mut self, node: NonNull<ObjNode>) {
        (*node.as_ptr()).next = ptr::null_mut();

        let mut slot: *mut *mut ObjNode = &mut self.head;
        while !(*slot).is_null() {
            slot = &mut (**slot).next;
        }
        *slot = node.as_ptr();
    }

    /// Unlink `node`. The node itself is not released.
    pub fn remove_node(&mut self, node: NonNull<ObjNode>) -> bool {
        self.unlink(|n| n == node.as_ptr()).is_some()
    }

    /// Unlink the first node carrying `obj` and hand it back so the caller
    /// can release it.
    ///
    /// First match only: when the same payload was pushed more than once,
    /// later nodes stay linked. Call again to remove the next one.
    pub fn remove(&mut self, obj: *mut c_void) -> Option<NonNull<ObjNode>> {
        if obj.is_null() {
            return None;
        }
        // SAFETY: n is reachable from head, hence live
        self.unlink(|n| unsafe { (*n).obj } == obj)
    }

    fn unlink(&mut self, mut hit: impl FnMut(*mut ObjNode) -> bool) -> Option<NonNull<ObjNode>> {
        let mut slot: *mut *mut ObjNode = &mut self.head;
        // SAFETY: slot always points at head or at the `next` of a live node
        unsafe {
            while let Some(node) = NonNull::new(*slot) {
                if hit(node.as_ptr()) {
                    *slot = (*node.as_ptr()).next;
                    (*node.as_ptr()).next = ptr::null_mut();
                    return Some(node);
                }
                slot = &mut (*node.as_ptr()).next;
            }
        }
        None
    }

    /// Payloads in insertion order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            nodes: self.nodes(),
        }
    }

    pub(crate) fn nodes(&self) -> Nodes<'_> {
        Nodes {
            next: self.head,
            _list: PhantomData,
        }
    }

    /// Release every node, handing each payload to `f` first.
    ///
    /// # Safety
    /// All nodes must have been allocated by `alloc`.
    pub unsafe fn drain<A: Allocator + ?Sized>(
        &mut self,
        alloc: &A,
        mut f: impl FnMut(*mut c_void),
    ) {
        let mut next = mem::replace(&mut self.head, ptr::null_mut());
        while let Some(node) = NonNull::new(next) {
            next = (*node.as_ptr()).next;
            f((*node.as_ptr()).obj);
            alloc.release(node.cast());
        }
    }

    /// Release every node; payloads are left alone.
    ///
    /// # Safety
    /// All nodes must have been allocated by `alloc`.
    pub unsafe fn clear<A: Allocator + ?Sized>(&mut self, alloc: &A) {
        self.drain(alloc, |_| {});
    }
}

/// Node walker
pub(crate) struct Nodes<'a> {
    next: *mut ObjNode,
    _list: PhantomData<&'a ObjList>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a ObjNode;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: list invariant, nodes stay live while the list is borrowed
        let node = unsafe { self.next.as_ref()? };
        self.next = node.next;
        Some(node)
    }
}

/// Payload iterator
pub struct Iter<'a> {
    nodes: Nodes<'a>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = *mut c_void;

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.next().map(|node| node.obj)
    }
}

//! Descriptor model
//!
//! Model adalah tabel [`Field`] berurutan yang ditutup satu entry
//! terminator (`Kind::Object`) berisi `size_of` record.
//! Traversal berhenti di terminator pertama.
//!
//! ```text
//! #[repr(C)]
//! struct Hub { id: c_int, user: *const c_char, project: *mut Project }
//!
//! const HUB_MODEL: Model = &[
//!     Field::int("id", offset_of!(Hub, id)),
//!     Field::string("user", offset_of!(Hub, user)),
//!     Field::struct_ptr("project", offset_of!(Hub, project), PROJECT_MODEL),
//!     Field::object::<Hub>(),
//! ];
//! ```

use std::ffi::{c_char, c_double, c_float, c_int, c_long, c_short};
use std::mem;

/// Pointer width, also the alignment of every appended region
pub const PTR_SIZE: usize = mem::size_of::<*const u8>();

/// Descriptor table of one record type
pub type Model = &'static [Field];

/// Field kind
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Terminator; `size` is the whole record
    Object = 0,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// NUL-terminated `char *`
    String,
    /// Nested record, embedded or behind a pointer
    Struct,
    /// Fixed array of embedded records; `size` is the element count
    Array,
    /// [`ObjList`](crate::core::ObjList) of payloads described by the sub-model
    List,
}

impl Kind {
    #[inline(always)]
    pub const fn is_primitive(self) -> bool {
        matches!(
            self,
            Kind::Char | Kind::Short | Kind::Int | Kind::Long | Kind::Float | Kind::Double
        )
    }
}

/// Satu entry descriptor
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Field storage is a pointer to the described value
    pub is_pointer: bool,
    pub kind: Kind,
    /// Primitive width, array length, or record size (see [`Kind`])
    pub size: usize,
    /// Diagnostics only
    pub name: Option<&'static str>,
    /// Byte offset inside the parent record
    pub offset: usize,
    /// Model of the element type, `None` only on terminators
    pub model: Option<Model>,
}

impl Field {
    pub const fn new(
        is_pointer: bool,
        kind: Kind,
        size: usize,
        name: Option<&'static str>,
        offset: usize,
        model: Option<Model>,
    ) -> Self {
        Self {
            is_pointer,
            kind,
            size,
            name,
            offset,
            model,
        }
    }

    /// Terminator for a model describing `T`
    pub const fn object<T>() -> Self {
        Self::terminator(mem::size_of::<T>())
    }

    pub const fn terminator(size: usize) -> Self {
        Self::new(false, Kind::Object, size, None, 0, None)
    }

    pub const fn char(name: &'static str, offset: usize) -> Self {
        Self::new(false, Kind::Char, mem::size_of::<c_char>(), Some(name), offset, Some(CHAR))
    }

    pub const fn char_ptr(name: &'static str, offset: usize) -> Self {
        Self::new(true, Kind::Char, PTR_SIZE, Some(name), offset, Some(CHAR))
    }

    pub const fn short(name: &'static str, offset: usize) -> Self {
        Self::new(false, Kind::Short, mem::size_of::<c_short>(), Some(name), offset, Some(SHORT))
    }

    pub const fn short_ptr(name: &'static str, offset: usize) -> Self {
        Self::new(true, Kind::Short, PTR_SIZE, Some(name), offset, Some(SHORT))
    }

    pub const fn int(name: &'static str, offset: usize) -> Self {
        Self::new(false, Kind::Int, mem::size_of::<c_int>(), Some(name), offset, Some(INT))
    }

    pub const fn int_ptr(name: &'static str, offset: usize) -> Self {
        Self::new(true, Kind::Int, PTR_SIZE, Some(name), offset, Some(INT))
    }

    pub const fn long(name: &'static str, offset: usize) -> Self {
        Self::new(false, Kind::Long, mem::size_of::<c_long>(), Some(name), offset, Some(LONG))
    }

    pub const fn long_ptr(name: &'static str, offset: usize) -> Self {
        Self::new(true, Kind::Long, PTR_SIZE, Some(name), offset, Some(LONG))
    }

    pub const fn float(name: &'static str, offset: usize) -> Self {
        Self::new(false, Kind::Float, mem::size_of::<c_float>(), Some(name), offset, Some(FLOAT))
    }

    pub const fn float_ptr(name: &'static str, offset: usize) -> Self {
        Self::new(true, Kind::Float, PTR_SIZE, Some(name), offset, Some(FLOAT))
    }

    pub const fn double(name: &'static str, offset: usize) -> Self {
        Self::new(false, Kind::Double, mem::size_of::<c_double>(), Some(name), offset, Some(DOUBLE))
    }

    pub const fn double_ptr(name: &'static str, offset: usize) -> Self {
        Self::new(true, Kind::Double, PTR_SIZE, Some(name), offset, Some(DOUBLE))
    }

    pub const fn string(name: &'static str, offset: usize) -> Self {
        Self::new(false, Kind::String, PTR_SIZE, Some(name), offset, Some(STRING))
    }

    /// Record embedded by value
    pub const fn structure(name: &'static str, offset: usize, model: Model) -> Self {
        Self::new(false, Kind::Struct, size_of(model), Some(name), offset, Some(model))
    }

    /// Record behind a pointer
    pub const fn struct_ptr(name: &'static str, offset: usize, model: Model) -> Self {
        Self::new(true, Kind::Struct, PTR_SIZE, Some(name), offset, Some(model))
    }

    /// `len` records embedded back to back
    pub const fn array(name: &'static str, offset: usize, len: usize, model: Model) -> Self {
        Self::new(false, Kind::Array, len, Some(name), offset, Some(model))
    }

    /// [`ObjList`](crate::core::ObjList) whose payloads follow `model`
    pub const fn list(name: &'static str, offset: usize, model: Model) -> Self {
        Self::new(false, Kind::List, PTR_SIZE, Some(name), offset, Some(model))
    }

    /// Sub-model of a composite or pointer field
    ///
    /// # Panics
    /// On a field authored without one.
    #[inline]
    pub fn sub(&self) -> Model {
        match self.model {
            Some(model) => model,
            None => panic!("field `{}` has no sub-model", self.label()),
        }
    }

    #[inline(always)]
    pub fn label(&self) -> &'static str {
        self.name.unwrap_or("<anon>")
    }
}

const fn basic(kind: Kind, size: usize) -> [Field; 2] {
    [
        Field::new(false, kind, size, None, 0, None),
        Field::terminator(size),
    ]
}

pub const CHAR: Model = &basic(Kind::Char, mem::size_of::<c_char>());
pub const SHORT: Model = &basic(Kind::Short, mem::size_of::<c_short>());
pub const INT: Model = &basic(Kind::Int, mem::size_of::<c_int>());
pub const LONG: Model = &basic(Kind::Long, mem::size_of::<c_long>());
pub const FLOAT: Model = &basic(Kind::Float, mem::size_of::<c_float>());
pub const DOUBLE: Model = &basic(Kind::Double, mem::size_of::<c_double>());
pub const STRING: Model = &basic(Kind::String, PTR_SIZE);

/// Flat size of the record described by `model`
///
/// # Panics
/// When `model` has no terminator.
pub const fn size_of(model: Model) -> usize {
    let mut i = 0;
    while i < model.len() {
        if matches!(model[i].kind, Kind::Object) {
            return model[i].size;
        }
        i += 1;
    }
    panic!("model has no terminator entry")
}

/// Whether `model` carries a terminator, usable in `const` assertions
pub const fn is_terminated(model: Model) -> bool {
    let mut i = 0;
    while i < model.len() {
        if matches!(model[i].kind, Kind::Object) {
            return true;
        }
        i += 1;
    }
    false
}

/// Bulatkan `n` ke atas ke pointer width
#[inline(always)]
pub const fn align(n: usize) -> usize {
    (n + PTR_SIZE - 1) & !(PTR_SIZE - 1)
}

/// Entries before the terminator
#[inline]
pub fn fields(model: Model) -> impl Iterator<Item = &'static Field> {
    model.iter().take_while(|f| f.kind != Kind::Object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[repr(C)]
    struct Pair {
        a: c_int,
        b: c_double,
    }

    const PAIR: Model = &[
        Field::int("a", offset_of!(Pair, a)),
        Field::double("b", offset_of!(Pair, b)),
        Field::object::<Pair>(),
    ];

    const _: () = assert!(is_terminated(PAIR));

    #[test]
    fn test_basic_models() {
        assert_eq!(size_of(CHAR), 1);
        assert_eq!(size_of(SHORT), mem::size_of::<c_short>());
        assert_eq!(size_of(INT), mem::size_of::<c_int>());
        assert_eq!(size_of(LONG), mem::size_of::<c_long>());
        assert_eq!(size_of(FLOAT), 4);
        assert_eq!(size_of(DOUBLE), 8);
        assert_eq!(size_of(STRING), PTR_SIZE);
        assert_eq!(fields(STRING).count(), 1);
    }

    #[test]
    fn test_record_model() {
        assert_eq!(size_of(PAIR), mem::size_of::<Pair>());
        let names: Vec<_> = fields(PAIR).map(|f| f.label()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(PAIR[1].offset, 8);
    }

    #[test]
    fn test_stops_at_first_terminator() {
        const TWICE: Model = &[
            Field::int("a", 0),
            Field::terminator(4),
            Field::int("hidden", 4),
            Field::terminator(8),
        ];
        assert_eq!(size_of(TWICE), 4);
        assert_eq!(fields(TWICE).count(), 1);
    }

    #[test]
    fn test_embedded_struct_size() {
        let field = Field::structure("pair", 0, PAIR);
        assert_eq!(field.size, mem::size_of::<Pair>());
        assert!(!field.is_pointer);

        let ptr = Field::struct_ptr("pair", 0, PAIR);
        assert_eq!(ptr.size, PTR_SIZE);
        assert!(ptr.is_pointer);
    }

    #[test]
    fn test_align() {
        assert_eq!(align(0), 0);
        assert_eq!(align(1), PTR_SIZE);
        assert_eq!(align(PTR_SIZE), PTR_SIZE);
        assert_eq!(align(PTR_SIZE + 1), 2 * PTR_SIZE);
    }

    #[test]
    fn test_unterminated() {
        const OPEN: Model = &[Field::int("a", 0)];
        assert!(!is_terminated(OPEN));
        assert!(std::panic::catch_unwind(|| size_of(OPEN)).is_err());
    }

    #[test]
    #[should_panic(expected = "has no sub-model")]
    fn test_missing_sub_model() {
        Field::new(true, Kind::Struct, PTR_SIZE, Some("p"), 0, None).sub();
    }
}

//! Self-relative offset
//!
//! Setiap slot berbentuk pointer di encoded buffer menyimpan jarak signed
//! dari slot itu sendiri ke datanya. Posisi adalah index buffer, jadi nilai
//! yang disimpan tidak bergantung pada lokasi buffer di memory.
//! Delta nol berarti "kosong": target asli selalu di-append setelah slot.

/// Width of an encoded delta (pointer width)
pub const REL_SIZE: usize = std::mem::size_of::<isize>();

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelOffset(isize);

impl RelOffset {
    pub const NULL: Self = Self(0);

    #[inline(always)]
    pub const fn new(delta: isize) -> Self {
        Self(delta)
    }

    /// Delta stored in `field` to reach `target`
    #[inline(always)]
    pub fn between(field: usize, target: usize) -> Self {
        Self((target as isize).wrapping_sub(field as isize))
    }

    /// Absolute position for a delta read from `field`, `None` when absent
    #[inline(always)]
    pub fn resolve(self, field: usize) -> Option<usize> {
        if self.is_null() {
            None
        } else {
            Some(field.wrapping_add_signed(self.0))
        }
    }

    #[inline(always)]
    pub const fn get(self) -> isize {
        self.0
    }

    #[inline(always)]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn read(buf: &[u8], at: usize) -> Self {
        Self(read_word(buf, at) as isize)
    }

    #[inline(always)]
    pub fn write(self, buf: &mut [u8], at: usize) {
        write_word(buf, at, self.0 as usize);
    }
}

#[inline(always)]
pub(crate) fn read_word(buf: &[u8], at: usize) -> usize {
    let mut word = [0u8; REL_SIZE];
    word.copy_from_slice(&buf[at..at + REL_SIZE]);
    usize::from_ne_bytes(word)
}

#[inline(always)]
pub(crate) fn write_word(buf: &mut [u8], at: usize, value: usize) {
    buf[at..at + REL_SIZE].copy_from_slice(&value.to_ne_bytes());
}

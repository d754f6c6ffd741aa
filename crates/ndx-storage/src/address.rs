use std::fmt;

/// Byte offset of a block inside a store's heap.
///
/// Addresses are only meaningful while the owning store is open and the block
/// has not been freed. They are handed out by transactions; keep them inside
/// the lock scope that produced them and use a
/// [`StableHandle`](crate::StableHandle) to remember a result across locks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address {
    pub const NULL: Address = Address(0);

    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub(crate) fn offset(self, delta: u32) -> Address {
        Address(self.0 + u64::from(delta))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

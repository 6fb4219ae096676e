//! Size classes.
//!
//! Every request is rounded up to one of a small, ascending set of payload
//! sizes. The largest class is also the largest request an arena accepts.

use crate::node::NODE_ALIGN;
use crate::numeric::Size;

pub const DEFAULT_CLASSES: [Size; 6] = [16, 32, 64, 128, 256, 1024];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinTable {
    classes: &'static [Size],
}

impl Default for BinTable {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BinTable {
    pub const DEFAULT: Self = match Self::new(&DEFAULT_CLASSES) {
        Some(table) => table,
        None => panic!("default size classes are malformed"),
    };

    /// Builds a table from `classes`.
    ///
    /// Returns `None` unless the classes are non-empty, strictly ascending,
    /// non-zero and multiples of the header alignment, so that every node
    /// carved from an arena starts on an aligned header.
    pub const fn new(classes: &'static [Size]) -> Option<Self> {
        if classes.is_empty() {
            return None;
        }
        let mut i = 0;
        while i < classes.len() {
            let class = classes[i];
            if class == 0 || class % NODE_ALIGN != 0 {
                return None;
            }
            if i > 0 && classes[i - 1] >= class {
                return None;
            }
            i += 1;
        }
        Some(Self { classes })
    }

    #[inline]
    pub const fn classes(&self) -> &'static [Size] {
        self.classes
    }

    /// The largest class, which is also the largest accepted request.
    #[inline]
    pub const fn max(&self) -> Size {
        self.classes[self.classes.len() - 1]
    }

    /// Smallest class that fits `size`, or the largest class when none does.
    ///
    /// Callers must reject sizes above [`max`](Self::max) themselves.
    pub const fn nearest(&self, size: usize) -> Size {
        let mut i = 0;
        while i < self.classes.len() {
            if size <= self.classes[i] as usize {
                return self.classes[i];
            }
            i += 1;
        }
        self.max()
    }
}

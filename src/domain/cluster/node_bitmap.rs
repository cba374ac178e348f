//! Fixed-universe bitset over all cluster nodes.
//!
//! Bit `i` stands for the node at index `i` of the node table. Every bitmap in
//! one controller shares the same universe size, binary operations assume it.

const WORD_BITS: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NodeBitmap {
    bits: Vec<u64>,
    size: usize,
}

impl NodeBitmap {
    /// Empty bitmap over `size` nodes.
    pub fn new(size: usize) -> Self {
        let num_words = size.div_ceil(WORD_BITS);
        Self { bits: vec![0; num_words], size }
    }

    /// Bitmap with every node of the universe set.
    pub fn full(size: usize) -> Self {
        let mut bitmap = Self::new(size);
        bitmap.set_all();
        bitmap
    }

    pub fn from_indices(size: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut bitmap = Self::new(size);
        for index in indices {
            bitmap.set(index);
        }
        bitmap
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set(&mut self, index: usize) -> bool {
        if index >= self.size {
            return false;
        }
        self.bits[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        true
    }

    pub fn clear(&mut self, index: usize) -> bool {
        if index >= self.size {
            return false;
        }
        self.bits[index / WORD_BITS] &= !(1 << (index % WORD_BITS));
        true
    }

    pub fn test(&self, index: usize) -> bool {
        if index >= self.size {
            return false;
        }
        (self.bits[index / WORD_BITS] & (1 << (index % WORD_BITS))) != 0
    }

    pub fn set_all(&mut self) {
        for word in self.bits.iter_mut() {
            *word = u64::MAX;
        }
        self.mask_tail();
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// `self &= other`
    pub fn and(&mut self, other: &NodeBitmap) {
        for (word, other_word) in self.bits.iter_mut().zip(other.bits.iter()) {
            *word &= *other_word;
        }
    }

    /// `self |= other`
    pub fn or(&mut self, other: &NodeBitmap) {
        for (word, other_word) in self.bits.iter_mut().zip(other.bits.iter()) {
            *word |= *other_word;
        }
    }

    /// `self &= !other`
    pub fn and_not(&mut self, other: &NodeBitmap) {
        for (word, other_word) in self.bits.iter_mut().zip(other.bits.iter()) {
            *word &= !*other_word;
        }
    }

    /// Inverts every bit inside the universe.
    pub fn not(&mut self) {
        for word in self.bits.iter_mut() {
            *word = !*word;
        }
        self.mask_tail();
    }

    /// Number of nodes set in both bitmaps.
    pub fn overlap(&self, other: &NodeBitmap) -> usize {
        self.bits.iter().zip(other.bits.iter()).map(|(a, b)| (a & b).count_ones() as usize).sum()
    }

    pub fn overlaps(&self, other: &NodeBitmap) -> bool {
        self.bits.iter().zip(other.bits.iter()).any(|(a, b)| (a & b) != 0)
    }

    /// New bitmap holding the first `count` set bits (lowest node index first).
    /// `None` if fewer than `count` bits are set.
    pub fn pick_cnt(&self, count: usize) -> Option<NodeBitmap> {
        if self.count() < count {
            return None;
        }
        Some(NodeBitmap::from_indices(self.size, self.iter_set().take(count)))
    }

    /// Indices of set bits in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(word_idx, word)| {
            let mut remaining = *word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(word_idx * WORD_BITS + bit)
            })
        })
    }

    fn mask_tail(&mut self) {
        let tail = self.size % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }
}

impl std::fmt::Debug for NodeBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set: Vec<usize> = self.iter_set().collect();
        write!(f, "NodeBitmap({}/{}: {:?})", set.len(), self.size, set)
    }
}

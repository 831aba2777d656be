use std::ops::Range;

/// Fixed-size partitioning of an object into multipart parts.
///
/// Every part is `chunk_size` bytes except the last, which holds the
/// remainder. Part numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    size: u64,
    chunk_size: u64,
}

impl PartPlan {
    pub fn new(size: u64, chunk_size: u64) -> Self {
        Self {
            size,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn part_count(&self) -> u32 {
        self.size.div_ceil(self.chunk_size) as u32
    }

    pub fn contains(&self, part_number: u32) -> bool {
        part_number >= 1 && part_number <= self.part_count()
    }

    /// Byte range covered by `part_number`, or `None` when out of range.
    pub fn range(&self, part_number: u32) -> Option<Range<u64>> {
        if !self.contains(part_number) {
            return None;
        }
        let start = (part_number as u64 - 1) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.size);
        Some(start..end)
    }

    pub fn part_numbers(&self) -> impl Iterator<Item = u32> {
        1..=self.part_count()
    }
}

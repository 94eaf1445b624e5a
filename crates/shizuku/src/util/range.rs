#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// Range covering `start..=end`, both inclusive as in an HTTP `Range` header.
    pub fn inclusive(start: u64, end: u64) -> Self {
        Self::new(start, Some(end.saturating_sub(start) + 1))
    }

    /// Open-ended range starting at `offset`.
    pub fn from_offset(offset: u64) -> Self {
        Self::new(offset, None)
    }

    /// Skip the first `consumed` bytes of this range.
    ///
    /// Returns `None` when nothing of a bounded range is left to request.
    pub fn resume(&self, consumed: u64) -> Option<Self> {
        match self.length {
            Some(length) if consumed >= length => None,
            Some(length) => Some(Self::new(self.offset + consumed, Some(length - consumed))),
            None => Some(Self::from_offset(self.offset + consumed)),
        }
    }

    pub fn to_http_range(&self) -> String {
        if let Some(length) = self.length {
            format!("bytes={}-{}", self.offset, self.offset + length - 1)
        } else {
            format!("bytes={}-", self.offset)
        }
    }
}

use tls_core::Error;

/// A growable byte sink over an optional caller-supplied backing store.
///
/// Output starts in the borrowed `small` area and is promoted to the
/// heap on the first growth past its capacity.  All writes go through
/// [`Buffer::reserve`]; allocation failure surfaces as
/// [`Error::OutOfMemory`] instead of aborting.
pub struct Buffer<'a> {
    small: &'a mut [u8],
    heap: Option<Vec<u8>>,
    len: usize,
}

impl<'a> Buffer<'a> {
    /// Create a buffer over a caller-owned small area.  `&mut []` is a
    /// valid small area; the first write then goes straight to the heap.
    pub fn new(small: &'a mut [u8]) -> Self {
        Self {
            small,
            heap: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn capacity(&self) -> usize {
        match &self.heap {
            Some(v) => v.capacity(),
            None => self.small.len(),
        }
    }

    /// Ensure capacity for at least `additional` more bytes, doubling as
    /// needed and migrating to the heap on first growth.
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        let needed = self
            .len
            .checked_add(additional)
            .ok_or(Error::OutOfMemory)?;
        if needed <= self.capacity() {
            return Ok(());
        }

        let new_capacity = needed.max(self.capacity().max(64) * 2);

        match &mut self.heap {
            Some(v) => v
                .try_reserve(new_capacity - v.len())
                .map_err(|_| Error::OutOfMemory)?,
            None => {
                let mut v = Vec::new();
                v.try_reserve(new_capacity).map_err(|_| Error::OutOfMemory)?;
                v.extend_from_slice(&self.small[..self.len]);
                self.heap = Some(v);
            }
        }

        Ok(())
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<(), Error> {
        self.reserve(data.len())?;
        match &mut self.heap {
            Some(v) => v.extend_from_slice(data),
            None => self.small[self.len..self.len + data.len()].copy_from_slice(data),
        }
        self.len += data.len();
        Ok(())
    }

    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        self.extend_from_slice(&[byte])
    }

    /// Discard the contents, keeping any allocation for reuse.
    pub fn clear(&mut self) {
        if let Some(v) = &mut self.heap {
            v.clear();
        }
        self.len = 0;
    }
}

impl AsRef<[u8]> for Buffer<'_> {
    fn as_ref(&self) -> &[u8] {
        match &self.heap {
            Some(v) => &v[..self.len],
            None => &self.small[..self.len],
        }
    }
}

use std::collections::TryReserveError;

/// Largest decimal rendering of a `usize` length prefix.
const MAX_INT_DIGITS: usize = 20;

/// Append-only byte buffer reused across executions.
///
/// Growth doubles the capacity (starting from 1) until the pending append
/// fits, so a long result set costs O(log n) reallocations. `reset` keeps
/// the allocation; previous contents are invalid after it.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    bytes: Vec<u8>,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Truncates to zero length, keeping capacity.
    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// The written bytes, not the spare capacity.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Makes room for `additional` more bytes using the doubling policy.
    pub fn ensure(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let len = self.bytes.len();
        if self.bytes.capacity() - len >= additional {
            return Ok(());
        }
        let Some(needed) = len.checked_add(additional) else {
            // Overflows; let the allocator report it.
            return self.bytes.try_reserve_exact(additional);
        };
        let mut cap = self.bytes.capacity().max(1);
        while cap < needed {
            cap = cap.checked_mul(2).unwrap_or(needed);
        }
        self.bytes.try_reserve_exact(cap - len)
    }

    pub fn push_byte(&mut self, byte: u8) -> Result<(), TryReserveError> {
        self.ensure(1)?;
        self.bytes.push(byte);
        Ok(())
    }

    pub fn push_bytes(&mut self, data: &[u8]) -> Result<(), TryReserveError> {
        self.ensure(data.len())?;
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Appends the decimal ASCII form of `value`.
    pub fn push_decimal(&mut self, value: usize) -> Result<(), TryReserveError> {
        let mut digits = [0u8; MAX_INT_DIGITS];
        let mut start = MAX_INT_DIGITS;
        let mut rest = value;
        loop {
            start -= 1;
            digits[start] = b'0' + (rest % 10) as u8;
            rest /= 10;
            if rest == 0 {
                break;
            }
        }
        self.push_bytes(&digits[start..])
    }
}

//! Bounds-checked little-endian reader over a byte slice.

use crate::error::PolicyError;
use crate::policydb::Ebitmap;

use super::MAPSIZE;

pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Error at the current offset.
    pub(crate) fn malformed(&self, detail: impl Into<String>) -> PolicyError {
        PolicyError::malformed(self.pos, detail)
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], PolicyError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.malformed(format!("need {len} bytes, {} left", self.remaining())))?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| self.malformed("slice out of range"))?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PolicyError> {
        let bytes = self.take(N)?;
        <[u8; N]>::try_from(bytes).map_err(|_| self.malformed("short read"))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, PolicyError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, PolicyError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub(crate) fn bytes16(&mut self) -> Result<[u8; 16], PolicyError> {
        self.array()
    }

    /// A `u32` that must fit in `u16`.
    pub(crate) fn u16(&mut self) -> Result<u16, PolicyError> {
        let value = self.u32()?;
        u16::try_from(value).map_err(|_| self.malformed(format!("{value} exceeds 16 bits")))
    }

    /// A `u32` that must fit in `u8`.
    pub(crate) fn u8(&mut self) -> Result<u8, PolicyError> {
        let value = self.u32()?;
        u8::try_from(value).map_err(|_| self.malformed(format!("{value} exceeds 8 bits")))
    }

    /// A `u32` holding 0 or 1.
    pub(crate) fn flag(&mut self) -> Result<bool, PolicyError> {
        match self.u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.malformed(format!("flag value {other}"))),
        }
    }

    /// A `u32` value where 0 means absent.
    pub(crate) fn optional(&mut self) -> Result<Option<u32>, PolicyError> {
        let value = self.u32()?;
        Ok((value != 0).then_some(value))
    }

    /// An element count, checked against what the remaining bytes could
    /// hold at `min_size` bytes per element.
    pub(crate) fn count(&mut self, min_size: usize) -> Result<usize, PolicyError> {
        let raw = self.u32()?;
        let count = usize::try_from(raw).map_err(|_| self.malformed("count overflow"))?;
        let needed = count
            .checked_mul(min_size.max(1))
            .ok_or_else(|| self.malformed("count overflow"))?;
        if needed > self.remaining() {
            return Err(self.malformed(format!(
                "count {count} exceeds the {} bytes left",
                self.remaining()
            )));
        }
        Ok(count)
    }

    /// Length-prefixed UTF-8 string.
    pub(crate) fn string(&mut self) -> Result<String, PolicyError> {
        let len = self.count(1)?;
        let start = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| PolicyError::malformed(start, format!("invalid UTF-8: {e}")))
    }

    /// Length-prefixed string where empty means absent.
    pub(crate) fn optional_string(&mut self) -> Result<Option<String>, PolicyError> {
        let value = self.string()?;
        Ok((!value.is_empty()).then_some(value))
    }

    /// Extensible bitmap: map size, high bit, node count, then
    /// (start bit, 64-bit map) nodes in ascending order.
    pub(crate) fn ebitmap(&mut self) -> Result<Ebitmap, PolicyError> {
        let mapsize = self.u32()?;
        if mapsize != MAPSIZE {
            return Err(self.malformed(format!("ebitmap map size {mapsize}")));
        }
        let highbit = self.u32()?;
        if highbit % MAPSIZE != 0 {
            return Err(self.malformed(format!("ebitmap high bit {highbit} not aligned")));
        }
        let count = self.count(12)?;
        if highbit == 0 && count != 0 {
            return Err(self.malformed("ebitmap nodes without a high bit"));
        }
        let mut map = Ebitmap::new();
        let mut next_start: u32 = 0;
        for _ in 0..count {
            let start = self.u32()?;
            let bits = self.u64()?;
            if start % MAPSIZE != 0 || start < next_start || start >= highbit {
                return Err(self.malformed(format!("ebitmap node at bit {start} out of order")));
            }
            if bits == 0 {
                return Err(self.malformed("empty ebitmap node"));
            }
            map.set_node(start, bits);
            next_start = start.saturating_add(MAPSIZE);
        }
        if map.node_high_bit() != highbit {
            return Err(self.malformed(format!("ebitmap high bit {highbit} does not match nodes")));
        }
        Ok(map)
    }
}

//! Minimal DER codec for the key-file envelopes
//!
//! Covers exactly the subset the key formats need: BOOLEAN, INTEGER,
//! BIT STRING, OCTET STRING, OBJECT IDENTIFIER and SEQUENCE, all with
//! definite lengths.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;

use crate::error::{HomomorphicError, Result};

pub(crate) const TAG_BOOLEAN: u8 = 0x01;
pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_BIT_STRING: u8 = 0x03;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_SEQUENCE: u8 = 0x30;

fn malformed(msg: &str) -> HomomorphicError {
    HomomorphicError::KeyParamInvalid(format!("malformed DER: {msg}"))
}

/// Append a definite-form length
fn encode_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}

/// Append one tag-length-value element
pub(crate) fn encode_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    encode_length(out, content.len());
    out.extend_from_slice(content);
}

/// Append an INTEGER with two's-complement minimal-octet content
pub(crate) fn encode_integer(out: &mut Vec<u8>, value: &BigInt) {
    encode_tlv(out, TAG_INTEGER, &value.to_signed_bytes_be());
}

/// Append a nonnegative INTEGER
pub(crate) fn encode_uint(out: &mut Vec<u8>, value: &BigUint) {
    encode_integer(out, &BigInt::from_biguint(Sign::Plus, value.clone()));
}

/// Append a BOOLEAN
pub(crate) fn encode_bool(out: &mut Vec<u8>, value: bool) {
    encode_tlv(out, TAG_BOOLEAN, &[if value { 0xFF } else { 0x00 }]);
}

/// Append an OBJECT IDENTIFIER from its arc values
pub(crate) fn encode_oid(out: &mut Vec<u8>, arcs: &[u64]) {
    debug_assert!(arcs.len() >= 2);
    let mut content = Vec::new();
    content.push((arcs[0] * 40 + arcs[1]) as u8);
    for &arc in &arcs[2..] {
        let mut chunk = [0u8; 10];
        let mut i = chunk.len();
        let mut v = arc;
        loop {
            i -= 1;
            chunk[i] = (v & 0x7F) as u8 | if i == chunk.len() - 1 { 0 } else { 0x80 };
            v >>= 7;
            if v == 0 {
                break;
            }
        }
        content.extend_from_slice(&chunk[i..]);
    }
    encode_tlv(out, TAG_OID, &content);
}

/// Append a SEQUENCE wrapping already-encoded content
pub(crate) fn encode_sequence(out: &mut Vec<u8>, content: &[u8]) {
    encode_tlv(out, TAG_SEQUENCE, content);
}

/// Append a BIT STRING with no unused bits
pub(crate) fn encode_bit_string(out: &mut Vec<u8>, bytes: &[u8]) {
    let mut content = Vec::with_capacity(bytes.len() + 1);
    content.push(0x00);
    content.extend_from_slice(bytes);
    encode_tlv(out, TAG_BIT_STRING, &content);
}

/// Append an OCTET STRING
pub(crate) fn encode_octet_string(out: &mut Vec<u8>, bytes: &[u8]) {
    encode_tlv(out, TAG_OCTET_STRING, bytes);
}

/// Sequential reader over DER content
pub(crate) struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        DerReader { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Everything must have been consumed
    pub(crate) fn expect_end(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(malformed("trailing bytes"))
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(malformed("truncated element"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read one element, checking its tag, and return the content octets
    pub(crate) fn read_tlv(&mut self, expected_tag: u8) -> Result<&'a [u8]> {
        let tag = self.take(1)?[0];
        if tag != expected_tag {
            return Err(malformed(&format!(
                "expected tag 0x{expected_tag:02x}, found 0x{tag:02x}"
            )));
        }
        let first = self.take(1)?[0];
        let len = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7F) as usize;
            if count == 0 || count > 4 {
                return Err(malformed("unsupported length encoding"));
            }
            let mut len = 0usize;
            for &b in self.take(count)? {
                len = (len << 8) | b as usize;
            }
            len
        };
        self.take(len)
    }

    /// Descend into a SEQUENCE
    pub(crate) fn read_sequence(&mut self) -> Result<DerReader<'a>> {
        Ok(DerReader::new(self.read_tlv(TAG_SEQUENCE)?))
    }

    pub(crate) fn read_integer(&mut self) -> Result<BigInt> {
        let content = self.read_tlv(TAG_INTEGER)?;
        if content.is_empty() {
            return Err(malformed("empty INTEGER"));
        }
        Ok(BigInt::from_signed_bytes_be(content))
    }

    /// Read an INTEGER that must be nonnegative
    pub(crate) fn read_uint(&mut self) -> Result<BigUint> {
        self.read_integer()?
            .to_biguint()
            .ok_or_else(|| malformed("negative INTEGER where nonnegative required"))
    }

    /// Read a small nonnegative INTEGER into a u32
    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        self.read_uint()?
            .to_u32()
            .ok_or_else(|| malformed("INTEGER does not fit in u32"))
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool> {
        let content = self.read_tlv(TAG_BOOLEAN)?;
        match content {
            [0x00] => Ok(false),
            [_] => Ok(true),
            _ => Err(malformed("BOOLEAN must be one octet")),
        }
    }

    pub(crate) fn read_oid(&mut self) -> Result<Vec<u64>> {
        let content = self.read_tlv(TAG_OID)?;
        if content.is_empty() {
            return Err(malformed("empty OBJECT IDENTIFIER"));
        }
        let mut arcs = vec![(content[0] / 40) as u64, (content[0] % 40) as u64];
        let mut current = 0u64;
        for &b in &content[1..] {
            current = (current << 7) | (b & 0x7F) as u64;
            if b & 0x80 == 0 {
                arcs.push(current);
                current = 0;
            }
        }
        if current != 0 {
            return Err(malformed("truncated OBJECT IDENTIFIER arc"));
        }
        Ok(arcs)
    }

    /// Read a BIT STRING, requiring zero unused bits
    pub(crate) fn read_bit_string(&mut self) -> Result<&'a [u8]> {
        let content = self.read_tlv(TAG_BIT_STRING)?;
        match content.split_first() {
            Some((0x00, rest)) => Ok(rest),
            _ => Err(malformed("BIT STRING with unused bits")),
        }
    }

    pub(crate) fn read_octet_string(&mut self) -> Result<&'a [u8]> {
        self.read_tlv(TAG_OCTET_STRING)
    }
}

//! Length-prefixed message exchange between the two protocol roles
//!
//! Every message is one frame: a 4-byte big-endian length followed by a
//! tagged payload. Big integers travel as 4-byte big-endian length plus
//! two's-complement minimal octets, so the encoding round-trips across
//! implementations.

use std::io::{BufReader, BufWriter, Read, Write};

use num_bigint::{BigInt, BigUint, Sign};

use crate::error::{HomomorphicError, Result};

const TAG_BIG_INT: u8 = 1;
const TAG_BIG_INT_ARRAY: u8 = 2;
const TAG_SMALL_INT: u8 = 3;
const TAG_BOOL: u8 = 4;
const TAG_BYTES: u8 = 5;

/// Refuse frames beyond this size; a peer speaking the protocol honestly
/// never comes close
const MAX_FRAME_BYTES: usize = 1 << 26;

/// The tagged union carried by every frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    BigInt(BigInt),
    BigIntArray(Vec<BigInt>),
    SmallInt(i64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Message {
    fn kind(&self) -> &'static str {
        match self {
            Message::BigInt(_) => "BIG_INT",
            Message::BigIntArray(_) => "BIG_INT_ARRAY",
            Message::SmallInt(_) => "SMALL_INT",
            Message::Bool(_) => "BOOL",
            Message::Bytes(_) => "BYTES",
        }
    }

    /// Encode the tagged payload (without the outer frame length)
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::BigInt(v) => {
                out.push(TAG_BIG_INT);
                encode_bigint(&mut out, v);
            }
            Message::BigIntArray(values) => {
                out.push(TAG_BIG_INT_ARRAY);
                out.extend_from_slice(&(values.len() as u32).to_be_bytes());
                for v in values {
                    encode_bigint(&mut out, v);
                }
            }
            Message::SmallInt(v) => {
                out.push(TAG_SMALL_INT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Message::Bool(v) => {
                out.push(TAG_BOOL);
                out.push(*v as u8);
            }
            Message::Bytes(bytes) => {
                out.push(TAG_BYTES);
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    /// Decode a tagged payload
    fn decode(buf: &[u8]) -> Result<Message> {
        let mut cursor = Cursor { buf, pos: 0 };
        let tag = cursor.take(1)?[0];
        let message = match tag {
            TAG_BIG_INT => Message::BigInt(cursor.read_bigint()?),
            TAG_BIG_INT_ARRAY => {
                let count = cursor.read_u32()? as usize;
                let mut values = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    values.push(cursor.read_bigint()?);
                }
                Message::BigIntArray(values)
            }
            TAG_SMALL_INT => {
                let bytes: [u8; 8] = cursor.take(8)?.try_into().expect("length checked");
                Message::SmallInt(i64::from_be_bytes(bytes))
            }
            TAG_BOOL => match cursor.take(1)?[0] {
                0 => Message::Bool(false),
                1 => Message::Bool(true),
                other => {
                    return Err(HomomorphicError::ProtocolMismatch(format!(
                        "invalid BOOL payload {other}"
                    )))
                }
            },
            TAG_BYTES => {
                let len = cursor.read_u32()? as usize;
                Message::Bytes(cursor.take(len)?.to_vec())
            }
            other => {
                return Err(HomomorphicError::ProtocolMismatch(format!(
                    "unknown message tag {other}"
                )))
            }
        };
        if cursor.pos != buf.len() {
            return Err(HomomorphicError::ProtocolMismatch(
                "trailing bytes in frame".to_string(),
            ));
        }
        Ok(message)
    }
}

fn encode_bigint(out: &mut Vec<u8>, v: &BigInt) {
    let bytes = v.to_signed_bytes_be();
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytes);
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(HomomorphicError::ProtocolMismatch(
                "truncated frame".to_string(),
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked");
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_bigint(&mut self) -> Result<BigInt> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        if bytes.is_empty() {
            return Err(HomomorphicError::ProtocolMismatch(
                "empty BIG_INT payload".to_string(),
            ));
        }
        Ok(BigInt::from_signed_bytes_be(bytes))
    }
}

/// Map channel-level I/O failures onto the session error model
fn channel_error(e: std::io::Error) -> HomomorphicError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted => HomomorphicError::TransportClosed,
        _ => HomomorphicError::Io(e),
    }
}

/// Control tags identifying the sub-protocol a header opens
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Opcode {
    Multiplication,
    Division,
    Protocol1,
    Protocol2,
    TopK,
    PrivateEquals,
    EncryptedEquals,
}

impl Opcode {
    pub(crate) fn as_wire(self) -> i64 {
        match self {
            Opcode::Multiplication => 1,
            Opcode::Division => 2,
            Opcode::Protocol1 => 3,
            Opcode::Protocol2 => 4,
            Opcode::TopK => 5,
            Opcode::PrivateEquals => 6,
            Opcode::EncryptedEquals => 7,
        }
    }

    pub(crate) fn from_wire(v: i64) -> Option<Self> {
        match v {
            1 => Some(Opcode::Multiplication),
            2 => Some(Opcode::Division),
            3 => Some(Opcode::Protocol1),
            4 => Some(Opcode::Protocol2),
            5 => Some(Opcode::TopK),
            6 => Some(Opcode::PrivateEquals),
            7 => Some(Opcode::EncryptedEquals),
            _ => None,
        }
    }
}

/// Blocking duplex channel over any reader/writer pair
pub struct Channel<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
}

impl<R: Read, W: Write> Channel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Channel {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    /// Send one framed message and flush
    pub fn send(&mut self, message: &Message) -> Result<()> {
        let payload = message.encode();
        let len = (payload.len() as u32).to_be_bytes();
        self.writer.write_all(&len).map_err(channel_error)?;
        self.writer.write_all(&payload).map_err(channel_error)?;
        self.writer.flush().map_err(channel_error)?;
        Ok(())
    }

    /// Receive one framed message, blocking on the peer
    pub fn recv(&mut self) -> Result<Message> {
        let mut len_bytes = [0u8; 4];
        self.reader.read_exact(&mut len_bytes).map_err(channel_error)?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "frame of {len} bytes exceeds the limit"
            )));
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).map_err(channel_error)?;
        Message::decode(&payload)
    }

    pub fn send_biguint(&mut self, v: &BigUint) -> Result<()> {
        self.send(&Message::BigInt(BigInt::from_biguint(Sign::Plus, v.clone())))
    }

    pub fn send_biguint_array(&mut self, values: &[BigUint]) -> Result<()> {
        let values = values
            .iter()
            .map(|v| BigInt::from_biguint(Sign::Plus, v.clone()))
            .collect();
        self.send(&Message::BigIntArray(values))
    }

    pub fn send_small_int(&mut self, v: i64) -> Result<()> {
        self.send(&Message::SmallInt(v))
    }

    pub fn send_bool(&mut self, v: bool) -> Result<()> {
        self.send(&Message::Bool(v))
    }

    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.send(&Message::Bytes(bytes.to_vec()))
    }

    pub fn recv_biguint(&mut self) -> Result<BigUint> {
        match self.recv()? {
            Message::BigInt(v) => to_unsigned(v),
            other => Err(wrong_kind("BIG_INT", &other)),
        }
    }

    pub fn recv_biguint_array(&mut self) -> Result<Vec<BigUint>> {
        match self.recv()? {
            Message::BigIntArray(values) => values.into_iter().map(to_unsigned).collect(),
            other => Err(wrong_kind("BIG_INT_ARRAY", &other)),
        }
    }

    pub fn recv_small_int(&mut self) -> Result<i64> {
        match self.recv()? {
            Message::SmallInt(v) => Ok(v),
            other => Err(wrong_kind("SMALL_INT", &other)),
        }
    }

    pub fn recv_bool(&mut self) -> Result<bool> {
        match self.recv()? {
            Message::Bool(v) => Ok(v),
            other => Err(wrong_kind("BOOL", &other)),
        }
    }

    pub fn recv_bytes(&mut self) -> Result<Vec<u8>> {
        match self.recv()? {
            Message::Bytes(bytes) => Ok(bytes),
            other => Err(wrong_kind("BYTES", &other)),
        }
    }
}

fn to_unsigned(v: BigInt) -> Result<BigUint> {
    v.to_biguint().ok_or_else(|| {
        HomomorphicError::ProtocolMismatch("negative value where a residue was expected".to_string())
    })
}

fn wrong_kind(expected: &str, got: &Message) -> HomomorphicError {
    HomomorphicError::ProtocolMismatch(format!("expected {expected}, received {}", got.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::ToBigInt;
    use std::io::Cursor as IoCursor;

    fn round_trip(message: Message) -> Message {
        let mut written = Vec::new();
        {
            let mut tx = Channel::new(IoCursor::new(Vec::new()), &mut written);
            tx.send(&message).unwrap();
        }
        let mut rx = Channel::new(IoCursor::new(written), Vec::new());
        rx.recv().unwrap()
    }

    #[test]
    fn test_big_int_round_trip() {
        for v in [0i64, 1, -1, 255, -256, i64::MAX, i64::MIN] {
            let message = Message::BigInt(v.to_bigint().unwrap());
            assert_eq!(round_trip(message.clone()), message);
        }

        let huge = (BigInt::from(1) << 300) + 12345;
        let message = Message::BigInt(huge);
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn test_array_round_trip() {
        let values: Vec<BigInt> = (-3i64..40).map(|v| v.to_bigint().unwrap()).collect();
        let message = Message::BigIntArray(values);
        assert_eq!(round_trip(message.clone()), message);

        let empty = Message::BigIntArray(Vec::new());
        assert_eq!(round_trip(empty.clone()), empty);
    }

    #[test]
    fn test_scalar_round_trips() {
        for message in [
            Message::SmallInt(-42),
            Message::SmallInt(i64::MAX),
            Message::Bool(true),
            Message::Bool(false),
            Message::Bytes(b"ciphertext bytes".to_vec()),
            Message::Bytes(Vec::new()),
        ] {
            assert_eq!(round_trip(message.clone()), message);
        }
    }

    #[test]
    fn test_wire_format_is_fixed() {
        // SmallInt(1): frame length 9, tag 3, 8-byte big-endian payload
        let mut written = Vec::new();
        {
            let mut tx = Channel::new(IoCursor::new(Vec::new()), &mut written);
            tx.send_small_int(1).unwrap();
        }
        assert_eq!(written, vec![0, 0, 0, 9, 3, 0, 0, 0, 0, 0, 0, 0, 1]);

        // BigInt(-2): two's-complement minimal octet 0xFE
        written.clear();
        {
            let mut tx = Channel::new(IoCursor::new(Vec::new()), &mut written);
            tx.send(&Message::BigInt(BigInt::from(-2))).unwrap();
        }
        assert_eq!(written, vec![0, 0, 0, 6, 1, 0, 0, 0, 1, 0xFE]);
    }

    #[test]
    fn test_eof_is_transport_closed() {
        let mut rx = Channel::new(IoCursor::new(vec![0u8, 0, 0]), Vec::new());
        assert!(matches!(rx.recv(), Err(HomomorphicError::TransportClosed)));
    }

    #[test]
    fn test_typed_receive_rejects_wrong_kind() {
        let mut written = Vec::new();
        {
            let mut tx = Channel::new(IoCursor::new(Vec::new()), &mut written);
            tx.send_bool(true).unwrap();
        }
        let mut rx = Channel::new(IoCursor::new(written), Vec::new());
        assert!(matches!(
            rx.recv_biguint(),
            Err(HomomorphicError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn test_negative_residue_rejected() {
        let mut written = Vec::new();
        {
            let mut tx = Channel::new(IoCursor::new(Vec::new()), &mut written);
            tx.send(&Message::BigInt(BigInt::from(-5))).unwrap();
        }
        let mut rx = Channel::new(IoCursor::new(written), Vec::new());
        assert!(matches!(
            rx.recv_biguint(),
            Err(HomomorphicError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut rx = Channel::new(IoCursor::new(vec![0u8, 0, 0, 1, 99]), Vec::new());
        assert!(matches!(
            rx.recv(),
            Err(HomomorphicError::ProtocolMismatch(_))
        ));
    }
}

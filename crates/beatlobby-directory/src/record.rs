//! The directory registration record and its codec.
//!
//! ## Layout (little-endian)
//!
//! ```text
//! +------+--------+-------+-----------+---------+------+-----------+------+--------+
//! | kind | id     | first | addr len  | address | port | name len  | name | remove |
//! | u8   | i32    | u8    | u16       | UTF-8   | u16  | u16       | UTF-8| u8     |
//! +------+--------+-------+-----------+---------+------+-----------+------+--------+
//! ```
//!
//! A whole record never exceeds [`MAX_RECORD_LEN`] bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::DirectoryError;

/// Upper bound on an encoded record, in bytes.
pub const MAX_RECORD_LEN: usize = 1024;

/// kind + id + first_connect
const HEAD_LEN: usize = 1 + 4 + 1;

/// Who is talking to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Client = 0,
    Server = 1,
}

impl TryFrom<u8> for ConnectionKind {
    type Error = DirectoryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Client),
            1 => Ok(Self::Server),
            other => Err(DirectoryError::InvalidRecord(format!(
                "unknown connection kind {other}"
            ))),
        }
    }
}

/// What a lobby server tells a directory about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub kind: ConnectionKind,
    /// Assigned by the directory; 0 until it has.
    pub id: i32,
    pub first_connect: bool,
    pub address: String,
    pub port: u16,
    pub name: String,
    /// Set only on the deregistration message.
    pub remove: bool,
}

impl RegistrationRecord {
    /// The first message of the handshake.
    pub fn register(address: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            kind: ConnectionKind::Server,
            id: 0,
            first_connect: true,
            address: address.into(),
            port,
            name: name.into(),
            remove: false,
        }
    }

    /// The message sent at shutdown to a directory that assigned `id`.
    pub fn deregister(
        id: i32,
        address: impl Into<String>,
        port: u16,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_connect: false,
            remove: true,
            ..Self::register(address, port, name)
        }
    }

    /// Size of this record once encoded.
    pub fn encoded_len(&self) -> usize {
        HEAD_LEN + 2 + self.address.len() + 2 + 2 + self.name.len() + 1
    }

    /// Encodes the record.
    ///
    /// # Errors
    /// [`DirectoryError::TooLarge`] if it would exceed [`MAX_RECORD_LEN`].
    pub fn encode(&self) -> Result<Bytes, DirectoryError> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    fn encode_into(&self, dst: &mut BytesMut) -> Result<(), DirectoryError> {
        let len = self.encoded_len();
        if len > MAX_RECORD_LEN {
            return Err(DirectoryError::TooLarge(len));
        }
        dst.reserve(len);
        dst.put_u8(self.kind as u8);
        dst.put_i32_le(self.id);
        dst.put_u8(u8::from(self.first_connect));
        // Both strings fit in a u16: the whole record is <= MAX_RECORD_LEN.
        dst.put_u16_le(self.address.len() as u16);
        dst.put_slice(self.address.as_bytes());
        dst.put_u16_le(self.port);
        dst.put_u16_le(self.name.len() as u16);
        dst.put_slice(self.name.as_bytes());
        dst.put_u8(u8::from(self.remove));
        Ok(())
    }

    /// Decodes exactly one record from `src`.
    ///
    /// # Errors
    /// Truncated input, trailing bytes, oversized input, or bad field values.
    pub fn decode(src: &[u8]) -> Result<Self, DirectoryError> {
        if src.len() > MAX_RECORD_LEN {
            return Err(DirectoryError::TooLarge(src.len()));
        }
        match Self::parse(src)? {
            Some((record, used)) if used == src.len() => Ok(record),
            Some((_, used)) => Err(DirectoryError::InvalidRecord(format!(
                "{} trailing bytes",
                src.len() - used
            ))),
            None => Err(DirectoryError::InvalidRecord("truncated record".into())),
        }
    }

    /// Parses one record from the front of `src`.
    ///
    /// `Ok(None)` means more bytes are needed. On success also returns how
    /// many bytes the record used.
    fn parse(src: &[u8]) -> Result<Option<(Self, usize)>, DirectoryError> {
        let mut buf = src;
        if buf.remaining() < HEAD_LEN {
            return Ok(None);
        }
        let kind = ConnectionKind::try_from(buf.get_u8())?;
        let id = buf.get_i32_le();
        let first_connect = read_flag(buf.get_u8())?;

        let Some(address) = read_string(&mut buf)? else {
            return Ok(None);
        };
        if buf.remaining() < 2 {
            return Ok(None);
        }
        let port = buf.get_u16_le();
        let Some(name) = read_string(&mut buf)? else {
            return Ok(None);
        };
        if buf.remaining() < 1 {
            return Ok(None);
        }
        let remove = read_flag(buf.get_u8())?;

        let used = src.len() - buf.remaining();
        let record = Self {
            kind,
            id,
            first_connect,
            address,
            port,
            name,
            remove,
        };
        Ok(Some((record, used)))
    }
}

fn read_flag(byte: u8) -> Result<bool, DirectoryError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DirectoryError::InvalidRecord(format!("bad flag byte {other}"))),
    }
}

fn read_string(buf: &mut &[u8]) -> Result<Option<String>, DirectoryError> {
    if buf.remaining() < 2 {
        return Ok(None);
    }
    let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    if buf.remaining() < 2 + len {
        return Ok(None);
    }
    buf.advance(2);
    let text = std::str::from_utf8(&buf[..len])
        .map_err(|e| DirectoryError::InvalidRecord(e.to_string()))?
        .to_owned();
    buf.advance(len);
    Ok(Some(text))
}

// ---------------------------------------------------------------------------
// RecordCodec
// ---------------------------------------------------------------------------

/// `tokio_util` codec for a stream of registration records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

impl Decoder for RecordCodec {
    type Item = RegistrationRecord;
    type Error = DirectoryError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match RegistrationRecord::parse(src)? {
            Some((record, used)) => {
                if used > MAX_RECORD_LEN {
                    return Err(DirectoryError::TooLarge(used));
                }
                src.advance(used);
                Ok(Some(record))
            }
            None if src.len() >= MAX_RECORD_LEN => Err(DirectoryError::TooLarge(src.len())),
            None => Ok(None),
        }
    }
}

impl Encoder<RegistrationRecord> for RecordCodec {
    type Error = DirectoryError;

    fn encode(&mut self, item: RegistrationRecord, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegistrationRecord {
        RegistrationRecord::register("203.0.113.9", 3700, "Friday Night Lobby")
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let mut record = sample();
        record.id = 17;
        let decoded = RegistrationRecord::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_deregister_sets_flags() {
        let record = RegistrationRecord::deregister(5, "10.0.0.1", 1, "x");
        assert_eq!(record.kind, ConnectionKind::Server);
        assert_eq!(record.id, 5);
        assert!(!record.first_connect);
        assert!(record.remove);
    }

    #[test]
    fn test_encode_exact_layout() {
        let record = RegistrationRecord::register("ab", 0x0102, "c");
        let bytes = record.encode().unwrap();
        assert_eq!(
            &bytes[..],
            &[1, 0, 0, 0, 0, 1, 2, 0, b'a', b'b', 0x02, 0x01, 1, 0, b'c', 0]
        );
        assert_eq!(bytes.len(), record.encoded_len());
    }

    #[test]
    fn test_encode_oversized_name_rejected() {
        let record = RegistrationRecord::register("1.2.3.4", 1, "n".repeat(MAX_RECORD_LEN));
        assert!(matches!(record.encode(), Err(DirectoryError::TooLarge(_))));
    }

    #[test]
    fn test_decode_truncated_is_error() {
        let bytes = sample().encode().unwrap();
        for cut in [0, 3, 8, bytes.len() - 1] {
            assert!(matches!(
                RegistrationRecord::decode(&bytes[..cut]),
                Err(DirectoryError::InvalidRecord(_))
            ));
        }
    }

    #[test]
    fn test_decode_trailing_bytes_is_error() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes.push(0);
        assert!(RegistrationRecord::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_unknown_kind_is_error() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes[0] = 9;
        assert!(matches!(
            RegistrationRecord::decode(&bytes),
            Err(DirectoryError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_decode_oversized_input_is_error() {
        let bytes = vec![0u8; MAX_RECORD_LEN + 1];
        assert!(matches!(
            RegistrationRecord::decode(&bytes),
            Err(DirectoryError::TooLarge(_))
        ));
    }

    #[test]
    fn test_codec_waits_for_full_record() {
        let bytes = sample().encode().unwrap();
        let mut codec = RecordCodec;
        let mut buf = BytesMut::from(&bytes[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[10..]);
        buf.extend_from_slice(&bytes[..4]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(sample()));
        // The start of the next record stays buffered.
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_codec_rejects_endless_garbage() {
        let mut codec = RecordCodec;
        // Address length claims 0xFFFF bytes, more than a record may hold.
        let mut buf = BytesMut::from(&[1u8, 0, 0, 0, 0, 1, 0xFF, 0xFF][..]);
        buf.extend_from_slice(&[b'x'; MAX_RECORD_LEN]);
        assert!(matches!(codec.decode(&mut buf), Err(DirectoryError::TooLarge(_))));
    }
}

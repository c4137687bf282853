use std::fmt;

use thiserror::Error;

/// Width of a blob identifier in bytes (HMAC-SHA256 output).
pub const ID_SIZE: usize = 32;

/// Errors decoding a textual blob id.
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("wrong id length: got {got} bytes, want {want}", want = ID_SIZE)]
    WrongLength { got: usize },
}

/// Opaque fixed-width blob identifier.
///
/// Two textual forms are used at the edges: lowercase hex for on-disk file
/// names and Base58 for URLs and upstream object names. In process the id is
/// always the raw 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId([u8; ID_SIZE]);

impl BlobId {
    pub fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build an id from a slice, rejecting wrong lengths.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdParseError> {
        let arr: [u8; ID_SIZE] = bytes
            .try_into()
            .map_err(|_| IdParseError::WrongLength { got: bytes.len() })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    /// First byte of the id, used to pick the cache bucket directory.
    pub fn bucket(&self) -> u8 {
        self.0[0]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, IdParseError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn from_base58(s: &str) -> Result<Self, IdParseError> {
        let bytes = bs58::decode(s).into_vec()?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn sample_id() -> BlobId {
        let mut bytes = [0u8; ID_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        BlobId::from_bytes(bytes)
    }

    #[test]
    fn hex_round_trip() {
        let id = sample_id();
        let hex = id.to_hex();
        assert_eq!(hex.len(), ID_SIZE * 2);
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(BlobId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn base58_round_trip() {
        let id = sample_id();
        let b58 = id.to_base58();
        assert_eq!(BlobId::from_base58(&b58).unwrap(), id);
    }

    #[rstest]
    #[case::empty("")]
    #[case::bad_alphabet("!!!!")]
    #[case::zero_and_bad("0OIl")]
    fn base58_rejects_invalid_alphabet(#[case] input: &str) {
        assert!(matches!(
            BlobId::from_base58(input),
            Err(IdParseError::Base58(_) | IdParseError::WrongLength { .. })
        ));
    }

    #[test]
    fn base58_rejects_wrong_length() {
        // Valid Base58, but decodes to fewer than 32 bytes.
        let err = BlobId::from_base58("2g").unwrap_err();
        assert!(matches!(err, IdParseError::WrongLength { got: 1 }));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(BlobId::from_slice(&[0u8; 31]).is_err());
        assert!(BlobId::from_slice(&[0u8; 33]).is_err());
        assert!(BlobId::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn bucket_is_first_byte() {
        let id = sample_id();
        assert_eq!(id.bucket(), 0);
        let mut bytes = *id.as_bytes();
        bytes[0] = 0xab;
        assert_eq!(BlobId::from_bytes(bytes).bucket(), 0xab);
    }
}

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::id::{BlobId, ID_SIZE};

/// Factory for keyed streaming hashers.
///
/// Carries the server secret; `build()` returns a fresh hasher with no
/// shared state, so builders can be handed out freely across tasks.
#[derive(Clone)]
pub struct HashBuilder {
    secret: Vec<u8>,
}

impl HashBuilder {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn build(&self) -> BlobHasher {
        BlobHasher {
            mac: Hmac::<Sha256>::new_from_slice(&self.secret)
                .expect("HMAC accepts keys of any length"),
        }
    }
}

impl std::fmt::Debug for HashBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashBuilder").finish_non_exhaustive()
    }
}

/// Streaming keyed hasher producing a [`BlobId`].
pub struct BlobHasher {
    mac: Hmac<Sha256>,
}

impl BlobHasher {
    pub fn update(&mut self, data: &[u8]) {
        self.mac.update(data);
    }

    pub fn finalize(self) -> BlobId {
        let digest = self.mac.finalize().into_bytes();
        let bytes: [u8; ID_SIZE] = digest.into();
        BlobId::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_all(builder: &HashBuilder, data: &[u8]) -> BlobId {
        let mut h = builder.build();
        h.update(data);
        h.finalize()
    }

    #[test]
    fn same_bytes_same_id() {
        let builder = HashBuilder::new(b"secret".to_vec());
        assert_eq!(hash_all(&builder, b"hello"), hash_all(&builder, b"hello"));
    }

    #[test]
    fn different_bytes_different_id() {
        let builder = HashBuilder::new(b"secret".to_vec());
        assert_ne!(hash_all(&builder, b"hello"), hash_all(&builder, b"world"));
    }

    #[test]
    fn different_secrets_different_id() {
        let a = HashBuilder::new(b"secret-a".to_vec());
        let b = HashBuilder::new(b"secret-b".to_vec());
        assert_ne!(hash_all(&a, b"hello"), hash_all(&b, b"hello"));
    }

    #[test]
    fn streaming_matches_one_shot() {
        let builder = HashBuilder::new(b"secret".to_vec());
        let mut h = builder.build();
        h.update(b"he");
        h.update(b"ll");
        h.update(b"o");
        assert_eq!(h.finalize(), hash_all(&builder, b"hello"));
    }

    #[test]
    fn empty_input_hashes() {
        let builder = HashBuilder::new(b"secret".to_vec());
        let id = hash_all(&builder, b"");
        assert_eq!(id.as_bytes().len(), ID_SIZE);
    }

    #[test]
    fn empty_secret_is_accepted() {
        let builder = HashBuilder::new(Vec::new());
        let _ = hash_all(&builder, b"hello");
    }
}

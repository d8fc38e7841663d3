use alloy_primitives::{Signature, U256};

/// The length of a report signature: `r`, `s` and the recovery id.
pub const SIGNATURE_LENGTH: usize = 65;

/// Trait for custom signature byte representation
pub trait SignatureAsBytes: Sized {
    /// Returns `r ++ s ++ v`, with `v` the raw recovery id (0 or 1) rather than the
    /// `+ 27` offset form.
    fn sig_as_bytes(&self) -> [u8; SIGNATURE_LENGTH];

    /// Parses a signature encoded by [`SignatureAsBytes::sig_as_bytes`]. Both the raw and the
    /// `+ 27` recovery ids are accepted.
    fn sig_from_bytes(bytes: &[u8]) -> Option<Self>;
}

impl SignatureAsBytes for Signature {
    #[inline]
    fn sig_as_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut sig = [0u8; SIGNATURE_LENGTH];
        sig[..32].copy_from_slice(&self.r().to_be_bytes::<32>());
        sig[32..64].copy_from_slice(&self.s().to_be_bytes::<32>());
        sig[64] = self.v() as u8;
        sig
    }

    fn sig_from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; SIGNATURE_LENGTH] = bytes.try_into().ok()?;
        let parity = match bytes[64] {
            0 | 27 => false,
            1 | 28 => true,
            _ => return None,
        };
        let r = U256::from_be_slice(&bytes[..32]);
        let s = U256::from_be_slice(&bytes[32..64]);
        Some(Self::new(r, s, parity))
    }
}

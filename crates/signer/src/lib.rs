//! The onchain keyring signing the reports transmitted to the registry.
//!
//! The keyring is generic and can use any implementation of the `Signer` trait from the
//! `alloy_signer` crate, including local and remote signers such as AWS KMS. Reports are signed
//! over a digest binding them to the report context, and signatures are verified by recovering
//! the signer address from the same digest.

use std::time::Instant;

use alloy_primitives::{keccak256, Address, Bytes, Signature, B256};

mod error;
pub use error::KeyringError;

mod metrics;
pub use metrics::KeyringMetrics;

mod signature;
pub use signature::{SignatureAsBytes, SIGNATURE_LENGTH};

/// The context a report was produced in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportContext {
    /// The digest of the configuration the report was produced under.
    pub config_digest: B256,
    /// The epoch of the report.
    pub epoch: u32,
    /// The round of the report within the epoch.
    pub round: u8,
    /// Extra data committed to by the report.
    pub extra_hash: B256,
}

/// Returns the digest signed for the report in the context:
/// `keccak256(keccak256(report) ++ config_digest ++ 27 zero bytes ++ epoch ++ round ++ extra_hash)`
/// with the epoch encoded as 4 big endian bytes.
pub fn report_digest(context: &ReportContext, report: &[u8]) -> B256 {
    let mut preimage = Vec::with_capacity(32 + 32 + 27 + 4 + 1 + 32);
    preimage.extend_from_slice(keccak256(report).as_slice());
    preimage.extend_from_slice(context.config_digest.as_slice());
    preimage.extend_from_slice(&[0u8; 27]);
    preimage.extend_from_slice(&context.epoch.to_be_bytes());
    preimage.push(context.round);
    preimage.extend_from_slice(context.extra_hash.as_slice());
    keccak256(preimage)
}

/// Returns true if the signature of the report in the context was produced by the key.
pub fn verify_report(
    public_key: Address,
    context: &ReportContext,
    report: &[u8],
    signature: &[u8],
) -> bool {
    let Some(signature) = Signature::sig_from_bytes(signature) else {
        return false;
    };
    signature
        .recover_address_from_prehash(&report_digest(context, report))
        .is_ok_and(|recovered| recovered == public_key)
}

/// Signs reports with the key of the node.
pub struct OnchainKeyring<S> {
    /// The signer instance.
    signer: S,
    /// The keyring metrics.
    metrics: KeyringMetrics,
}

impl<S> OnchainKeyring<S>
where
    S: alloy_signer::Signer<Signature> + Send + Sync,
{
    /// Creates a new [`OnchainKeyring`] with the provided signer.
    pub fn new(signer: S) -> Self {
        Self { signer, metrics: KeyringMetrics::default() }
    }

    /// Returns the public key of the keyring, the address of the signer.
    pub fn public_key(&self) -> Address {
        self.signer.address()
    }

    /// Returns the length of the signatures produced by the keyring.
    pub const fn max_signature_length(&self) -> usize {
        SIGNATURE_LENGTH
    }

    /// Signs the report in the context, returning the 65 bytes signature.
    pub async fn sign(
        &self,
        context: &ReportContext,
        report: &[u8],
    ) -> Result<Bytes, KeyringError> {
        let digest = report_digest(context, report);
        let now = Instant::now();
        let signature = self.signer.sign_hash(&digest).await.inspect_err(|err| {
            self.metrics.signing_failures.increment(1);
            tracing::error!(target: "automation::signer", epoch = context.epoch, round = context.round, ?err, "failed to sign report");
        })?;
        self.metrics.signing_duration.record(now.elapsed().as_secs_f64());
        tracing::trace!(target: "automation::signer", epoch = context.epoch, round = context.round, %digest, "signed report");
        Ok(Bytes::copy_from_slice(&signature.sig_as_bytes()))
    }
}

impl<S> std::fmt::Debug for OnchainKeyring<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnchainKeyring").field("signer", &"alloy_signer::Signer").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer_local::PrivateKeySigner;

    fn context() -> ReportContext {
        ReportContext {
            config_digest: B256::repeat_byte(0x11),
            epoch: 7,
            round: 3,
            extra_hash: B256::repeat_byte(0x22),
        }
    }

    #[test]
    fn test_report_digest_layout() {
        let context = context();
        let report = b"report";

        let mut preimage = keccak256(report).to_vec();
        preimage.extend_from_slice(&[0x11; 32]);
        preimage.extend_from_slice(&[0; 27]);
        preimage.extend_from_slice(&[0, 0, 0, 7]);
        preimage.push(3);
        preimage.extend_from_slice(&[0x22; 32]);

        assert_eq!(report_digest(&context, report), keccak256(preimage));
        assert_ne!(
            report_digest(&ReportContext { round: 4, ..context }, report),
            report_digest(&context, report)
        );
    }

    #[tokio::test]
    async fn test_sign_and_verify_report() -> eyre::Result<()> {
        // Given
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        let keyring = OnchainKeyring::new(signer);
        let context = context();

        // When
        let signature = keyring.sign(&context, b"report").await?;

        // Then
        assert_eq!(keyring.public_key(), address);
        assert_eq!(signature.len(), keyring.max_signature_length());
        assert!(signature[64] <= 1);
        assert!(verify_report(address, &context, b"report", &signature));
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_mismatching_signatures() -> eyre::Result<()> {
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        let keyring = OnchainKeyring::new(signer);
        let context = context();
        let signature = keyring.sign(&context, b"report").await?;
        let verify = verify_report;

        assert!(!verify(address, &context, b"other report", &signature));
        assert!(!verify(address, &ReportContext { epoch: 8, ..context }, b"report", &signature));
        assert!(!verify(PrivateKeySigner::random().address(), &context, b"report", &signature));
        assert!(!verify(address, &context, b"report", &signature[..64]));

        let mut offset = signature.to_vec();
        offset[64] += 27;
        assert!(verify(address, &context, b"report", &offset));
        offset[64] = 5;
        assert!(!verify(address, &context, b"report", &offset));
        Ok(())
    }
}

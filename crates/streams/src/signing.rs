use crate::StreamsError;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// The header carrying the client id.
pub(crate) const HEADER_AUTHORIZATION: &str = "Authorization";
/// The header carrying the request timestamp in milliseconds.
pub(crate) const HEADER_TIMESTAMP: &str = "X-Authorization-Timestamp";
/// The header carrying the hex encoded request signature.
pub(crate) const HEADER_SIGNATURE: &str = "X-Authorization-Signature-SHA256";
/// The header carrying the upkeep the bulk request is made for.
pub(crate) const HEADER_UPKEEP_ID: &str = "X-Authorization-Upkeep-Id";

/// Returns the hex encoded HMAC-SHA256 of the request, keyed with the secret.
///
/// The signed message is `"{method} {path} {sha256(body)} {client_id} {timestamp}"`, where the
/// path includes the query string.
pub(crate) fn sign_request(
    method: &str,
    path: &str,
    body: &[u8],
    client_id: &str,
    timestamp: u64,
    secret: &str,
) -> Result<String, StreamsError> {
    let body_hash = hex::encode(Sha256::digest(body));
    let message = format!("{method} {path} {body_hash} {client_id} {timestamp}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| StreamsError::InvalidKey)?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Returns the authentication headers of a GET request to the path.
pub(crate) fn auth_headers(
    path: &str,
    client_id: &str,
    secret: &str,
    timestamp: u64,
) -> Result<Vec<(String, String)>, StreamsError> {
    let signature = sign_request("GET", path, &[], client_id, timestamp, secret)?;
    Ok(vec![
        (HEADER_AUTHORIZATION.to_string(), client_id.to_string()),
        (HEADER_TIMESTAMP.to_string(), timestamp.to_string()),
        (HEADER_SIGNATURE.to_string(), signature),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_sign_deterministically() {
        let path = "/client?feedIdHex=0x01&blockNumber=10";
        let a = sign_request("GET", path, &[], "client", 1_700_000_000_000, "secret").unwrap();
        let b = sign_request("GET", path, &[], "client", 1_700_000_000_000, "secret").unwrap();
        let c = sign_request("GET", path, &[], "client", 1_700_000_000_001, "secret").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_should_hash_empty_body() {
        // sha256 of the empty string.
        assert_eq!(
            hex::encode(Sha256::digest([])),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_should_build_auth_headers() {
        let headers = auth_headers("/path", "client", "secret", 42).unwrap();
        let names: Vec<_> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![HEADER_AUTHORIZATION, HEADER_TIMESTAMP, HEADER_SIGNATURE]);
        assert_eq!(headers[0].1, "client");
        assert_eq!(headers[1].1, "42");
    }
}

//! Memory integrity signatures
//!
//! HMAC-SHA256 over the immutable creation-time fields, base64-encoded.
//! Integrity-only: a mismatch marks the record untrusted at load time but
//! never fails the load.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::Memory;

type HmacSha256 = Hmac<Sha256>;

/// Canonical byte string covered by the signature. Mutable fields (content,
/// confidence, last_accessed, ...) are excluded so gist compression and
/// touch updates do not invalidate the record.
fn canonical_fields(memory: &Memory) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}",
        memory.id,
        memory.agent_id,
        memory.region.as_str(),
        memory.project_id.as_deref().unwrap_or(""),
        memory.kind.as_str(),
        memory.original_content,
        memory.created_at.to_rfc3339(),
    )
}

/// Sign a memory with the agent's key.
pub fn sign_memory(memory: &Memory, signing_key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(canonical_fields(memory).as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verify a memory's signature against the agent's key.
///
/// Unsigned memories verify trivially (there is nothing to check).
pub fn verify_signature(memory: &Memory, signing_key: &str) -> bool {
    let Some(signature) = memory.signature.as_deref() else {
        return true;
    };
    let Ok(expected) = BASE64.decode(signature) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(canonical_fields(memory).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Whether a loaded memory should be verified: the agent has a key and the
/// memory carries a signature.
pub fn should_verify(memory: &Memory, signing_key: Option<&str>) -> bool {
    signing_key.is_some_and(|k| !k.is_empty()) && memory.signature.is_some()
}

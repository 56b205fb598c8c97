//! Signed checkpoints
//!
//! A checkpoint binds a tree size to its root hash. The body is three text
//! lines — origin, decimal size, base64 root — and the published form is a
//! signed note: the body, a blank line, then one signature line per signer:
//!
//! ```text
//! example.com/log
//! 42
//! qINS1GnehWZd1DQuZkqHasnJmOcWAgnRSjqzG5zUAmk=
//!
//! — example.com/log 3mpwXgQAYv0CRmHcdAhbTFRXrTBCZtpIE3GHMShvX0YgWo6EGPtnAx1+kKNpriZopL+wTm3o9aUNSmmJ5CiGaAY=
//! ```
//!
//! The engine treats signing as a black box behind [`CheckpointSigner`];
//! the Ed25519 implementation here prefixes each signature with a four-byte
//! key id so notes stay self-describing across key rotations.

use crate::error::{Error, Result};
use crate::hash::{Hash, HASH_SIZE};
use base64::prelude::*;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// A parsed checkpoint body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// UTF-8 identifier of the log.
    pub origin: String,
    /// Tree size the checkpoint commits to.
    pub size: u64,
    /// Merkle root over the first `size` leaves.
    pub root: Hash,
}

impl Checkpoint {
    /// Serialize the body: `<origin>\n<size>\n<base64(root)>\n`.
    pub fn marshal(&self) -> Vec<u8> {
        format!(
            "{}\n{}\n{}\n",
            self.origin,
            self.size,
            BASE64_STANDARD.encode(self.root)
        )
        .into_bytes()
    }

    /// Parse a checkpoint body.
    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|_| Error::malformed_checkpoint("body is not UTF-8"))?;
        let mut lines = text.split('\n');
        let origin = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::malformed_checkpoint("missing origin line"))?
            .to_string();
        let size: u64 = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| Error::malformed_checkpoint("bad size line"))?;
        let root_b64 = lines
            .next()
            .ok_or_else(|| Error::malformed_checkpoint("missing root line"))?;
        let root_bytes = BASE64_STANDARD
            .decode(root_b64)
            .map_err(|e| Error::malformed_checkpoint(format!("bad root encoding: {e}")))?;
        if root_bytes.len() != HASH_SIZE {
            return Err(Error::malformed_checkpoint(format!(
                "root is {} bytes, want {HASH_SIZE}",
                root_bytes.len()
            )));
        }
        let mut root = [0u8; HASH_SIZE];
        root.copy_from_slice(&root_bytes);
        // The body is exactly three newline-terminated lines.
        if lines.next() != Some("") || lines.next().is_some() {
            return Err(Error::malformed_checkpoint("trailing data after root line"));
        }
        Ok(Self { origin, size, root })
    }
}

/// Black-box checkpoint signing capability.
pub trait CheckpointSigner: Send + Sync {
    /// Key name recorded on the signature line.
    fn name(&self) -> &str;
    /// Sign the note body.
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>>;
}

/// Black-box checkpoint verification capability.
pub trait CheckpointVerifier: Send + Sync {
    /// Key name this verifier matches against.
    fn name(&self) -> &str;
    /// Verify one signature over the note body.
    fn verify(&self, msg: &[u8], sig: &[u8]) -> bool;
}

/// Assemble a signed note: body, blank line, one signature line per signer.
pub fn sign_note(checkpoint: &Checkpoint, signers: &[&dyn CheckpointSigner]) -> Result<Vec<u8>> {
    if signers.is_empty() {
        return Err(Error::signature("a note needs at least one signer"));
    }
    let body = checkpoint.marshal();
    let mut note = body.clone();
    note.push(b'\n');
    for signer in signers {
        let sig = signer.sign(&body)?;
        let line = format!("\u{2014} {} {}\n", signer.name(), BASE64_STANDARD.encode(sig));
        note.extend_from_slice(line.as_bytes());
    }
    Ok(note)
}

/// Split a note into its body (newline-terminated) and signature lines.
fn split_note(note: &[u8]) -> Result<(&[u8], Vec<&str>)> {
    let text = std::str::from_utf8(note)
        .map_err(|_| Error::malformed_checkpoint("note is not UTF-8"))?;
    let sep = text
        .find("\n\n")
        .ok_or_else(|| Error::malformed_checkpoint("missing signature separator"))?;
    let body = &note[..sep + 1];
    let sig_block = &text[sep + 2..];
    let mut sigs = Vec::new();
    for line in sig_block.split('\n') {
        if line.is_empty() {
            continue;
        }
        sigs.push(line);
    }
    if sigs.is_empty() {
        return Err(Error::malformed_checkpoint("note carries no signatures"));
    }
    Ok((body, sigs))
}

/// Open a signed note: require at least one signature line whose name
/// matches `verifier` and whose signature checks out, then parse the body.
pub fn open_note(note: &[u8], verifier: &dyn CheckpointVerifier) -> Result<Checkpoint> {
    let (body, sig_lines) = split_note(note)?;
    for line in sig_lines {
        let mut parts = line.splitn(3, ' ');
        let (dash, name, sig_b64) = (parts.next(), parts.next(), parts.next());
        if dash != Some("\u{2014}") {
            return Err(Error::malformed_checkpoint(format!(
                "bad signature line {line:?}"
            )));
        }
        let (Some(name), Some(sig_b64)) = (name, sig_b64) else {
            return Err(Error::malformed_checkpoint(format!(
                "bad signature line {line:?}"
            )));
        };
        if name != verifier.name() {
            continue;
        }
        let sig = BASE64_STANDARD
            .decode(sig_b64)
            .map_err(|e| Error::malformed_checkpoint(format!("bad signature encoding: {e}")))?;
        if verifier.verify(body, &sig) {
            return Checkpoint::unmarshal(body);
        }
        return Err(Error::signature(format!(
            "signature by {name} failed verification"
        )));
    }
    Err(Error::signature(format!(
        "no signature by {}",
        verifier.name()
    )))
}

/// Four-byte key id: `SHA-256(name || '\n' || 0x01 || public_key)[..4]`.
fn key_id(name: &str, public_key: &VerifyingKey) -> [u8; 4] {
    let mut h = Sha256::new();
    h.update(name.as_bytes());
    h.update([b'\n', 0x01]);
    h.update(public_key.as_bytes());
    let digest = h.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Ed25519 checkpoint signer. Signatures carry the key id prefix.
pub struct Ed25519CheckpointSigner {
    name: String,
    key: SigningKey,
    id: [u8; 4],
}

impl Ed25519CheckpointSigner {
    /// Create a signer from a key name and 32-byte seed.
    pub fn new(name: impl Into<String>, key: SigningKey) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains(['\n', ' ']) {
            return Err(Error::signature(format!("invalid key name {name:?}")));
        }
        let id = key_id(&name, &key.verifying_key());
        Ok(Self { name, key, id })
    }

    /// The matching verifier.
    pub fn verifier(&self) -> Ed25519CheckpointVerifier {
        Ed25519CheckpointVerifier {
            name: self.name.clone(),
            key: self.key.verifying_key(),
            id: self.id,
        }
    }
}

impl std::fmt::Debug for Ed25519CheckpointSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519CheckpointSigner")
            .field("name", &self.name)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CheckpointSigner for Ed25519CheckpointSigner {
    fn name(&self) -> &str {
        &self.name
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let sig = self.key.sign(msg);
        let mut out = Vec::with_capacity(4 + 64);
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&sig.to_bytes());
        Ok(out)
    }
}

/// Ed25519 checkpoint verifier.
#[derive(Debug, Clone)]
pub struct Ed25519CheckpointVerifier {
    name: String,
    key: VerifyingKey,
    id: [u8; 4],
}

impl Ed25519CheckpointVerifier {
    /// Create a verifier from a key name and public key.
    pub fn new(name: impl Into<String>, key: VerifyingKey) -> Self {
        let name = name.into();
        let id = key_id(&name, &key);
        Self { name, key, id }
    }
}

impl CheckpointVerifier for Ed25519CheckpointVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        if sig.len() != 4 + 64 || sig[..4] != self.id {
            return false;
        }
        let Ok(signature) = Signature::from_slice(&sig[4..]) else {
            return false;
        };
        self.key.verify(msg, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::empty_root;

    fn test_signer() -> Ed25519CheckpointSigner {
        // Deterministic seed for testing.
        let key = SigningKey::from_bytes(&[7u8; 32]);
        Ed25519CheckpointSigner::new("example.com/log", key).unwrap()
    }

    fn test_checkpoint() -> Checkpoint {
        Checkpoint {
            origin: "example.com/log".to_string(),
            size: 42,
            root: empty_root(),
        }
    }

    #[test]
    fn test_body_golden() {
        let body = test_checkpoint().marshal();
        assert_eq!(
            body,
            b"example.com/log\n42\n47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=\n"
        );
    }

    #[test]
    fn test_body_round_trip() {
        let cp = test_checkpoint();
        assert_eq!(Checkpoint::unmarshal(&cp.marshal()).unwrap(), cp);
    }

    #[test]
    fn test_unmarshal_rejects_garbage() {
        assert!(Checkpoint::unmarshal(b"").is_err());
        assert!(Checkpoint::unmarshal(b"\n42\nAAAA\n").is_err());
        assert!(Checkpoint::unmarshal(b"o\nnot-a-number\nAAAA\n").is_err());
        assert!(Checkpoint::unmarshal(b"o\n42\nshort\n").is_err());
        // Missing trailing newline.
        let mut body = test_checkpoint().marshal();
        body.pop();
        assert!(Checkpoint::unmarshal(&body).is_err());
        // Trailing junk.
        let mut body = test_checkpoint().marshal();
        body.extend_from_slice(b"junk\n");
        assert!(Checkpoint::unmarshal(&body).is_err());
    }

    #[test]
    fn test_sign_and_open() {
        let signer = test_signer();
        let cp = test_checkpoint();
        let note = sign_note(&cp, &[&signer]).unwrap();

        let opened = open_note(&note, &signer.verifier()).unwrap();
        assert_eq!(opened, cp);
    }

    #[test]
    fn test_open_rejects_tampered_body() {
        let signer = test_signer();
        let note = sign_note(&test_checkpoint(), &[&signer]).unwrap();
        let tampered = String::from_utf8(note).unwrap().replace("42", "43");
        assert!(open_note(tampered.as_bytes(), &signer.verifier()).is_err());
    }

    #[test]
    fn test_open_rejects_unknown_key() {
        let signer = test_signer();
        let note = sign_note(&test_checkpoint(), &[&signer]).unwrap();

        let other = Ed25519CheckpointSigner::new(
            "other.example/log",
            SigningKey::from_bytes(&[9u8; 32]),
        )
        .unwrap();
        assert!(open_note(&note, &other.verifier()).is_err());
    }

    #[test]
    fn test_signer_rejects_bad_names() {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        assert!(Ed25519CheckpointSigner::new("", key.clone()).is_err());
        assert!(Ed25519CheckpointSigner::new("has space", key.clone()).is_err());
        assert!(Ed25519CheckpointSigner::new("has\nnewline", key).is_err());
    }
}

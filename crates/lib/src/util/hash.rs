//! Hashing utilities for collision-free output naming.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::consts::OBJ_DIGEST_LEN;

/// Short, stable digest of a path, used to keep object file names unique when
/// two sources share a stem (`a/util.c` and `b/util.c`).
///
/// Separators are normalized so the digest is the same on every host.
pub fn path_digest(path: &Path) -> String {
  let normalized = path.to_string_lossy().replace('\\', "/");
  let digest = Sha256::digest(normalized.as_bytes());
  let mut encoded = hex::encode(digest);
  encoded.truncate(OBJ_DIGEST_LEN);
  encoded
}

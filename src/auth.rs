use axum::http::{header::AUTHORIZATION, HeaderMap};
use sha2::{Digest, Sha256};

fn digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison.
/// Runs in time dependent only on the length of the inputs.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Validates API keys against the configured set. Only SHA-256 digests of
/// the keys are held, and candidates are compared digest to digest so every
/// comparison has the same length.
#[derive(Clone)]
pub struct ApiKeyValidator {
    digests: Vec<String>,
}

impl ApiKeyValidator {
    pub fn new(keys: &[String]) -> Self {
        Self {
            digests: keys
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(digest)
                .collect(),
        }
    }

    pub fn is_valid(&self, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate.map(str::trim).filter(|c| !c.is_empty()) else {
            return false;
        };
        let candidate = digest(candidate);

        // Check every digest, no early exit
        self.digests
            .iter()
            .fold(false, |found, d| constant_time_compare(d, &candidate) | found)
    }

    pub fn key_count(&self) -> usize {
        self.digests.len()
    }
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

//! Run identifiers used to namespace every resource a run creates.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, ProbeResult};

/// Default identifier length. 36^8 ≈ 2.8e12 possible values.
pub const DEFAULT_RUN_ID_LENGTH: usize = 8;

const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte.
const ACCEPT_BELOW: u8 = 252;

/// Bounded refills so a broken source cannot spin forever.
const MAX_REFILLS: usize = 16;

/// Lowercase alphanumeric run identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Validate an externally supplied identifier.
    pub fn parse(value: &str) -> ProbeResult<Self> {
        if value.is_empty() || !value.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(ProbeError::Config(format!(
                "run id must be non-empty lowercase alphanumeric: {:?}",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a run identifier from the operating system's CSPRNG.
pub fn generate(length: usize) -> ProbeResult<RunId> {
    generate_with(&mut OsRng, length)
}

/// Generate a run identifier from `rng` using rejection sampling.
pub fn generate_with<R: RngCore>(rng: &mut R, length: usize) -> ProbeResult<RunId> {
    if length == 0 {
        return Err(ProbeError::Config("run id length must be positive".to_string()));
    }

    let mut id = String::with_capacity(length);
    let mut buf = vec![0u8; length * 2];
    for _ in 0..MAX_REFILLS {
        rng.try_fill_bytes(&mut buf)
            .map_err(|e| ProbeError::ResourceExhausted(e.to_string()))?;
        for &byte in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            id.push(ALPHABET[usize::from(byte % 36)] as char);
            if id.len() == length {
                return Ok(RunId(id));
            }
        }
    }

    Err(ProbeError::ResourceExhausted(
        "entropy source produced too few usable bytes".to_string(),
    ))
}

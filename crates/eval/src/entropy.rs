//! Deterministic stand-ins for UUIDs and random numbers.
//!
//! Local runs must be repeatable, so every "random" value is derived from a
//! seed string describing where it was requested.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

fn digest(seed: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(seed.as_bytes()));
    out
}

/// A version-4 formatted UUID derived from `seed`.
pub fn uuid(seed: &str) -> String {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest(seed)[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

pub fn rng_from_seed(seed: &str) -> StdRng {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest(seed)[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(head))
}

/// Integer in `[start, end)`; `start` when the range is empty.
pub fn random_int(rng: &mut StdRng, start: i64, end: i64) -> i64 {
    if end <= start {
        return start;
    }
    rng.gen_range(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_stable_and_well_formed() {
        let a = uuid("exec|Map[0]|Task|uuid");
        assert_eq!(a, uuid("exec|Map[0]|Task|uuid"));
        assert_ne!(a, uuid("exec|Map[1]|Task|uuid"));
        assert_eq!(a.len(), 36);
        assert_eq!(&a[14..15], "4");
    }

    #[test]
    fn seeded_random_repeats() {
        let x = random_int(&mut rng_from_seed("s"), 0, 100);
        let y = random_int(&mut rng_from_seed("s"), 0, 100);
        assert_eq!(x, y);
        assert!((0..100).contains(&x));
        assert_eq!(random_int(&mut rng_from_seed("s"), 5, 5), 5);
    }
}

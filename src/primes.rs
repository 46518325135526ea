//! Bucket table sizing.
//!
//! Bucket indices are `hash % len`, so table lengths are primes. Sizes up to
//! a few million come from a fixed table; anything larger is found by trial
//! division.

use tracing::debug;

/// Largest prime table length, mirrors the largest array a 32-bit length field
/// can describe with some headroom.
pub const MAX_PRIME_ARRAY_LENGTH: usize = 0x7FFF_FFC3;

/// Candidates with `(p - 1) % HASH_PRIME == 0` are skipped by the fallback
/// search, so that a common hash multiplier does not collapse onto one bucket.
pub const HASH_PRIME: usize = 101;

/// Ascending primes, roughly 1.2x apart.
pub const PRIMES: &[usize] = &[
    3, 7, 11, 17, 23, 29, 37, 47, 59, 71, 89, 107, 131, 163, 197, 239, 293, 353, 431, 521, 631,
    761, 919, 1103, 1327, 1597, 1931, 2333, 2801, 3371, 4049, 4861, 5839, 7013, 8419, 10103,
    12143, 14591, 17519, 21023, 25229, 30293, 36353, 43627, 52361, 62851, 75431, 90523, 108631,
    130363, 156437, 187751, 225307, 270371, 324449, 389357, 467237, 560689, 672827, 807403,
    968897, 1162687, 1395263, 1674319, 2009191, 2411033, 2893249, 3471899, 4166287, 4999559,
    5999471, 7199369,
];

/// Trial division over odd divisors up to `sqrt(candidate)`.
pub fn is_prime(candidate: usize) -> bool {
    if candidate & 1 == 0 {
        return candidate == 2;
    }
    if candidate < 3 {
        return false;
    }
    let mut divisor = 3;
    while divisor <= candidate / divisor {
        if candidate % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Smallest usable prime `>= min`.
pub fn get_prime(min: usize) -> usize {
    if let Some(&p) = PRIMES.iter().find(|&&p| p >= min) {
        return p;
    }
    debug!(min, "prime table exhausted, searching by trial division");
    search_prime(min)
}

/// The trial division path of [`get_prime`], exposed so both paths can be
/// checked against each other.
pub fn search_prime(min: usize) -> usize {
    let mut candidate = min | 1;
    while candidate < i32::MAX as usize {
        if is_prime(candidate) && (candidate - 1) % HASH_PRIME != 0 {
            return candidate;
        }
        candidate += 2;
    }
    min
}

/// Size to grow to from `old_size`: a prime at least twice as large,
/// saturating at [`MAX_PRIME_ARRAY_LENGTH`].
pub fn expand_prime(old_size: usize) -> usize {
    let new_size = old_size.saturating_mul(2);
    if new_size > MAX_PRIME_ARRAY_LENGTH {
        return MAX_PRIME_ARRAY_LENGTH;
    }
    get_prime(new_size)
}

//! Deterministic user → payload bucket assignment.
//!
//! A key is hashed with 32-bit FNV-1a and reduced modulo the number of
//! variants. The result depends only on the key bytes and the variant count,
//! so it is identical across restarts, hosts and implementations. Changing
//! the variant count reshuffles most users; that is accepted.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the raw bytes of `key`.
pub fn fnv1a_32(key: &[u8]) -> u32 {
    key.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Map `key` to a bucket in `[0, variant_count)`.
///
/// # Panics
///
/// Panics if `variant_count` is zero. A loaded [`PayloadStore`] is never
/// empty, so callers going through the store cannot hit this.
///
/// [`PayloadStore`]: crate::payload::PayloadStore
pub fn assign(key: &str, variant_count: usize) -> usize {
    assert!(variant_count > 0, "assign called with zero variants");
    (u64::from(fnv1a_32(key.as_bytes())) % variant_count as u64) as usize
}

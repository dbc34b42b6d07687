//! 32-bit FNV-1a, the key hash shared by the hashing routers.

const FNV_OFFSET_BASIS_32: u32 = 0x811c_9dc5;
const FNV_PRIME_32: u32 = 0x0100_0193;

/// FNV-1a over raw bytes.
#[inline]
pub fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS_32;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}

/// Index of `key` in a ring of `len` slots.
#[inline]
pub fn slot_for(key: &str, len: usize) -> usize {
    fnv1a_32(key.as_bytes()) as usize % len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_vectors() {
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_slot_in_range() {
        for len in 1..20 {
            for key in ["a", "b", "resource-17", ""] {
                assert!(slot_for(key, len) < len);
            }
        }
    }
}

//! Murmur3 32-bit hash.
//!
//! Fast non-cryptographic hash used as a pure-functional pseudo-random
//! source for level assignment, so that an item's graph level depends only
//! on its identifier.

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;
const R1: u32 = 15;
const R2: u32 = 13;
const M: u32 = 5;
const N: u32 = 0xe654_6b64;

/// Computes the 32-bit Murmur3 hash of `data` with the given seed.
pub fn hash32(data: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    let nblocks = data.len() / 4;

    for block in data.chunks_exact(4) {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        hash = mix(k, hash);
    }

    // Tail: up to 3 trailing bytes
    let tail = &data[nblocks * 4..];
    if !tail.is_empty() {
        let mut k1: u32 = 0;
        for (i, &byte) in tail.iter().enumerate() {
            k1 ^= (byte as u32) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(R1);
        k1 = k1.wrapping_mul(C2);
        hash ^= k1;
    }

    fmix(hash ^ data.len() as u32)
}

#[inline]
fn mix(mut k: u32, hash: u32) -> u32 {
    k = k.wrapping_mul(C1);
    k = k.rotate_left(R1);
    k = k.wrapping_mul(C2);
    (hash ^ k).rotate_left(R2).wrapping_mul(M).wrapping_add(N)
}

#[inline]
fn fmix(mut hash: u32) -> u32 {
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85eb_ca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2_ae35);
    hash ^= hash >> 16;
    hash
}

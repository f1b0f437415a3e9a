//! CRC-24 validation and bounded bit-error correction for Mode S messages.
//!
//! ICAO standard polynomial: x^24 + x^23 + x^22 + ... + x^10 + x^3 + 1
//! Generator: 0xFFF409
//!
//! For DF11/17/18 the last 24 bits are pure parity, so a valid message leaves
//! a zero residual. For DF0/4/5/16/20/21 the parity is XOR'd with the
//! address, so the residual *is* the address.

use std::collections::HashMap;
use std::sync::LazyLock;

const GENERATOR: u32 = 0xFFF409;

/// Bits 0-4 hold the downlink format and are never corrected.
const DF_BITS: usize = 5;

// ---------------------------------------------------------------------------
// CRC lookup table (compile-time)
// ---------------------------------------------------------------------------

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x800000 != 0 {
                crc = (crc << 1) ^ GENERATOR;
            } else {
                crc <<= 1;
            }
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

/// Mode S CRC-24 residual: polynomial division of all but the last three
/// bytes, XOR'd with the parity field.
pub fn crc24(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        return data.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32) & 0xFFFFFF;
    }

    let payload_len = data.len() - 3;
    let mut crc = 0u32;
    for &byte in &data[..payload_len] {
        crc = ((crc << 8) ^ CRC_TABLE[((crc >> 16) ^ byte as u32) as usize & 0xFF]) & 0xFFFFFF;
    }

    crc ^ ((data[payload_len] as u32) << 16
        | (data[payload_len + 1] as u32) << 8
        | data[payload_len + 2] as u32)
}

// ---------------------------------------------------------------------------
// Error correction
// ---------------------------------------------------------------------------

/// How hard to try repairing a message whose residual is wrong.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BitFix {
    /// Reject anything with a bad residual.
    #[default]
    Off,
    /// Repair single-bit errors.
    Single,
    /// Repair up to two bits in long messages, one in short ones.
    Aggressive,
}

impl BitFix {
    /// Most bits this policy may flip in a message of `n_bits`.
    pub fn max_bits(self, n_bits: usize) -> usize {
        match self {
            BitFix::Off => 0,
            BitFix::Single => 1,
            BitFix::Aggressive if n_bits == 112 => 2,
            BitFix::Aggressive => 1,
        }
    }
}

/// Syndrome -> bit positions. Single-bit entries win on collision.
fn build_syndrome_table(n_bits: usize, with_pairs: bool) -> HashMap<u32, Vec<usize>> {
    let n_bytes = n_bits / 8;
    let mut table = HashMap::new();
    let pattern = |bits: &[usize]| {
        let mut msg = vec![0u8; n_bytes];
        for &bit in bits {
            msg[bit / 8] |= 1 << (7 - (bit % 8));
        }
        crc24(&msg)
    };

    for bit in 0..n_bits {
        table.entry(pattern(&[bit])).or_insert_with(|| vec![bit]);
    }

    if with_pairs {
        for bit1 in 0..n_bits {
            for bit2 in (bit1 + 1)..n_bits {
                table
                    .entry(pattern(&[bit1, bit2]))
                    .or_insert_with(|| vec![bit1, bit2]);
            }
        }
    }

    table
}

static SYNDROME_TABLE_112: LazyLock<HashMap<u32, Vec<usize>>> =
    LazyLock::new(|| build_syndrome_table(112, true));
static SYNDROME_TABLE_56: LazyLock<HashMap<u32, Vec<usize>>> =
    LazyLock::new(|| build_syndrome_table(56, false));

/// Repair `msg` in place so its residual becomes zero.
///
/// Returns the number of bits flipped, or `None` if the policy forbids it or
/// the syndrome does not map to a correctable pattern. `msg` is left untouched
/// on failure.
pub fn fix_errors(msg: &mut [u8], fix: BitFix) -> Option<u8> {
    let n_bits = msg.len() * 8;
    let max_bits = fix.max_bits(n_bits);
    if max_bits == 0 {
        return None;
    }

    let syndrome = crc24(msg);
    if syndrome == 0 {
        return Some(0);
    }

    let table = match n_bits {
        112 => &*SYNDROME_TABLE_112,
        56 => &*SYNDROME_TABLE_56,
        _ => return None,
    };
    let bits = table.get(&syndrome)?;
    if bits.len() > max_bits || bits.iter().any(|&b| b < DF_BITS) {
        return None;
    }

    let mut fixed = msg.to_vec();
    for &bit in bits {
        fixed[bit / 8] ^= 1 << (7 - (bit % 8));
    }
    if crc24(&fixed) != 0 {
        return None;
    }

    msg.copy_from_slice(&fixed);
    Some(bits.len() as u8)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Plaintext and ciphertext containers with wire encoding

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{HeError, Result};
use crate::params::BfvParams;

/// A plaintext polynomial modulo t, coefficient domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plaintext {
    pub(crate) coeffs: Vec<u64>,
}

impl Plaintext {
    pub(crate) fn new(coeffs: Vec<u64>) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> &[u64] {
        &self.coeffs
    }
}

/// A plaintext lifted modulo q and transformed, ready for homomorphic use:
/// `raw` multiplies ciphertexts, `scaled` (Δ times `raw`) adds into them.
#[derive(Debug, Clone)]
pub struct PlaintextNtt {
    pub(crate) raw: Vec<u64>,
    pub(crate) scaled: Vec<u64>,
}

/// A two-component BFV ciphertext, NTT domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    pub(crate) c0: Vec<u64>,
    pub(crate) c1: Vec<u64>,
}

impl Ciphertext {
    pub(crate) fn new(c0: Vec<u64>, c1: Vec<u64>) -> Self {
        Self { c0, c1 }
    }

    /// Serialized size in bytes for a given parameter set.
    pub fn serialized_len(params: &BfvParams) -> usize {
        4 + 2 * 8 * params.n
    }

    /// Wire encoding: u32 degree header, then both component polynomials
    /// as little-endian u64 words.
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize_polys(&[&self.c0, &self.c1])
    }

    /// Decode and validate against the context parameters. Rejects degree
    /// mismatches and out-of-range coefficients.
    pub fn from_bytes(bytes: &[u8], params: &BfvParams) -> Result<Self> {
        let mut polys = deserialize_polys(bytes, params, 2)?;
        let c1 = polys.pop().expect("two polys");
        let c0 = polys.pop().expect("two polys");
        Ok(Self { c0, c1 })
    }
}

pub(crate) fn serialize_polys(polys: &[&[u64]]) -> Vec<u8> {
    let n = polys[0].len();
    let mut bytes = vec![0u8; 4 + polys.len() * n * 8];
    LittleEndian::write_u32(&mut bytes[..4], n as u32);
    let mut offset = 4;
    for poly in polys {
        LittleEndian::write_u64_into(poly, &mut bytes[offset..offset + n * 8]);
        offset += n * 8;
    }
    bytes
}

pub(crate) fn deserialize_polys(
    bytes: &[u8],
    params: &BfvParams,
    count: usize,
) -> Result<Vec<Vec<u64>>> {
    if bytes.len() < 4 {
        return Err(HeError::BufferTruncated {
            need: 4,
            have: bytes.len(),
        });
    }
    let n = LittleEndian::read_u32(&bytes[..4]);
    if n as usize != params.n {
        return Err(HeError::DegreeMismatch {
            expected: params.n as u32,
            got: n,
        });
    }

    let need = 4 + count * params.n * 8;
    if bytes.len() < need {
        return Err(HeError::BufferTruncated {
            need,
            have: bytes.len(),
        });
    }

    let mut polys = Vec::with_capacity(count);
    let mut offset = 4;
    for _ in 0..count {
        let mut poly = vec![0u64; params.n];
        LittleEndian::read_u64_into(&bytes[offset..offset + params.n * 8], &mut poly);
        if poly.iter().any(|&c| c >= params.q) {
            return Err(HeError::CoefficientOutOfRange);
        }
        polys.push(poly);
        offset += params.n * 8;
    }
    Ok(polys)
}

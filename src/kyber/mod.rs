//! Kyber parameter tables.
//!
//! Leaf constants consumed by a lattice KEM implementation. Nothing here
//! performs arithmetic on keys; the table only fixes sizes so that callers
//! can validate buffers before handing them to the cryptographic routines.
//!
//! ```text
//! params.rs    Q, N, POLY_SIZE, PLAINTEXT_SIZE (common to all sets)
//! mod.rs       Kyber512 / Kyber768 / Kyber1024 and derived byte sizes
//! ```

pub mod params;

use params::{N, POLY_SIZE};

/// Size of the public matrix seed carried in every public key.
pub const SEED_SIZE: usize = 32;

/// A named Kyber parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSet {
    pub name: &'static str,
    /// Module rank.
    pub k: usize,
    pub eta1: usize,
    pub eta2: usize,
    /// Bits per coefficient when compressing `u`.
    pub du: usize,
    /// Bits per coefficient when compressing `v`.
    pub dv: usize,
}

pub const KYBER512: ParameterSet = ParameterSet {
    name: "Kyber512",
    k: 2,
    eta1: 3,
    eta2: 2,
    du: 10,
    dv: 4,
};

pub const KYBER768: ParameterSet = ParameterSet {
    name: "Kyber768",
    k: 3,
    eta1: 2,
    eta2: 2,
    du: 10,
    dv: 4,
};

pub const KYBER1024: ParameterSet = ParameterSet {
    name: "Kyber1024",
    k: 4,
    eta1: 2,
    eta2: 2,
    du: 11,
    dv: 5,
};

impl ParameterSet {
    /// All standard parameter sets, weakest first.
    pub const ALL: [ParameterSet; 3] = [KYBER512, KYBER768, KYBER1024];

    /// Look up a parameter set by name (case-insensitive).
    pub fn by_name(name: &str) -> Option<ParameterSet> {
        Self::ALL
            .into_iter()
            .find(|set| set.name.eq_ignore_ascii_case(name))
    }

    /// Size of a packed vector of `k` polynomials.
    pub const fn poly_vec_size(&self) -> usize {
        self.k * POLY_SIZE
    }

    /// PKE public key: packed vector `t` followed by the matrix seed.
    pub const fn public_key_size(&self) -> usize {
        self.poly_vec_size() + SEED_SIZE
    }

    /// PKE private key: packed vector `s`.
    pub const fn private_key_size(&self) -> usize {
        self.poly_vec_size()
    }

    pub const fn ciphertext_size(&self) -> usize {
        self.k * self.du * N / 8 + self.dv * N / 8
    }
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_public_key_sizes() {
        assert_eq!(KYBER512.public_key_size(), 800);
        assert_eq!(KYBER768.public_key_size(), 1184);
        assert_eq!(KYBER1024.public_key_size(), 1568);
    }

    #[test]
    fn published_ciphertext_sizes() {
        assert_eq!(KYBER512.ciphertext_size(), 768);
        assert_eq!(KYBER768.ciphertext_size(), 1088);
        assert_eq!(KYBER1024.ciphertext_size(), 1568);
    }

    #[test]
    fn private_key_is_packed_secret_vector() {
        assert_eq!(KYBER512.private_key_size(), 768);
        assert_eq!(KYBER768.private_key_size(), 1152);
        assert_eq!(KYBER1024.private_key_size(), 1536);
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(ParameterSet::by_name("kyber768"), Some(KYBER768));
        assert_eq!(ParameterSet::by_name("Kyber1024"), Some(KYBER1024));
        assert_eq!(ParameterSet::by_name("kyber2048"), None);
        assert_eq!(KYBER512.to_string(), "Kyber512");
    }
}

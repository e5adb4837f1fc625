//! Kyber constants shared by every parameter set.

/// The modulus q = 3329 = 2¹¹ + 2¹⁰ + 2⁸ + 1.
pub const Q: i16 = 3329;

/// Number of coefficients in a polynomial.
pub const N: usize = 256;

/// Size in bytes of a packed polynomial (12 bits per coefficient).
pub const POLY_SIZE: usize = 384;

/// Size in bytes of a plaintext message.
pub const PLAINTEXT_SIZE: usize = 32;

use subtle::ConstantTimeEq;

/// Constant-time digest equality seam.
///
/// The registry routes every hash comparison through this trait so tests
/// can observe that the constant-time primitive is actually invoked on the
/// authentication path.
pub trait DigestComparer: Send + Sync {
    /// Compare two hex digests without short-circuiting on the first
    /// differing byte.
    fn digests_equal(&self, a: &str, b: &str) -> bool;
}

/// [`DigestComparer`] backed by `subtle::ConstantTimeEq`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubtleComparer;

impl DigestComparer for SubtleComparer {
    fn digests_equal(&self, a: &str, b: &str) -> bool {
        a.as_bytes().ct_eq(b.as_bytes()).into()
    }
}

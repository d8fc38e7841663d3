pub use arbitrary::{Arbitrary, Unstructured};

/// Fills the buffer with random bytes.
pub fn fill_bytes(buf: &mut [u8]) {
    rand::RngCore::fill_bytes(&mut rand::rng(), buf);
}

/// Returns an arbitrary instance of the passed type.
#[macro_export]
macro_rules! random {
    ($typ: ty) => {{
        let mut bytes = Box::new([0u8; 1024]);
        $crate::test_utils::arbitrary::fill_bytes(bytes.as_mut_slice());
        let mut u = $crate::test_utils::arbitrary::Unstructured::new(bytes.as_slice());
        <$typ as $crate::test_utils::arbitrary::Arbitrary>::arbitrary(&mut u).unwrap()
    }};
}

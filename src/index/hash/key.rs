use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use byteorder::{ByteOrder, LittleEndian};

/// A fixed-width key that can live in a hash bucket page
pub trait HashKey: Copy + Eq + Hash + Send + Sync + 'static {
    /// Number of bytes the key occupies in the page
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

/// A fixed-width value that can live in a hash bucket page
pub trait HashValue: Copy + Eq + Send + Sync + 'static {
    /// Number of bytes the value occupies in the page
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_fixed_width {
    ($ty:ty, $size:expr, $write:path, $read:path) => {
        impl HashKey for $ty {
            const ENCODED_SIZE: usize = $size;

            fn encode(&self, buf: &mut [u8]) {
                $write(buf, *self);
            }

            fn decode(buf: &[u8]) -> Self {
                $read(buf)
            }
        }

        impl HashValue for $ty {
            const ENCODED_SIZE: usize = $size;

            fn encode(&self, buf: &mut [u8]) {
                $write(buf, *self);
            }

            fn decode(buf: &[u8]) -> Self {
                $read(buf)
            }
        }
    };
}

impl_fixed_width!(i32, 4, LittleEndian::write_i32, LittleEndian::read_i32);
impl_fixed_width!(u32, 4, LittleEndian::write_u32, LittleEndian::read_u32);
impl_fixed_width!(i64, 8, LittleEndian::write_i64, LittleEndian::read_i64);
impl_fixed_width!(u64, 8, LittleEndian::write_u64, LittleEndian::read_u64);

/// 32-bit hash used to index the directory
///
/// The low half of the 64-bit SipHash output, matching the directory's use
/// of the low `global_depth` bits as the slot index.
pub fn hash32<K: HashKey>(key: &K) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as u32
}

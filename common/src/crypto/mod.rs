mod address;
mod hash;

pub use address::{Address, ADDRESS_SIZE};
pub use hash::{keccak256, sha256, Hash, Hashable, HASH_SIZE};

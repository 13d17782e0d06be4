///! A fixed-length bitmap. Bits are numbered starting with 1.
///!
///! Used to track which rows of a materialized join side have been matched
///! (for outer-join Null padding, spec §4.5 NestedLoopJoin/HashJoin) and for
///! similar "has this rowid been seen" bookkeeping. Usually sparse and low
///! cardinality, occasionally dense; the storage representation adapts.
use std::mem::size_of;

use crate::errors::EngineResult;

/// A bitmap is an instance of the following structure.
///
/// This bitmap records the existence of zero or more bits
/// with values between 1 and size, inclusive.
///
/// There are three possible storage types for the bitvec.
pub struct Bitvec {
    size: u32,
    storage: Storage,
}

enum Storage {
    /// A straight bitmap. The least significant bit is bit 1.
    Bitmap([MAP_T; Self::MAP_ELEMS]),
    /// A hash table that will hold up to Self::MXHASH distinct values.
    Hash {
        /// Number of bits that are set. Max is BITVEC_NINT.
        /// For BITVEC_SZ of 512, this would be 125.
        count: u32,
        array: [u32; Self::HASH_ELEMS],
    },
    /// A set of pointers to sub-bitvecs that each handle up to `divisor`
    /// distinct values of i. subs[0] holds values between 1 and `divisor`.
    /// subs[n] holds values between n*divisor+1 and (n+1)*divisor. Each
    /// sub-bitbec is normalized to deal with values between 1 and `divisor`.
    Recursive {
        /// Max divisor is max(u32) / BITVEC_NPTR + 1.
        /// For a BITVEC_SZ of 512, this would be 34,359,739.
        divisor: u32,
        subs: [Option<Box<Bitvec>>; Self::REC_ELEMS],
    },
}

impl Storage {
    /// Number of elements in a Bitmap
    pub const MAP_ELEMS: usize = (Bitvec::SZ - size_of::<u32>()) / size_of::<MAP_T>();
    /// Number of elements in a Hash
    pub const HASH_ELEMS: usize = (Bitvec::SZ - size_of::<u32>() * 2) / size_of::<u32>();
    /// Number of pointers in Recursive
    pub const REC_ELEMS: usize =
        (Bitvec::SZ - size_of::<u32>() * 2) / size_of::<Option<Box<Bitvec>>>();

    /// Maximum number of entries in hash table before
    /// sub-dividing and re-hashing.
    pub const MXHASH: usize = Self::HASH_ELEMS / 2;
}

/// Type of the array "element" for the bitmap representation.
/// Should be a power of 2, and ideally, evenly divide into BITVEC_USIZE.
/// Setting this to the "natural word" size of your CPU may improve
/// performance.
type MAP_T = u8;

impl Bitvec {
    /// Size of the Bitvec structure in bytes.
    pub const SZ: usize = 512;

    /// Create a new bitmap object able to handle bits between 0 and size,
    /// inclusive.
    pub fn new(size: u32) -> Box<Bitvec> {
        Box::new(Self {
            size,
            storage: if size as usize <= Storage::MAP_ELEMS {
                Storage::Bitmap(std::array::from_fn(|_| 0))
            } else {
                Storage::Hash {
                    count: 0,
                    array: std::array::from_fn(|_| 0),
                }
            },
        })
    }

    /// Check to see if the i-th bit is set. Return true or false.
    /// If i is out of range, then return false.
    pub fn test(&self, mut i: u32) -> bool {
        i -= 1;
        if i >= self.size {
            return false;
        }

        use Storage::*;
        match &self.storage {
            Bitmap(map) => map[(i / MAP_T::BITS) as usize] & (1 << (i & (MAP_T::BITS - 1))) != 0,
            Hash { count, array } => {
                let mut h = Self::hash(i);
                i += 1;
                while array[h] != 0 {
                    if array[h] == i {
                        return true;
                    }
                    h = (h + 1) % array.len();
                }
                false
            }
            Recursive { divisor, subs } => {
                let bin = (i / divisor) as usize;
                let i = i % divisor;
                match &subs[bin] {
                    Some(sub) => sub.test(i + 1),
                    None => false,
                }
            }
        }
    }

    pub fn clear(&mut self, mut i: u32) {
        assert!(i > 0);
        i -= 1;

        use Storage::*;
        match &mut self.storage {
            Bitmap(map) => {
                map[(i / MAP_T::BITS) as usize] &= !(1 << (i & (MAP_T::BITS as u32 - 1)))
            }
            Hash { count, array } => {
                let old_hashes = std::mem::replace(array, [0u32; Storage::HASH_ELEMS]);
                *count = 0;
                for val in old_hashes {
                    if val != 0 && val != (i + 1) {
                        let mut h = Self::hash(val - 1);
                        *count += 1;
                        while array[h] != 0 {
                            h = (h + 1) % array.len();
                        }
                        array[h] = val
                    }
                }
            }
            Recursive { divisor, subs } => {
                let bin = (i / *divisor) as usize;
                if let Some(sub) = &mut subs[bin] {
                    sub.clear((i % *divisor) + 1)
                }
            }
        }
    }

    pub fn set(&mut self, mut i: u32) -> EngineResult<()> {
        assert!(i > 0);
        i -= 1;
        assert!(i <= self.size, "{}, {}", i, self.size);

        use Storage::*;
        match &mut self.storage {
            Bitmap(map) => {
                map[(i / MAP_T::BITS) as usize] |= 1 << (i & (MAP_T::BITS - 1));
                Ok(())
            }
            Hash { count, array } => {
                let mut h = Self::hash(i);
                i += 1;

                if array[h] == 0 {
                    // There was no collision. If this doesn't completely fill
                    // the hash, just add it without worrying about subdividing
                    // and re-hashing.
                    if (*count as usize) < array.len() - 1 {
                        *count += 1;
                        array[h] = i;
                        return Ok(());
                    }
                } else {
                    // There was a collision. Check to see if it's already
                    // in the hash or try to find a spot for it.
                    loop {
                        if array[h] == i {
                            return Ok(());
                        }
                        h = (h + 1) % array.len();
                        if array[h] == 0 {
                            break;
                        }
                    }
                    // h is now the first slot that's free
                }

                if (*count as usize) >= Storage::MXHASH {
                    // The hash is too full. Subdivide and rehash.
                    let (count, array) = (*count, *array);
                    self.storage = Recursive {
                        divisor: (self.size + Storage::REC_ELEMS as u32 - 1)
                            / Storage::REC_ELEMS as u32,
                        subs: std::array::from_fn(|_| None),
                    };
                    let mut rc = self.set(i);
                    for val in array {
                        if val != 0 {
                            rc = rc.and(self.set(val));
                        }
                    }
                    return rc;
                }

                *count += 1;
                array[h] = i;
                return Ok(());
            }
            Recursive { divisor, subs } => {
                let bin = (i / *divisor) as usize;
                let i = i % *divisor;
                let sub = subs[bin].get_or_insert_with(|| Bitvec::new(*divisor));
                sub.set(i + 1)
            }
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Hashing function for the hash representation.
    /// Empirical testing showed that the *37 multiplier
    /// (an arbitrary prime) in the hash function provided
    /// no fewer collisions than the no-op *1.
    fn hash(x: u32) -> usize {
        (x as usize * 1) % Storage::HASH_ELEMS
    }
}

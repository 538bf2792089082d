//! CRC-8 used to protect every frame on the wire.
//!
//! The checksum is a plain MSB-first CRC-8 without reflection or final XOR.
//! Frames use the polynomial [`POLYNOMIAL`] and start from [`SEED`].
//!
//! The lookup table for the protocol polynomial is computed at compile time,
//! so computing a checksum never touches mutable global state.

/// Polynomial used by the protocol (implicit `x^8` term).
pub const POLYNOMIAL: u8 = 0x38;

/// Initial CRC value for every frame.
pub const SEED: u8 = 0xff;

static TABLE: [u8; 256] = populate(POLYNOMIAL);

/// Builds the 256-entry lookup table for an MSB-first CRC-8.
///
/// Entries for powers of two are derived by shifting and conditionally
/// XOR-ing the polynomial; every other entry is the XOR of already computed ones.
#[must_use]
pub const fn populate(polynomial: u8) -> [u8; 256] {
    let mut table = [0x00; 256];
    let mut t: u8 = 0x80;
    let mut i = 1;

    while i < table.len() {
        let carry = if t & 0x80 != 0 { polynomial } else { 0x00 };

        t = (t << 1) ^ carry;

        let mut j = 0;

        while j < i {
            table[i + j] = table[j] ^ t;
            j += 1;
        }

        i *= 2;
    }

    table
}

/// Table-driven CRC-8 for an arbitrary polynomial.
///
/// Most users only need [`compute`], which uses the protocol polynomial.
#[derive(Clone, Debug)]
pub struct Crc8 {
    table: [u8; 256],
}

impl Crc8 {
    /// Constructs a CRC-8 engine for the given polynomial.
    #[must_use]
    pub const fn new(polynomial: u8) -> Self {
        Self {
            table: populate(polynomial),
        }
    }

    /// Folds `data` into the running checksum `crc`.
    #[must_use]
    pub fn checksum(&self, data: &[u8], crc: u8) -> u8 {
        fold(&self.table, data, crc)
    }
}

/// Computes the protocol CRC-8 of `data`, starting from `crc`.
///
/// Pass [`SEED`] to checksum a complete frame.
#[must_use]
pub fn compute(data: &[u8], crc: u8) -> u8 {
    fold(&TABLE, data, crc)
}

fn fold(table: &[u8; 256], data: &[u8], crc: u8) -> u8 {
    data.iter().fold(crc, |crc, &b| table[usize::from(crc ^ b)])
}

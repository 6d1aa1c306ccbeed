//! Oblivious key-value store, band encoding
//!
//! The encoder maps distinct 128-bit keys to 128-bit values into a vector
//! of m pseudo-random-looking rows. Each key selects a short band of
//! consecutive rows (position and bit pattern derived from the key under a
//! shared seed); its value is the XOR of the selected rows. Encoding solves
//! the resulting sparse banded GF(2) system; decoding a key that was never
//! encoded yields the XOR of rows that are uniform from the decoder's point
//! of view.

mod band;
mod error;

pub use band::{band_length_for, BandOkvs};
pub use error::{OkvsError, Result};

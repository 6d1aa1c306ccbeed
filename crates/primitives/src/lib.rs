//! Secure two-party primitives
//!
//! The secret-shared equality test, the homomorphic masked equality
//! aggregate, the any-one private equality test over the per-round flag
//! vector, and the simplified 1-out-of-2 oblivious transfer.

mod aggregate;
mod error;
mod ot;
mod peqt;

pub use aggregate::{
    encrypt_equality_shares, masked_equality_sum, recover_match_count, MASK_RANGE,
};
pub use error::{PrimitiveError, Result};
pub use ot::{ot_receive, ot_send};
pub use peqt::{any_one_receiver, any_one_sender, generate_shares, generate_shares_batch};

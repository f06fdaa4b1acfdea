pub mod htlc;
pub mod keys;
pub mod tx;

pub mod invoice;
pub mod lnd;
pub mod registry;

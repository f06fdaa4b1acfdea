pub mod config;
pub mod error;
pub mod lightning;
pub mod logging;
pub mod onchain;
pub mod swap;

pub mod proto {
    pub mod lnrpc {
        tonic::include_proto!("lnrpc");
    }
}

pub use error::SwapError;

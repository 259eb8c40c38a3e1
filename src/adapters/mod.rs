pub mod chains;
pub mod http;
pub mod registry;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use registry::AdapterRegistry;
pub use traits::{ChainAdapter, RawStatus, RawTx, SubmitParams, SubmitReceipt, TransferIntent};

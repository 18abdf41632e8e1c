//! Contract families, their ABI, and the batch call strategies used to read them.

pub mod abi;
pub mod batcher;
pub mod emp;
pub mod family;
pub mod lsp;

pub use batcher::{BatchOutput, CallBatcher, ContractCall, MulticallBatcher, SequentialBatcher};
pub use emp::{Emp, EmpFields};
pub use family::{expired_at, ContractPhase, Family};
pub use lsp::{Lsp, LspFields};

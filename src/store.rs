//! Keyed tables: the narrow store interface the services depend on, an
//! in-memory backend, a JSON snapshot backend, and the row types.

pub mod file;
pub mod memory;
pub mod records;
pub mod table;
pub mod tables;

pub use file::JsonFileTable;
pub use memory::MemoryTable;
pub use records::{
    AddressKind, AddressRecord, AppStats, ContractState, Erc20Record, FamilyKind, Partition,
    RegisteredContract, SyncCursor,
};
pub use table::{RowFilter, StoreResult, Table, TableKey, TableValue};
pub use tables::{AddressTable, PartitionedTables, RegistrationTable, SharedTable, StateTable, Tables};

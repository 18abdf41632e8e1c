use super::file::JsonFileTable;
use super::memory::MemoryTable;
use super::records::{
    AddressKind, AddressRecord, AppStats, ContractState, Erc20Record, RegisteredContract,
    SyncCursor,
};
use super::table::{StoreResult, Table, TableKey, TableValue};
use crate::contracts::{EmpFields, LspFields};
use alloy_primitives::Address;
use std::path::Path;
use std::sync::Arc;

pub type SharedTable<K, V> = Arc<dyn Table<K, V>>;
pub type RegistrationTable = SharedTable<Address, RegisteredContract>;
pub type StateTable<F> = SharedTable<Address, ContractState<F>>;
pub type AddressTable = SharedTable<Address, AddressRecord>;

/// The active/expired table pair of one family.
pub struct PartitionedTables<F> {
    pub active: StateTable<F>,
    pub expired: StateTable<F>,
}

impl<F> Clone for PartitionedTables<F> {
    fn clone(&self) -> Self {
        Self {
            active: Arc::clone(&self.active),
            expired: Arc::clone(&self.expired),
        }
    }
}

/// Every table the service reads or writes, sharing one backend.
#[derive(Clone)]
pub struct Tables {
    pub registered_emps: RegistrationTable,
    pub registered_lsps: RegistrationTable,
    pub emps: PartitionedTables<EmpFields>,
    pub lsps: PartitionedTables<LspFields>,
    pub collateral_addresses: AddressTable,
    pub synthetic_addresses: AddressTable,
    pub long_addresses: AddressTable,
    pub short_addresses: AddressTable,
    pub erc20s: SharedTable<Address, Erc20Record>,
    pub cursors: SharedTable<String, SyncCursor>,
    pub app_stats: SharedTable<String, AppStats>,
}

impl Tables {
    /// Builds every table in memory.
    pub fn in_memory() -> Self {
        fn table<K: TableKey, V: TableValue>(name: &str) -> SharedTable<K, V> {
            Arc::new(MemoryTable::new(name))
        }

        Self {
            registered_emps: table("Registered Emps"),
            registered_lsps: table("Registered Lsps"),
            emps: PartitionedTables {
                active: table("Active Emp"),
                expired: table("Expired Emp"),
            },
            lsps: PartitionedTables {
                active: table("Active LSP"),
                expired: table("Expired LSP"),
            },
            collateral_addresses: table("Collateral Addresses"),
            synthetic_addresses: table("Synthetic Addresses"),
            long_addresses: table("Long Addresses"),
            short_addresses: table("Short Addresses"),
            erc20s: table("Erc20"),
            cursors: table("Sync Cursors"),
            app_stats: table("App Stats"),
        }
    }

    /// Opens every table as a JSON snapshot inside `dir`, creating the directory if needed.
    pub async fn open_dir(dir: &Path) -> StoreResult<Self> {
        tokio::fs::create_dir_all(dir).await?;

        async fn table<K: TableKey, V: TableValue>(
            dir: &Path,
            name: &str,
            file: &str,
        ) -> StoreResult<SharedTable<K, V>> {
            let table = JsonFileTable::open(name, dir.join(file)).await?;
            Ok(Arc::new(table))
        }

        Ok(Self {
            registered_emps: table(dir, "Registered Emps", "registered_emps.json").await?,
            registered_lsps: table(dir, "Registered Lsps", "registered_lsps.json").await?,
            emps: PartitionedTables {
                active: table(dir, "Active Emp", "emps_active.json").await?,
                expired: table(dir, "Expired Emp", "emps_expired.json").await?,
            },
            lsps: PartitionedTables {
                active: table(dir, "Active LSP", "lsps_active.json").await?,
                expired: table(dir, "Expired LSP", "lsps_expired.json").await?,
            },
            collateral_addresses: table(dir, "Collateral Addresses", "collateral_addresses.json")
                .await?,
            synthetic_addresses: table(dir, "Synthetic Addresses", "synthetic_addresses.json")
                .await?,
            long_addresses: table(dir, "Long Addresses", "long_addresses.json").await?,
            short_addresses: table(dir, "Short Addresses", "short_addresses.json").await?,
            erc20s: table(dir, "Erc20", "erc20s.json").await?,
            cursors: table(dir, "Sync Cursors", "cursors.json").await?,
            app_stats: table(dir, "App Stats", "app_stats.json").await?,
        })
    }

    pub fn address_set(&self, kind: AddressKind) -> &AddressTable {
        match kind {
            AddressKind::Collateral => &self.collateral_addresses,
            AddressKind::Synthetic => &self.synthetic_addresses,
            AddressKind::Long => &self.long_addresses,
            AddressKind::Short => &self.short_addresses,
        }
    }
}

//! 再開可能な進捗管理
//!
//! 自治体単位のチェックポイントと、自治体ごとの店舗リストの2段構成。

mod csv_store;
mod store;
mod types;

pub use csv_store::CsvCheckpointStore;
pub use store::CheckpointStore;
pub use types::{
    ListProgress, RestaurantListEntry, TargetField, TargetRecord, TargetStatus, PENDING,
};

pub(crate) use types::postcode_set;

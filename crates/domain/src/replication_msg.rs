use serde::{Deserialize, Serialize};

/// Mutating operation carried by a `StatsDBUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsOp {
    AddInt,
    AddString,
    AddStringInt,
    SubInt,
    SubString,
    Reset,
    ResetField,
}

/// One ring slot as carried in a full-dump message: first-write
/// timestamp plus the aggregator's opaque serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpSlot {
    pub first_write: u64,
    pub blob: Vec<u8>,
}

/// Tagged union wire message, per spec.md §6.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicationMessage {
    StatsDbUpdate {
        db_name: String,
        key: String,
        field: String,
        op: StatsOp,
        int_value: Option<i64>,
        string_value: Option<String>,
    },
    StatsDbFullDump {
        db_name: String,
        key: String,
        start_time: u64,
        fields: Vec<(String, Vec<DumpSlot>)>,
    },
    ListAdd {
        list_type: ListType,
        store: ListStoreKind,
        key: String,
        expire_secs: i64,
        reason: String,
    },
    ListDelete {
        list_type: ListType,
        store: ListStoreKind,
        key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListType {
    Ip,
    Login,
    IpLogin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListStoreKind {
    Bl,
    Wl,
}

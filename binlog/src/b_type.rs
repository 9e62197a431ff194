use num_enum::{IntoPrimitive, TryFromPrimitive};

/// binlog事件类型字节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LogEventType {
    Unknown = 0,
    StartV3 = 1,
    Query = 2,
    Stop = 3,
    Rotate = 4,
    Intvar = 5,
    Load = 6,
    Slave = 7,
    CreateFile = 8,
    AppendBlock = 9,
    ExecLoad = 10,
    DeleteFile = 11,
    NewLoad = 12,
    Rand = 13,
    UserVar = 14,
    FormatDescription = 15,
    Xid = 16,
    BeginLoadQuery = 17,
    ExecuteLoadQuery = 18,
    TableMap = 19,
    PreGaWriteRows = 20,
    PreGaUpdateRows = 21,
    PreGaDeleteRows = 22,
    WriteRowsV1 = 23,
    UpdateRowsV1 = 24,
    DeleteRowsV1 = 25,
    Incident = 26,
    HeartbeatLog = 27,
    Ignorable = 28,
    RowsQuery = 29,
    WriteRows = 30,
    UpdateRows = 31,
    DeleteRows = 32,
    Gtid = 33,
    AnonymousGtid = 34,
    PreviousGtids = 35,
    TransactionContext = 36,
    ViewChange = 37,
    XaPrepare = 38,
    PartialUpdateRows = 39,

    /// MariaDB扩展段
    MariaAnnotateRows = 160,
    MariaBinlogCheckpoint = 161,
    MariaGtid = 162,
    MariaGtidList = 163,
}

impl LogEventType {
    pub fn is_rows(&self) -> bool {
        matches!(
            self,
            LogEventType::WriteRowsV1
                | LogEventType::UpdateRowsV1
                | LogEventType::DeleteRowsV1
                | LogEventType::WriteRows
                | LogEventType::UpdateRows
                | LogEventType::DeleteRows
        )
    }

    /// v2行事件带extra-data段
    pub fn is_rows_v2(&self) -> bool {
        matches!(
            self,
            LogEventType::WriteRows | LogEventType::UpdateRows | LogEventType::DeleteRows
        )
    }
}

use std::io;
use std::num::ParseIntError;
use std::str::Utf8Error;
use std::string::FromUtf8Error;

use thiserror::Error;

/// 复制链路的统一异常
#[derive(Debug, Error)]
pub enum RpError {
    //////////////////////
    // Common
    //////////////////////
    /// 一定不会出现的异常。如果出现，一定是BUG
    #[error("BUG: {0}")]
    Bug(String),

    #[error("{0}")]
    String(String),

    #[error("config error: {0}")]
    ConfigErr(String),

    //////////////////////
    // Source
    //////////////////////
    /// 源库连接异常，可重连恢复
    #[error("connection error: {0}")]
    ConnectionErr(String),

    /// 源库协议异常
    #[error("protocol error: {0}")]
    ProtocolErr(String),

    /// 事件帧损坏，不可恢复
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// 事件体解码异常，帧完整时可跳过
    #[error("decode error: {0}")]
    DecodeErr(String),

    //////////////////////
    // Spool
    //////////////////////
    #[error("spool error: {0}")]
    SpoolErr(String),

    /// checkpoint文件损坏，需人工介入
    #[error("state corrupted: {0}")]
    StateCorrupted(String),

    //////////////////////
    // Target
    //////////////////////
    /// 目标库异常，按退避策略重试
    #[error("target error: {0}")]
    TargetErr(String),

    //////////////////////
    // Translator
    //////////////////////
    #[error("translate error: {0}")]
    TranslateErr(String),

    /// 不支持的DDL（如变更主键）
    #[error("unsupported ddl: {0}")]
    UnsupportedDdl(String),

    //////////////////////
    // IO
    //////////////////////
    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    Utf8Error(#[from] Utf8Error),

    #[error(transparent)]
    FromUtf8Error(#[from] FromUtf8Error),

    #[error(transparent)]
    ParseIntError(#[from] ParseIntError),
}

impl RpError {
    /// 是否为可重试的瞬时异常
    pub fn is_transient(&self) -> bool {
        matches!(self, RpError::ConnectionErr(_) | RpError::TargetErr(_))
    }
}

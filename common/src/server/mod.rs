pub mod health;

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::err::{RpError, RpResult};
use crate::server::health::HealthSnapshot;

/// Server have start / shutdown functions
#[async_trait::async_trait]
pub trait Server: Send {
    async fn start(&mut self) -> RpResult<()>;

    async fn shutdown(&mut self, graceful: bool) -> RpResult<()>;
}

/// 控制面命令，由HTTP面转发给supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Flush,
    Optimize,
}

#[derive(Debug)]
pub struct ControlRequest {
    pub database: String,
    pub command: ControlCommand,
}

/// supervisor与HTTP面之间的契约：
/// 健康快照只读共享，控制命令走有界队列。
#[derive(Clone)]
pub struct ControlHandle {
    health: Arc<RwLock<HealthSnapshot>>,
    control: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn new() -> (Self, mpsc::Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                health: Arc::new(RwLock::new(HealthSnapshot::default())),
                control: tx,
            },
            rx,
        )
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.health
            .read()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// 组件侧更新健康快照
    pub fn update<F: FnOnce(&mut HealthSnapshot)>(&self, f: F) {
        if let Ok(mut h) = self.health.write() {
            f(&mut h);
        }
    }

    pub async fn send(&self, request: ControlRequest) -> RpResult<()> {
        self.control
            .send(request)
            .await
            .map_err(|_| RpError::String("supervisor control channel closed".to_string()))
    }
}

pub mod api;

use std::thread::JoinHandle;

use tracing::{info, warn};

use common::err::{RpError, RpResult};
use common::server::{ControlHandle, Server};

/// 健康/控制HTTP面。actix需要自己的System，
/// 单独起一个OS线程承载，不与worker任务抢runtime。
pub struct ControlServer {
    handle: ControlHandle,
    host: String,
    port: u16,

    server: Option<actix_web::dev::ServerHandle>,
    join: Option<JoinHandle<()>>,
}

impl ControlServer {
    pub fn new(handle: ControlHandle, host: String, port: u16) -> Self {
        Self {
            handle,
            host,
            port,
            server: None,
            join: None,
        }
    }
}

#[async_trait::async_trait]
impl Server for ControlServer {
    async fn start(&mut self) -> RpResult<()> {
        let handle = self.handle.clone();
        let bind = (self.host.clone(), self.port);
        let (tx, rx) = std::sync::mpsc::channel::<RpResult<actix_web::dev::ServerHandle>>();

        let join = std::thread::spawn(move || {
            let system = actix_web::rt::System::new();
            system.block_on(async move {
                let bound = actix_web::HttpServer::new(move || {
                    actix_web::App::new()
                        .app_data(actix_web::web::Data::new(handle.clone()))
                        .service(api::health)
                        .service(api::applier_command)
                })
                .workers(1)
                .bind(bind.clone());

                let server = match bound {
                    Ok(s) => s.run(),
                    Err(e) => {
                        let _ = tx.send(Err(RpError::ConfigErr(format!(
                            "http bind {}:{} err: {}",
                            bind.0, bind.1, e
                        ))));
                        return;
                    }
                };

                let _ = tx.send(Ok(server.handle()));
                if let Err(e) = server.await {
                    warn!("control server exited: {}", e);
                }
            });
        });
        self.join = Some(join);

        match rx.recv() {
            Ok(Ok(server)) => {
                self.server = Some(server);
                info!("control surface on http://{}:{}", self.host, self.port);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RpError::String("control server thread died".to_string())),
        }
    }

    async fn shutdown(&mut self, graceful: bool) -> RpResult<()> {
        if let Some(server) = self.server.take() {
            server.stop(graceful).await;
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        Ok(())
    }
}

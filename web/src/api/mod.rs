pub mod result;

use actix_web::{get, post, web, HttpResponse, Responder};

use common::server::{ControlCommand, ControlHandle, ControlRequest};

use crate::api::result::R;

/// http://host:port/health
#[get("/health")]
pub async fn health(handle: web::Data<ControlHandle>) -> impl Responder {
    HttpResponse::Ok().json(handle.snapshot())
}

/// http://host:port/applier/{database}/{command}
/// command: pause | resume | flush | optimize
#[post("/applier/{database}/{command}")]
pub async fn applier_command(
    handle: web::Data<ControlHandle>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (database, command) = path.into_inner();
    let command = match command.as_str() {
        "pause" => ControlCommand::Pause,
        "resume" => ControlCommand::Resume,
        "flush" => ControlCommand::Flush,
        "optimize" => ControlCommand::Optimize,
        other => {
            return HttpResponse::BadRequest().json(R::error(400, &format!("unknown command: {}", other)))
        }
    };

    match handle.send(ControlRequest { database, command }).await {
        Ok(()) => HttpResponse::Ok().json(R::success("accepted")),
        Err(e) => HttpResponse::ServiceUnavailable().json(R::error(503, &e.to_string())),
    }
}

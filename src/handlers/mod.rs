pub mod transcribe;

pub use transcribe::transcribe;

use actix_web::web;

use crate::health;

/// Register every HTTP route of the service.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health::root))
        .route("/health", web::get().to(health::health_check))
        .route("/transcribe", web::post().to(transcribe));
}

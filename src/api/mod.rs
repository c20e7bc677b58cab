mod chain;
pub mod error;
mod health;
mod jobs;
pub mod models;

use actix_web::web::{self, ServiceConfig};

pub use error::ApiError;
pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    // Malformed bodies get the same JSON error shape as every other failure
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into());

    cfg.app_data(json_config).service(
        web::scope("/api")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(chain::submit_block)
            .service(jobs::get_job),
    );
}

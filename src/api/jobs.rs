use actix_web::{HttpResponse, get, web};

use super::error::ApiError;
use super::models::{AppState, JobResponse};

/// Look up a mining job queued through `POST /block`.
#[get("/jobs/{id}")]
pub async fn get_job(
    state: web::Data<AppState>,
    path: web::Path<(String,)>,
) -> Result<HttpResponse, ApiError> {
    let job_id = path.into_inner().0;
    let status = state
        .miner
        .status(&job_id)
        .ok_or_else(|| ApiError::JobNotFound(job_id.clone()))?;
    Ok(HttpResponse::Ok().json(JobResponse { job_id, status }))
}

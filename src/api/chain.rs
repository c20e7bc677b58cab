use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info, warn};

use super::error::ApiError;
use super::models::{
    AppState, ChainResponse, JobResponse, NewBlockRequest, SubmitQuery, ValidateQuery,
    ValidateResponse,
};
use crate::miner::JobStatus;

/// Get the full blockchain.
#[get("/chain")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.read().expect("rwlock poisoned");
    HttpResponse::Ok().json(ChainResponse {
        length: bc.len(),
        difficulty: bc.difficulty(),
        chain: bc.export_snapshot(),
    })
}

/// Validate the whole chain. `?strict=true` also re-checks Proof-of-Work.
#[get("/validate")]
pub async fn validate_chain(
    state: web::Data<AppState>,
    query: web::Query<ValidateQuery>,
) -> impl Responder {
    let strict = query.strict;
    let bc = state.blockchain.read().expect("rwlock poisoned");
    let outcome = if strict {
        bc.validate_strict()
    } else {
        bc.validate()
    };
    if let Err(e) = &outcome {
        warn!("GET /validate - chain rejected: {e}");
    }
    HttpResponse::Ok().json(ValidateResponse {
        valid: outcome.is_ok(),
        strict,
        length: bc.len(),
        difficulty: bc.difficulty(),
        error: outcome.err().map(|e| e.to_string()),
    })
}

/// Queue a payload for mining.
///
/// Answers `202 Accepted` with a job id right away; with `?wait=true` the
/// request stays open until the block is sealed and answers with it.
#[post("/block")]
pub async fn submit_block(
    state: web::Data<AppState>,
    query: web::Query<SubmitQuery>,
    body: web::Json<NewBlockRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = body.into_inner().data;
    debug!("POST /block - received {} byte payload", payload.len());

    let ticket = state.miner.submit(payload)?;
    info!("POST /block - queued job {}", ticket.job_id);

    if !query.wait {
        return Ok(HttpResponse::Accepted().json(JobResponse {
            job_id: ticket.job_id,
            status: JobStatus::Pending,
        }));
    }

    let job_id = ticket.job_id;
    let block = ticket
        .sealed
        .await
        .map_err(|_| ApiError::MiningAborted(job_id))?;
    Ok(HttpResponse::Ok().json(block))
}

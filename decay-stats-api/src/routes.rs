use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use decay_stats::{DistributionRecord, DistributionRegistry, Snapshot, TimeDistribution, TimeUnit};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub type Registry = Arc<DistributionRegistry>;

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/distributions", get(list_distributions))
        .route("/distributions/{name}", get(get_snapshot))
        .route("/distributions/{name}/percentiles", get(get_percentiles))
        .route("/distributions/{name}/record", get(get_record))
        .route("/distributions/{name}/samples", post(add_samples))
        .route("/distributions/{name}/reset", post(reset))
        .with_state(registry)
}

#[derive(Debug, Serialize)]
pub struct DistributionsResponse {
    app: String,
    node: String,
    taken_at: DateTime<Utc>,
    distributions: Vec<NamedSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct NamedSnapshot {
    name: String,
    snapshot: Snapshot,
}

#[derive(Debug, Serialize)]
pub struct PercentilesResponse {
    name: String,
    unit: TimeUnit,
    percentiles: Vec<PercentileValue>,
}

#[derive(Debug, Serialize)]
pub struct PercentileValue {
    quantile: f64,
    value: f64,
}

#[derive(Debug, Deserialize)]
pub struct SamplesRequest {
    values: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct SamplesResponse {
    accepted: usize,
    count: f64,
}

async fn list_distributions(State(registry): State<Registry>) -> Json<DistributionsResponse> {
    let distributions = registry
        .snapshots()
        .into_iter()
        .map(|(name, snapshot)| NamedSnapshot { name, snapshot })
        .collect();

    Json(DistributionsResponse {
        app: registry.app().to_string(),
        node: registry.node().to_string(),
        taken_at: Utc::now(),
        distributions,
    })
}

async fn get_snapshot(
    State(registry): State<Registry>,
    Path(name): Path<String>,
) -> Result<Json<Snapshot>, StatusCode> {
    let distribution = lookup(&registry, &name)?;
    Ok(Json(distribution.snapshot()))
}

async fn get_percentiles(
    State(registry): State<Registry>,
    Path(name): Path<String>,
) -> Result<Json<PercentilesResponse>, StatusCode> {
    let distribution = lookup(&registry, &name)?;
    let percentiles = distribution
        .percentiles()
        .into_iter()
        .map(|(quantile, value)| PercentileValue { quantile, value })
        .collect();

    Ok(Json(PercentilesResponse {
        unit: distribution.unit(),
        name,
        percentiles,
    }))
}

async fn get_record(
    State(registry): State<Registry>,
    Path(name): Path<String>,
) -> Result<Json<DistributionRecord>, StatusCode> {
    match registry.record(&name) {
        Some(record) => Ok(Json(record)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn add_samples(
    State(registry): State<Registry>,
    Path(name): Path<String>,
    Json(request): Json<SamplesRequest>,
) -> Result<Json<SamplesResponse>, StatusCode> {
    if let Some(bad) = request.values.iter().find(|v| !v.is_finite()) {
        warn!("rejecting samples for {name}: {bad} is not finite");
        return Err(StatusCode::BAD_REQUEST);
    }

    let distribution = match registry.get_or_create(&name) {
        Ok(d) => d,
        Err(e) => {
            warn!("cannot create distribution {name:?}: {e}");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    for &value in &request.values {
        if let Err(e) = distribution.add(value) {
            warn!("failed to record sample for {name}: {e}");
            return Err(StatusCode::BAD_REQUEST);
        }
    }
    debug!("recorded {} samples for {name}", request.values.len());

    Ok(Json(SamplesResponse {
        accepted: request.values.len(),
        count: distribution.count(),
    }))
}

async fn reset(
    State(registry): State<Registry>,
    Path(name): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let distribution = lookup(&registry, &name)?;
    distribution.reset();
    Ok(StatusCode::NO_CONTENT)
}

fn lookup(
    registry: &DistributionRegistry,
    name: &str,
) -> Result<Arc<TimeDistribution>, StatusCode> {
    registry.get(name).ok_or_else(|| {
        debug!("distribution {name} not found");
        StatusCode::NOT_FOUND
    })
}

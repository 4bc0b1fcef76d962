use crate::http::{parse_provider, ApiError};
use actix_web::web::{Data, Path, Query};
use actix_web::HttpResponse;
use download_core::{Provider, SlotBroker};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
pub(crate) struct QuotaQuery {
    retry_after_secs: Option<u64>,
}

pub(crate) async fn list_providers(broker: Data<Arc<SlotBroker>>) -> HttpResponse {
    let statuses = Provider::ALL
        .iter()
        .map(|provider| broker.provider_status(*provider))
        .collect::<Vec<_>>();

    HttpResponse::Ok().json(statuses)
}

pub(crate) async fn get_provider_status(
    provider: Path<String>,
    broker: Data<Arc<SlotBroker>>,
) -> Result<HttpResponse, ApiError> {
    let provider = parse_provider(&provider)?;

    Ok(HttpResponse::Ok().json(broker.provider_status(provider)))
}

/// Reports the provider's quota as used up. Queued downloads fail right away.
pub(crate) async fn mark_quota_exceeded(
    provider: Path<String>,
    query: Query<QuotaQuery>,
    broker: Data<Arc<SlotBroker>>,
) -> Result<HttpResponse, ApiError> {
    let provider = parse_provider(&provider)?;
    let retry_after = query.retry_after_secs.map(Duration::from_secs);

    info!(%provider, ?retry_after, "Quota reported as exceeded");
    broker.mark_quota_exceeded(provider, retry_after);

    Ok(HttpResponse::Ok().json(broker.provider_status(provider)))
}

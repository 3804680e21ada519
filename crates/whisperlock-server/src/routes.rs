//! HTTP handlers for the reconciliation endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SubsecRound, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use whisperlock_core::protocol::{
    NotificationPayload, OkResponse, PublicKeyResponse, Subscription, SyncResponse, HEALTH_PATH,
    PUBLIC_KEY_PATH, PUSH_TEST_PATH, SUBSCRIBE_PATH, SYNC_PATH,
};

use crate::error::ServerError;
use crate::push::deliver_all;
use crate::reconcile::accept_batch;
use crate::state::SharedState;

pub const NOTIFICATION_TITLE: &str = "Secret diary";

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(PUBLIC_KEY_PATH, get(public_key))
        .route(SUBSCRIBE_PATH, post(subscribe))
        .route(SYNC_PATH, post(sync))
        .route(PUSH_TEST_PATH, post(push_test))
        .with_state(state)
}

async fn health() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

async fn public_key(State(state): State<SharedState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        key: state.keys.public_key(),
    })
}

async fn subscribe(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<Response, ServerError> {
    let subscription = body
        .get("subscription")
        .cloned()
        .and_then(|v| serde_json::from_value::<Subscription>(v).ok())
        .filter(|s| !s.endpoint.trim().is_empty());
    let Some(subscription) = subscription else {
        return Ok((StatusCode::BAD_REQUEST, Json(OkResponse { ok: false })).into_response());
    };

    let endpoint = subscription.endpoint.clone();
    let added = state.store.lock().await.add_subscription(subscription)?;
    if added {
        info!(endpoint = %endpoint, "subscription registered");
    } else {
        debug!(endpoint = %endpoint, "subscription already known");
    }
    Ok(Json(OkResponse { ok: true }).into_response())
}

async fn sync(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<Json<SyncResponse>, ServerError> {
    let entries = body
        .get("entries")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if entries.is_empty() {
        return Ok(Json(SyncResponse::empty()));
    }

    let now = Utc::now().trunc_subsecs(3);
    let outcome = {
        let store = state.store.lock().await;
        let existing = store.records()?;
        let outcome = accept_batch(existing.iter().map(|r| r.id.as_str()), entries, now);
        store.append_records(outcome.new_records.clone())?;
        outcome
    };
    info!(
        received = entries.len(),
        acknowledged = outcome.synced_ids.len(),
        stored = outcome.new_records.len(),
        "batch reconciled"
    );

    if !outcome.synced_ids.is_empty() {
        let payload = NotificationPayload::new(
            NOTIFICATION_TITLE,
            format!("Backup complete: {} entries", outcome.synced_ids.len()),
        );
        if let Err(err) = notify_subscribers(&state, &payload).await {
            warn!(error = %err, "post-sync notification skipped");
        }
    }

    Ok(Json(SyncResponse {
        ok: true,
        synced_ids: outcome.synced_ids,
        synced_at: Some(now),
    }))
}

async fn push_test(State(state): State<SharedState>) -> Result<Json<OkResponse>, ServerError> {
    let payload = NotificationPayload::new(NOTIFICATION_TITLE, "Test push arrived");
    notify_subscribers(&state, &payload).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Deliver to every subscriber and prune the ones that failed.
async fn notify_subscribers(
    state: &SharedState,
    payload: &NotificationPayload,
) -> Result<(), ServerError> {
    let subscriptions = state.store.lock().await.subscriptions()?;
    if subscriptions.is_empty() {
        return Ok(());
    }
    let failed = deliver_all(state.push.as_ref(), &subscriptions, payload).await;
    let pruned = state.store.lock().await.remove_subscriptions(&failed)?;
    if pruned > 0 {
        info!(pruned, "stale subscriptions removed");
    }
    Ok(())
}

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::dto::{EventKind, PaymentEvent, WebhookAck};
use super::{repo, signature};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/payment/webhook", post(webhook))
}

/// Provider callback. Takes the body as raw bytes: the signature covers the
/// exact payload, so it must be checked before any JSON parsing.
#[utoipa::path(
    post,
    path = "/payment/webhook",
    request_body(content = String, content_type = "application/json", description = "Raw event payload"),
    params(("Stripe-Signature" = String, Header, description = "Provider signature")),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Bad signature or payload"),
    ),
    tag = "Payment"
)]
#[instrument(skip(state, headers, body), fields(len = body.len()))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let cfg = &state.config.payment;
    let header = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    signature::verify(
        &body,
        header,
        &cfg.webhook_secret,
        cfg.tolerance_seconds,
        OffsetDateTime::now_utc().unix_timestamp(),
    )
    .map_err(|e| {
        warn!(error = %e, "webhook signature rejected");
        ApiError::BadRequest(format!("Webhook Error: {}", e))
    })?;

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Webhook Error: {}", e)))?;
    let event: PaymentEvent = serde_json::from_value(payload.clone())
        .map_err(|e| ApiError::BadRequest(format!("Webhook Error: {}", e)))?;

    if !repo::record_event(&state.db, &event, &payload).await? {
        debug!(event_id = %event.id, "duplicate event ignored");
        return Ok(Json(WebhookAck { received: true }));
    }

    handle(&event);
    Ok(Json(WebhookAck { received: true }))
}

fn handle(event: &PaymentEvent) {
    let object_id = event.data.object.get("id").and_then(|v| v.as_str());
    match EventKind::classify(&event.event_type) {
        EventKind::Other => {
            debug!(event_id = %event.id, event_type = %event.event_type, "unhandled event type");
        }
        kind => {
            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                ?kind,
                object_id,
                livemode = event.livemode,
                "payment event received"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        payment_routes().with_state(AppState::fake())
    }

    #[tokio::test]
    async fn missing_signature_is_bad_request() {
        let res = app()
            .oneshot(
                Request::post("/payment/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"id":"evt_1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn body_is_not_parsed_before_verification() {
        // Not JSON and not a JSON content type: a parsed route would answer 415/400
        // for content reasons, this one only complains about the signature.
        let res = app()
            .oneshot(
                Request::post("/payment/webhook")
                    .header("content-type", "text/plain")
                    .header("stripe-signature", "t=1,v1=00")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_non_json_body_fails_parsing_after_verification() {
        let body = "definitely not json";
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let header = signature::sign(body.as_bytes(), "whsec_test", now);
        let res = app()
            .oneshot(
                Request::post("/payment/webhook")
                    .header("stripe-signature", header)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signature_checked_against_untouched_bytes() {
        // Whitespace a JSON round trip would drop; the signature still matches,
        // so the request gets past verification and parsing. The fake pool
        // cannot store the event, which surfaces as a 500.
        let body = "{ \"id\" : \"evt_1\", \"type\": \"invoice.paid\",\n \"data\": {\"object\": {}} }";
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let header = signature::sign(body.as_bytes(), "whsec_test", now);
        let res = app()
            .oneshot(
                Request::post("/payment/webhook")
                    .header("content-type", "application/json")
                    .header("stripe-signature", header)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

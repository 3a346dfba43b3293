use super::AppState;
use crate::domain::{Provider, WebhookEvent, WebhookEventType};
use crate::error::{AppError, Result};
use crate::services::webhook_signature;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

/// `POST /webhooks/{provider}` (§4.G). Parses the provider-specific
/// envelope into a [`WebhookEvent`], publishes it to the `WEBHOOKS`
/// stream keyed by its dedup key, and returns immediately — reconciliation
/// happens downstream in [`crate::workers::WebhookReconciler`], never
/// inline in the request path.
#[tracing::instrument(level = "info", skip(state, headers, body), fields(provider = %provider_raw))]
pub async fn receive(
    State(state): State<AppState>,
    Path(provider_raw): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let provider = Provider::parse(&provider_raw).ok_or_else(|| AppError::Validation(format!("unknown provider '{provider_raw}'")))?;

    if let Some(confirmation) = try_handle_sns_subscription(provider, &body).await? {
        return Ok(confirmation);
    }

    let event = match provider {
        Provider::Ses => parse_ses(&state, &body)?,
        Provider::Resend => parse_resend(&state, &headers, &body)?,
        Provider::Telnyx => parse_telnyx(&state, &headers, &body)?,
    };

    let Some(event) = event else {
        // A recognized envelope shape that carries no reconcilable event
        // (e.g. an SES event type this system doesn't track). Ack and drop.
        return Ok(StatusCode::OK);
    };

    let payload = serde_json::to_vec(&event).map_err(|e| AppError::Validation(e.to_string()))?;
    state
        .broker
        .publish_webhook_event(event.provider.as_str(), event.event_type.as_str(), &event.dedup_key(), payload.into())
        .await?;

    Ok(StatusCode::OK)
}

/// SES delivers via SNS. On first subscribing, SNS sends a
/// `SubscriptionConfirmation` envelope carrying a `SubscribeURL` that must
/// be fetched once to complete the handshake; every other request is a
/// `Notification`. Returns `Ok(None)` for non-SES providers or a regular
/// notification, so the caller falls through to normal parsing.
async fn try_handle_sns_subscription(provider: Provider, body: &Bytes) -> Result<Option<StatusCode>> {
    if provider != Provider::Ses {
        return Ok(None);
    }
    let Ok(envelope) = serde_json::from_slice::<SnsEnvelope>(body) else {
        return Ok(None);
    };
    if envelope.message_type.as_deref() != Some("SubscriptionConfirmation") {
        return Ok(None);
    }
    let Some(subscribe_url) = envelope.subscribe_url else {
        return Err(AppError::Validation("SNS subscription confirmation missing SubscribeURL".to_string()));
    };
    tracing::info!(%subscribe_url, "confirming SNS subscription for webhook ingress");
    reqwest::get(&subscribe_url).await.map_err(|e| AppError::Validation(format!("failed to confirm SNS subscription: {e}")))?;
    Ok(Some(StatusCode::OK))
}

#[derive(Debug, Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Type")]
    message_type: Option<String>,
    #[serde(rename = "SubscribeURL")]
    subscribe_url: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "SigningCertURL")]
    signing_cert_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SesNotificationBody {
    #[serde(rename = "eventType")]
    event_type: String,
    mail: SesMail,
    bounce: Option<JsonValue>,
    complaint: Option<JsonValue>,
    delivery: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct SesMail {
    #[serde(rename = "messageId")]
    message_id: String,
    timestamp: Option<String>,
}

/// SES/SNS verification is simplified to an allowlist check on
/// `SigningCertURL`'s host rather than a full X.509 chain verification —
/// see `DESIGN.md` for the scope decision.
fn parse_ses(state: &AppState, body: &Bytes) -> Result<Option<WebhookEvent>> {
    let envelope: SnsEnvelope = serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("malformed SNS envelope: {e}")))?;

    if let Some(cert_url) = &envelope.signing_cert_url {
        verify_ses_cert_host(state, cert_url)?;
    }

    let Some(inner) = envelope.message else {
        return Err(AppError::Validation("SNS notification missing Message".to_string()));
    };
    let notification: SesNotificationBody =
        serde_json::from_str(&inner).map_err(|e| AppError::Validation(format!("malformed SES notification: {e}")))?;

    let Some(event_type) = map_ses_event_type(&notification.event_type) else {
        return Ok(None);
    };

    let timestamp = notification
        .mail
        .timestamp
        .as_deref()
        .and_then(|raw| time::OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);

    let metadata = notification.bounce.or(notification.complaint).or(notification.delivery).unwrap_or(JsonValue::Null);

    Ok(Some(WebhookEvent {
        provider: Provider::Ses,
        provider_message_id: notification.mail.message_id,
        event_type,
        timestamp,
        metadata,
        raw_payload: serde_json::from_str(&inner).unwrap_or(JsonValue::Null),
    }))
}

fn map_ses_event_type(raw: &str) -> Option<WebhookEventType> {
    match raw {
        "Delivery" => Some(WebhookEventType::Delivered),
        "Bounce" => Some(WebhookEventType::Bounced),
        "Complaint" => Some(WebhookEventType::Complained),
        "Open" => Some(WebhookEventType::Opened),
        "Click" => Some(WebhookEventType::Clicked),
        "Reject" | "Failure" => Some(WebhookEventType::Failed),
        _ => None,
    }
}

fn verify_ses_cert_host(state: &AppState, cert_url: &str) -> Result<()> {
    let Some(allowlist) = &state.webhook_config.ses_signing_cert_allowlist else {
        return Ok(());
    };
    let host = reqwest::Url::parse(cert_url).ok().and_then(|u| u.host_str().map(str::to_string));
    let allowed = allowlist.split(',').map(str::trim).any(|allowed_host| host.as_deref() == Some(allowed_host));
    if allowed {
        Ok(())
    } else {
        Err(AppError::WebhookSignatureInvalid)
    }
}

#[derive(Debug, Deserialize)]
struct ResendEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: ResendData,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResendData {
    email_id: String,
}

fn parse_resend(state: &AppState, headers: &HeaderMap, body: &Bytes) -> Result<Option<WebhookEvent>> {
    verify_signed(headers, body, "svix-signature", state.webhook_config.resend_webhook_secret.as_deref(), Provider::Resend)?;

    let envelope: ResendEnvelope = serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("malformed resend payload: {e}")))?;

    let Some(event_type) = map_resend_event_type(&envelope.event_type) else {
        return Ok(None);
    };

    let timestamp = envelope
        .created_at
        .as_deref()
        .and_then(|raw| time::OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);

    let raw_payload: JsonValue = serde_json::from_slice(body).unwrap_or(JsonValue::Null);
    Ok(Some(WebhookEvent {
        provider: Provider::Resend,
        provider_message_id: envelope.data.email_id,
        event_type,
        timestamp,
        metadata: raw_payload.clone(),
        raw_payload,
    }))
}

fn map_resend_event_type(raw: &str) -> Option<WebhookEventType> {
    match raw {
        "email.delivered" => Some(WebhookEventType::Delivered),
        "email.bounced" => Some(WebhookEventType::Bounced),
        "email.complained" => Some(WebhookEventType::Complained),
        "email.opened" => Some(WebhookEventType::Opened),
        "email.clicked" => Some(WebhookEventType::Clicked),
        "email.delivery_delayed" => Some(WebhookEventType::SoftBounced),
        "email.failed" => Some(WebhookEventType::Failed),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct TelnyxEnvelope {
    data: TelnyxData,
}

#[derive(Debug, Deserialize)]
struct TelnyxData {
    event_type: String,
    payload: TelnyxPayload,
    occurred_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelnyxPayload {
    id: String,
}

fn parse_telnyx(state: &AppState, headers: &HeaderMap, body: &Bytes) -> Result<Option<WebhookEvent>> {
    verify_signed(headers, body, "telnyx-signature-ed25519", state.webhook_config.telnyx_public_key.as_deref(), Provider::Telnyx)?;

    let envelope: TelnyxEnvelope = serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("malformed telnyx payload: {e}")))?;

    let Some(event_type) = map_telnyx_event_type(&envelope.data.event_type) else {
        return Ok(None);
    };

    let timestamp = envelope
        .data
        .occurred_at
        .as_deref()
        .and_then(|raw| time::OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);

    let raw_payload: JsonValue = serde_json::from_slice(body).unwrap_or(JsonValue::Null);
    Ok(Some(WebhookEvent {
        provider: Provider::Telnyx,
        provider_message_id: envelope.data.payload.id,
        event_type,
        timestamp,
        metadata: raw_payload.clone(),
        raw_payload,
    }))
}

fn map_telnyx_event_type(raw: &str) -> Option<WebhookEventType> {
    match raw {
        "message.sent" | "message.delivered" => Some(WebhookEventType::Delivered),
        "message.finalized" => Some(WebhookEventType::Failed),
        _ => None,
    }
}

/// Resend and Telnyx both sign `{timestamp}.{rawBody}` rather than the raw
/// body alone; the timestamp is pulled out of the same signature header
/// rather than a separate one.
fn verify_signed(headers: &HeaderMap, body: &Bytes, header_name: &str, secret_or_key: Option<&str>, provider: Provider) -> Result<()> {
    let Some(secret_or_key) = secret_or_key else {
        tracing::warn!(provider = %provider.as_str(), "no webhook secret configured, skipping signature verification");
        return Ok(());
    };
    let header_value =
        headers.get(header_name).and_then(|v| v.to_str().ok()).ok_or_else(|| AppError::Validation("missing signature header".to_string()))?;
    let (timestamp, signature) =
        header_value.split_once(',').ok_or_else(|| AppError::Validation("malformed signature header".to_string()))?;

    let mut signed = Vec::with_capacity(timestamp.len() + 1 + body.len());
    signed.extend_from_slice(timestamp.trim().as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(body);

    webhook_signature::verify(provider, &signed, signature.trim(), secret_or_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ses_event_type_mapping_drops_unrecognized_types() {
        assert_eq!(map_ses_event_type("Delivery"), Some(WebhookEventType::Delivered));
        assert_eq!(map_ses_event_type("RenderingFailure"), None);
    }

    #[test]
    fn resend_event_type_mapping_covers_soft_bounce() {
        assert_eq!(map_resend_event_type("email.delivery_delayed"), Some(WebhookEventType::SoftBounced));
    }

    #[test]
    fn telnyx_event_type_mapping_treats_finalized_as_failed() {
        assert_eq!(map_telnyx_event_type("message.finalized"), Some(WebhookEventType::Failed));
    }
}

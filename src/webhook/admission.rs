//! Path protection admission handler
//!
//! Handles AdmissionReview requests, runs them through [`crate::protect::mutate`]
//! and encodes the resulting JSON patch back into the review.
//!
//! The handler fails open: any problem decoding or processing a request yields
//! an allowed response carrying the error message, never a denial.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    DynamicObject,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::protect::{mutate, MutationOutcome, ProtectionRequest};

use super::WebhookState;

/// Error type for transport-level failures
///
/// These are answered with an HTTP error status instead of an AdmissionReview.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request carried no body
    #[error("empty body")]
    EmptyBody,

    /// The request body is not declared as JSON
    #[error("invalid Content-Type {0:?}, expect `application/json`")]
    UnsupportedMediaType(String),

    /// The response review could not be serialized
    #[error("failed to encode admission review: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::EmptyBody => StatusCode::BAD_REQUEST,
            WebhookError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            WebhookError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Handle a mutating admission review
///
/// This handler:
/// 1. Rejects empty bodies and non-JSON content types at the HTTP level
/// 2. Decodes the AdmissionReview envelope
/// 3. Runs path protection on the enclosed request
/// 4. Returns the review with the JSON patch (if any) and the request uid
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookError> {
    if body.is_empty() {
        error!("Empty admission request body");
        return Err(WebhookError::EmptyBody);
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !is_json(content_type) {
        error!(content_type, "Unexpected Content-Type on admission request");
        return Err(WebhookError::UnsupportedMediaType(content_type.to_string()));
    }

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            error!(error = %e, "Admission request body is not JSON");
            return respond(fail_open(AdmissionResponse::invalid(e.to_string())));
        }
    };
    let uid = raw
        .pointer("/request/uid")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let review = match AdmissionReview::<DynamicObject>::deserialize(&raw) {
        Ok(review) => review,
        Err(e) => {
            error!(uid, error = %e, "Failed to decode admission review");
            return respond(invalid_with_uid(uid, e.to_string()));
        }
    };

    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(uid, error = %e, "Failed to parse admission request");
            return respond(invalid_with_uid(uid, e.to_string()));
        }
    };

    respond(review_request(&state, &request, &raw))
}

/// Run path protection for one decoded admission request
fn review_request(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
    raw: &Value,
) -> AdmissionResponse {
    let uid = request.uid.as_str();

    info!(
        uid,
        kind = %request.kind.kind,
        namespace = ?request.namespace,
        name = %request.name,
        operation = ?request.operation,
        "AdmissionReview received"
    );

    let protection_request = match protection_request(request, raw) {
        Ok(req) => req,
        Err(e) => {
            error!(uid, error = %e, "Failed to re-encode admission objects");
            return fail_open(AdmissionResponse::from(request).deny(e.to_string()));
        }
    };

    match mutate(&state.config, &protection_request) {
        MutationOutcome::Allowed(patches) if patches.is_empty() => {
            debug!(uid, "No protected paths changed, allowing unchanged");
            AdmissionResponse::from(request)
        }
        MutationOutcome::Allowed(patches) => {
            info!(uid, patch_ops = patches.len(), "Applying patch");
            match AdmissionResponse::from(request).with_patch(json_patch::Patch(patches)) {
                Ok(response) => response,
                Err(e) => {
                    error!(uid, error = %e, "Failed to serialize patch");
                    fail_open(
                        AdmissionResponse::from(request)
                            .deny(format!("patch serialization error: {e}")),
                    )
                }
            }
        }
        MutationOutcome::Rejected(reason) => {
            warn!(uid, reason = %reason, "Could not process request, allowing unchanged");
            fail_open(AdmissionResponse::from(request).deny(reason))
        }
    }
}

/// Build the core request from a decoded admission request
///
/// Objects are taken verbatim from the request body so fields the typed
/// metadata does not model stay visible to the protected paths. A request
/// without an object (which the webhook configuration should never route
/// here) becomes an empty payload and is reported as a decode failure.
fn protection_request(
    request: &AdmissionRequest<DynamicObject>,
    raw: &Value,
) -> Result<ProtectionRequest, serde_json::Error> {
    let object = raw_object(raw, "/request/object")?.unwrap_or_default();
    let old_object = raw_object(raw, "/request/oldObject")?;

    let gvk = &request.kind;
    let kind = if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    };

    Ok(ProtectionRequest {
        uid: request.uid.clone(),
        kind,
        operation: format!("{:?}", request.operation).to_uppercase(),
        object,
        old_object,
    })
}

/// JSON bytes of the object at `pointer`; `null` counts as absent
fn raw_object(raw: &Value, pointer: &str) -> Result<Option<Vec<u8>>, serde_json::Error> {
    raw.pointer(pointer)
        .filter(|object| !object.is_null())
        .map(serde_json::to_vec)
        .transpose()
}

/// Invalid-request response that still carries the caller's correlation id
fn invalid_with_uid(uid: &str, reason: String) -> AdmissionResponse {
    let mut response = AdmissionResponse::invalid(reason);
    response.uid = uid.to_string();
    fail_open(response)
}

fn respond(response: AdmissionResponse) -> Result<Json<Value>, WebhookError> {
    Ok(Json(encode_review(response)?))
}

/// Serialize `response` as a review, with the patch as a base64 string
///
/// The API server decodes `patch` as a byte slice, which in JSON is base64.
fn encode_review(mut response: AdmissionResponse) -> Result<Value, serde_json::Error> {
    let patch = response.patch.take();
    let mut review = serde_json::to_value(response.into_review())?;

    if let Some(patch) = patch {
        if let Some(body) = review.get_mut("response").and_then(Value::as_object_mut) {
            body.insert("patch".to_string(), Value::String(STANDARD.encode(patch)));
        }
    }
    Ok(review)
}

/// Admit the request while keeping the failure message of `response`
///
/// Processing failures are reported, never enforced.
fn fail_open(mut response: AdmissionResponse) -> AdmissionResponse {
    response.allowed = true;
    response
}

/// Accept `application/json`, optionally with parameters such as a charset
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

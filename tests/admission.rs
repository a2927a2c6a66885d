//! End-to-end AdmissionReview round trips through the webhook router
//!
//! These tests drive the public router exactly as the API server would and
//! apply the returned patch to the incoming object to check the result.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use tower::ServiceExt;

use path_protector::config::ProtectionConfig;
use path_protector::webhook::{webhook_router, WebhookState};

const ENABLED_LABEL: &str = "path-protector.wish.com/enabled";
const PATHS_ANNOTATION: &str = "path-protector.wish.com/paths";

struct Review {
    uid: &'static str,
    namespace: &'static str,
    object: Value,
    old_object: Option<Value>,
}

impl Review {
    fn to_json(&self) -> Value {
        let operation = if self.old_object.is_some() { "UPDATE" } else { "CREATE" };
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": self.uid,
                "kind": {"group": "apps", "version": "v1", "kind": "Deployment"},
                "resource": {"group": "apps", "version": "v1", "resource": "deployments"},
                "namespace": self.namespace,
                "name": "web",
                "operation": operation,
                "userInfo": {"username": "ci-deployer"},
                "object": self.object,
                "oldObject": self.old_object,
                "dryRun": false
            }
        })
    }
}

fn deployment(namespace: &str, metadata: Value, spec: Value) -> Value {
    let mut metadata = metadata;
    metadata["name"] = json!("web");
    metadata["namespace"] = json!(namespace);
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata,
        "spec": spec
    })
}

async fn send(config: ProtectionConfig, review: &Review) -> Value {
    let router = webhook_router(Arc::new(WebhookState::new(config)));
    let request = Request::builder()
        .method("POST")
        .uri("/mutate")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&review.to_json()).unwrap()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let review: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(review["kind"], "AdmissionReview");
    review["response"].clone()
}

/// Decode the response patch; anything but a base64 string or no patch fails
fn patch_of(response: &Value) -> Option<json_patch::Patch> {
    match response.get("patch") {
        None | Some(Value::Null) => None,
        Some(Value::String(encoded)) => {
            let raw = STANDARD.decode(encoded).unwrap();
            Some(serde_json::from_slice(&raw).unwrap())
        }
        Some(other) => panic!("patch must be a base64 string, got {other}"),
    }
}

/// Story: CI re-applies a manifest with replicas: 1 while the autoscaler has
/// scaled to 10; the stored replica count survives the apply.
#[tokio::test]
async fn story_apply_does_not_clobber_autoscaled_replicas() {
    let metadata = json!({
        "labels": {ENABLED_LABEL: "true", "app": "web"},
        "annotations": {PATHS_ANNOTATION: "/spec/replicas"}
    });
    let review = Review {
        uid: "b8d1c2f4-0001",
        namespace: "shop",
        object: deployment("shop", metadata.clone(), json!({"replicas": 1, "paused": false})),
        old_object: Some(deployment("shop", metadata, json!({"replicas": 10, "paused": false}))),
    };

    let response = send(ProtectionConfig::default(), &review).await;
    assert_eq!(response["uid"], "b8d1c2f4-0001");
    assert_eq!(response["allowed"], true);
    assert_eq!(response["patchType"], "JSONPatch");

    let patch = patch_of(&response).expect("patch should be present");
    let mut object = review.object.clone();
    json_patch::patch(&mut object, &patch.0).unwrap();
    assert_eq!(object["spec"]["replicas"], 10);
    assert_eq!(object["spec"]["paused"], false);
}

/// Story: a manifest that no longer mentions a protected label gets it back
#[tokio::test]
async fn story_removed_label_is_restored() {
    let review = Review {
        uid: "b8d1c2f4-0002",
        namespace: "shop",
        object: deployment(
            "shop",
            json!({
                "labels": {ENABLED_LABEL: "true"},
                "annotations": {PATHS_ANNOTATION: "/metadata/labels/team, /spec/replicas"}
            }),
            json!({"replicas": 3}),
        ),
        old_object: Some(deployment(
            "shop",
            json!({"labels": {ENABLED_LABEL: "true", "team": "payments"}}),
            json!({"replicas": 3}),
        )),
    };

    let response = send(ProtectionConfig::default(), &review).await;
    let patch = patch_of(&response).expect("patch should be present");
    assert_eq!(
        serde_json::to_value(&patch).unwrap(),
        json!([{"op": "add", "path": "/metadata/labels/team", "value": "payments"}])
    );

    let mut object = review.object.clone();
    json_patch::patch(&mut object, &patch.0).unwrap();
    assert_eq!(object["metadata"]["labels"]["team"], "payments");
}

/// Story: objects in platform namespaces are never touched
#[tokio::test]
async fn story_system_namespace_is_ignored() {
    let metadata = json!({
        "labels": {ENABLED_LABEL: "true"},
        "annotations": {PATHS_ANNOTATION: "/spec/replicas"}
    });
    let review = Review {
        uid: "b8d1c2f4-0003",
        namespace: "kube-system",
        object: deployment("kube-system", metadata.clone(), json!({"replicas": 1})),
        old_object: Some(deployment("kube-system", metadata, json!({"replicas": 2}))),
    };

    let response = send(ProtectionConfig::default(), &review).await;
    assert_eq!(response["allowed"], true);
    assert!(patch_of(&response).is_none());
}

/// Story: operators can point the webhook at their own label and annotation
#[tokio::test]
async fn story_custom_configuration() {
    let config = ProtectionConfig::from_yaml(
        "enabledLabel: example.com/protect\npathsAnnotation: example.com/protected-paths\nignoredNamespaces: []\n",
    )
    .unwrap();

    let metadata = json!({
        "labels": {"example.com/protect": "T"},
        "annotations": {"example.com/protected-paths": "/spec/replicas"}
    });
    let review = Review {
        uid: "b8d1c2f4-0004",
        namespace: "kube-system",
        object: deployment("kube-system", metadata.clone(), json!({"replicas": 1})),
        old_object: Some(deployment("kube-system", metadata, json!({"replicas": 2}))),
    };

    let response = send(config, &review).await;
    let patch = patch_of(&response).expect("patch should be present");
    assert_eq!(
        serde_json::to_value(&patch).unwrap(),
        json!([{"op": "replace", "path": "/spec/replicas", "value": 2}])
    );
}

/// Story: a typo in the enabling label is reported but never blocks the write
#[tokio::test]
async fn story_malformed_label_fails_open() {
    let review = Review {
        uid: "b8d1c2f4-0005",
        namespace: "shop",
        object: deployment(
            "shop",
            json!({
                "labels": {ENABLED_LABEL: "yes"},
                "annotations": {PATHS_ANNOTATION: "/spec/replicas"}
            }),
            json!({"replicas": 1}),
        ),
        old_object: Some(deployment("shop", json!({}), json!({"replicas": 10}))),
    };

    let response = send(ProtectionConfig::default(), &review).await;
    assert_eq!(response["uid"], "b8d1c2f4-0005");
    assert_eq!(response["allowed"], true);
    assert!(patch_of(&response).is_none());
    let message = response["status"]["message"].as_str().unwrap();
    assert!(message.contains("\"yes\""), "{message}");
}

/// Story: creating a protected object has nothing to restore
#[tokio::test]
async fn story_create_passes_through() {
    let review = Review {
        uid: "b8d1c2f4-0006",
        namespace: "shop",
        object: deployment(
            "shop",
            json!({
                "labels": {ENABLED_LABEL: "true"},
                "annotations": {PATHS_ANNOTATION: "/spec/replicas"}
            }),
            json!({"replicas": 1}),
        ),
        old_object: None,
    };

    let response = send(ProtectionConfig::default(), &review).await;
    assert_eq!(response["allowed"], true);
    assert!(patch_of(&response).is_none());
}

/// Story: a field the typed metadata does not know about is still protected
#[tokio::test]
async fn story_unmodelled_metadata_field_is_restored() {
    let review = Review {
        uid: "b8d1c2f4-0007",
        namespace: "shop",
        object: deployment(
            "shop",
            json!({
                "labels": {ENABLED_LABEL: "true"},
                "annotations": {PATHS_ANNOTATION: "/metadata/customField"},
                "customField": "new"
            }),
            json!({"replicas": 1}),
        ),
        old_object: Some(deployment("shop", json!({"customField": "old"}), json!({"replicas": 1}))),
    };

    let response = send(ProtectionConfig::default(), &review).await;
    assert_eq!(response["uid"], "b8d1c2f4-0007");
    let patch = patch_of(&response).expect("patch should be present");
    assert_eq!(
        serde_json::to_value(&patch).unwrap(),
        json!([{"op": "replace", "path": "/metadata/customField", "value": "old"}])
    );
}

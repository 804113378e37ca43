//! Cluster Mutation Webhook
//!
//! Handles AdmissionReview requests for CAPI Clusters: loads the referenced
//! ClusterClass, runs the recorder, and patches the resolved TKR label and
//! topology version onto the incoming object.

use std::sync::Arc;

use axum::{extract::State, Json};
use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use kube::{
    api::{Api, DynamicObject},
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    ResourceExt,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::WebhookState;
use crate::crd::{Cluster, ClusterClass};
use crate::recorder::{Recorder, ResolvedFields};
use crate::{Error, LABEL_TKR};

/// Status code reported when resolution fails for reasons outside the cluster
const INTERNAL_ERROR_CODE: u16 = 500;

/// Handle mutating admission review for Clusters
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Cluster>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<Cluster> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = mutate_cluster(&state, &req).await;
    Json(response.into_review())
}

/// Process a single cluster mutation request
async fn mutate_cluster(
    state: &WebhookState,
    request: &AdmissionRequest<Cluster>,
) -> AdmissionResponse {
    let uid = request.uid.clone();

    let Some(cluster) = &request.object else {
        debug!(uid = %uid, "No cluster object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };
    let Some(topology) = &cluster.spec.topology else {
        debug!(
            uid = %uid,
            cluster = %cluster.name_any(),
            "Cluster has no topology, allowing unchanged"
        );
        return AdmissionResponse::from(request);
    };

    let namespace = cluster
        .namespace()
        .or_else(|| request.namespace.clone())
        .unwrap_or_else(|| "default".to_string());
    let classes: Api<ClusterClass> = Api::namespaced(state.kube.clone(), &namespace);
    let class = match classes.get(&topology.class).await {
        Ok(class) => class,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            warn!(
                uid = %uid,
                cluster = %cluster.name_any(),
                class = %topology.class,
                "ClusterClass not found, denying to allow retry"
            );
            return AdmissionResponse::from(request).deny(format!(
                "ClusterClass '{}/{}' not found",
                namespace, topology.class
            ));
        }
        Err(e) => return error_response(request, cluster, &Error::from(e)),
    };

    admit(&state.recorder, request, cluster, &class)
}

/// Resolve a cluster and turn the outcome into an admission response
///
/// Separated from the ClusterClass lookup so it can run without an API
/// server.
pub fn admit(
    recorder: &Recorder,
    request: &AdmissionRequest<Cluster>,
    cluster: &Cluster,
    class: &ClusterClass,
) -> AdmissionResponse {
    let uid = &request.uid;
    let fields = match recorder.resolve_mutations(cluster, class) {
        Ok(Some(fields)) => fields,
        Ok(None) => {
            debug!(uid = %uid, cluster = %cluster.name_any(), "Cluster resolution unchanged");
            return AdmissionResponse::from(request);
        }
        Err(e) => return error_response(request, cluster, &e),
    };

    let patch_ops = build_patch_operations(cluster, &fields);
    info!(
        uid = %uid,
        cluster = %cluster.name_any(),
        tkr = %fields.tkr_label,
        patch_ops = patch_ops.len(),
        "Applying patch to cluster"
    );

    match AdmissionResponse::from(request).with_patch(json_patch::Patch(patch_ops)) {
        Ok(response) => response,
        Err(e) => error_response(request, cluster, &Error::serialization(e.to_string())),
    }
}

/// Deny a request, telling input errors apart from internal failures
///
/// Errors in the cluster's own inputs (or a catalog that cannot satisfy
/// them) are plain denials. Anything else is reported as an internal error
/// so the API server client can tell a retry might succeed.
pub fn error_response(
    request: &AdmissionRequest<Cluster>,
    cluster: &Cluster,
    err: &Error,
) -> AdmissionResponse {
    let uid = &request.uid;
    if err.is_user_error() {
        warn!(uid = %uid, cluster = %cluster.name_any(), error = %err, "Denying cluster");
        return AdmissionResponse::from(request).deny(err.to_string());
    }

    error!(uid = %uid, cluster = %cluster.name_any(), error = %err, "Failed to resolve cluster");
    let mut response = AdmissionResponse::from(request).deny(err.to_string());
    response.result.code = INTERNAL_ERROR_CODE;
    response.result.reason = "InternalError".to_string();
    response
}

/// Build JSON patch operations recording a resolution
///
/// `add` replaces existing members, so the same operations serve create and
/// update. A missing label map is created whole.
pub fn build_patch_operations(cluster: &Cluster, fields: &ResolvedFields) -> Vec<PatchOperation> {
    let label_op = if cluster.metadata.labels.is_some() {
        AddOperation {
            path: PointerBuf::from_tokens(["metadata", "labels", LABEL_TKR]),
            value: Value::String(fields.tkr_label.clone()),
        }
    } else {
        AddOperation {
            path: PointerBuf::from_tokens(["metadata", "labels"]),
            value: Value::Object(serde_json::Map::from_iter([(
                LABEL_TKR.to_string(),
                Value::String(fields.tkr_label.clone()),
            )])),
        }
    };

    vec![
        PatchOperation::Add(label_op),
        PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["spec", "topology", "version"]),
            value: Value::String(fields.topology_version.clone()),
        }),
    ]
}

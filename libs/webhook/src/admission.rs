//! Wire model of `admission.k8s.io/v1` reviews.
//!
//! Only what an admission webhook reads or writes is modelled. Embedded objects are kept
//! as raw JSON so the handler sees exactly what the API server sent.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::api::authentication::v1::UserInfo;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const STATUS_FAILURE: &str = "Failure";
pub const REASON_BAD_REQUEST: &str = "BadRequest";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AdmissionReview {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resource: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
    /// Any operation newer than this model.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub kind: GroupVersionKind,
    #[serde(default)]
    pub resource: GroupVersionResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_kind: Option<GroupVersionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_resource: Option<GroupVersionResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_sub_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(default)]
    pub user_info: UserInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Status {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
}

impl Status {
    /// Failure status reported for a denied request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_FAILURE.to_string(),
            message: message.into(),
            reason: REASON_BAD_REQUEST.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    /// Serialized as `status`, the key the API server reads the result from.
    #[serde(rename = "status", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Status>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_patch",
        deserialize_with = "deserialize_patch"
    )]
    pub patch: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,
}

impl AdmissionReview {
    /// Wrap a response in a review echoing the type metadata of the request review.
    pub fn respond(api_version: String, kind: String, response: AdmissionResponse) -> Self {
        Self {
            api_version,
            kind,
            request: None,
            response: Some(response),
        }
    }
}

fn serialize_patch<S: Serializer>(
    patch: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match patch {
        Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_patch<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<u8>>, D::Error> {
    Option::<String>::deserialize(deserializer)?
        .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::{AdmissionResponse, AdmissionReview, Operation, PatchType, Status};

    use serde_json::json;

    #[test]
    fn test_minimal_review_decodes() {
        let review: AdmissionReview =
            serde_json::from_value(json!({"request": {"uid": "abc"}})).unwrap();
        let request = review.request.unwrap();
        assert_eq!(request.uid, "abc");
        assert!(request.operation.is_none());
        assert!(request.object.is_none());
        assert!(review.api_version.is_empty());
    }

    #[test]
    fn test_full_request_decodes() {
        let review: AdmissionReview = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "apps", "version": "v1", "kind": "Deployment"},
                "resource": {"group": "apps", "version": "v1", "resource": "deployments"},
                "subResource": "scale",
                "name": "my-deployment",
                "namespace": "my-namespace",
                "operation": "UPDATE",
                "userInfo": {"username": "admin", "groups": ["system:authenticated"]},
                "object": {"spec": {"replicas": 3}},
                "oldObject": {"spec": {"replicas": 2}},
                "dryRun": false,
                "options": {"kind": "UpdateOptions", "apiVersion": "meta.k8s.io/v1"}
            }
        }))
        .unwrap();

        let request = review.request.unwrap();
        assert_eq!(request.kind.kind, "Deployment");
        assert_eq!(request.resource.resource, "deployments");
        assert_eq!(request.sub_resource.as_deref(), Some("scale"));
        assert_eq!(request.operation, Some(Operation::Update));
        assert_eq!(request.user_info.username.as_deref(), Some("admin"));
        assert_eq!(request.object.unwrap()["spec"]["replicas"], 3);
        assert_eq!(request.old_object.unwrap()["spec"]["replicas"], 2);
        assert_eq!(request.dry_run, Some(false));
    }

    #[test]
    fn test_unrecognised_operation_decodes() {
        let review: AdmissionReview = serde_json::from_value(json!({
            "request": {"uid": "abc", "operation": "PATCH"}
        }))
        .unwrap();
        assert_eq!(review.request.unwrap().operation, Some(Operation::Unknown));

        let review: AdmissionReview =
            serde_json::from_value(json!({"request": {"operation": "CONNECT"}})).unwrap();
        assert_eq!(review.request.unwrap().operation, Some(Operation::Connect));
    }

    #[test]
    fn test_allowed_response_omits_optional_fields() {
        let review = AdmissionReview::respond(
            "admission.k8s.io/v1".to_string(),
            "AdmissionReview".to_string(),
            AdmissionResponse {
                uid: "abc".to_string(),
                allowed: true,
                ..Default::default()
            },
        );
        assert_eq!(
            serde_json::to_value(&review).unwrap(),
            json!({
                "apiVersion": "admission.k8s.io/v1",
                "kind": "AdmissionReview",
                "response": {"uid": "abc", "allowed": true}
            })
        );
    }

    #[test]
    fn test_patch_is_base64_encoded() {
        let response = AdmissionResponse {
            uid: "abc".to_string(),
            allowed: true,
            result: None,
            patch: Some(br#"[{"op":"remove","path":"/a"}]"#.to_vec()),
            patch_type: Some(PatchType::JsonPatch),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["patch"], "W3sib3AiOiJyZW1vdmUiLCJwYXRoIjoiL2EifV0=");
        assert_eq!(value["patchType"], "JSONPatch");

        let decoded: AdmissionResponse = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_denied_status_shape() {
        let response = AdmissionResponse {
            uid: "abc".to_string(),
            allowed: false,
            result: Some(Status::bad_request("not allowed")),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "uid": "abc",
                "allowed": false,
                "status": {"status": "Failure", "message": "not allowed", "reason": "BadRequest"}
            })
        );
    }
}

//! Wire envelopes exchanged over the untyped broadcast transport.
//!
//! Envelopes are discriminated by a `type` field; request/response pairs are
//! correlated by `requestId`. Anything that does not parse as a known envelope
//! is ignored by receivers.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::Resource;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    #[serde(rename_all = "camelCase")]
    GetResources { request_id: String },
    #[serde(rename_all = "camelCase")]
    ResourcesResponse {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resources: Option<Vec<Resource>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteResource { request_id: String, resource: Resource },
    #[serde(rename_all = "camelCase")]
    DeleteResponse {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    OpenLogs { request_id: String, resource: Resource },
    #[serde(rename_all = "camelCase")]
    LogsResponse {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Fire-and-forget: context asks the palette to open/close.
    #[serde(rename_all = "camelCase")]
    Toggle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_id: Option<String>,
    },
    /// Fire-and-forget: palette asks a context to show a resource.
    #[serde(rename_all = "camelCase")]
    NavigateToResource { context_id: String, resource: Resource },
}

/// Request envelopes that expect exactly one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    GetResources,
    DeleteResource,
    OpenLogs,
}

/// Successful payload a request handler produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Resources(Vec<Resource>),
    Done,
}

impl RequestKind {
    pub fn type_tag(self) -> &'static str {
        match self {
            RequestKind::GetResources => "get-resources",
            RequestKind::DeleteResource => "delete-resource",
            RequestKind::OpenLogs => "open-logs",
        }
    }

    /// Build the response envelope for this request kind, success or error.
    pub fn respond(self, request_id: String, outcome: Result<Reply, String>) -> Envelope {
        match self {
            RequestKind::GetResources => match outcome {
                Ok(Reply::Resources(resources)) => Envelope::ResourcesResponse { request_id, resources: Some(resources), error: None },
                Ok(Reply::Done) => Envelope::ResourcesResponse { request_id, resources: Some(Vec::new()), error: None },
                Err(e) => Envelope::ResourcesResponse { request_id, resources: None, error: Some(e) },
            },
            RequestKind::DeleteResource => Envelope::DeleteResponse { request_id, error: outcome.err() },
            RequestKind::OpenLogs => Envelope::LogsResponse { request_id, error: outcome.err() },
        }
    }
}

impl Envelope {
    /// Parse an untyped transport message; unknown or malformed messages yield `None`.
    pub fn from_value(v: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(v.clone()).ok()
    }

    pub fn to_value(&self) -> serde_json::Value {
        // Serializing a plain data enum into a Value cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Envelope::GetResources { .. } => "get-resources",
            Envelope::ResourcesResponse { .. } => "resources-response",
            Envelope::DeleteResource { .. } => "delete-resource",
            Envelope::DeleteResponse { .. } => "delete-response",
            Envelope::OpenLogs { .. } => "open-logs",
            Envelope::LogsResponse { .. } => "logs-response",
            Envelope::Toggle { .. } => "toggle",
            Envelope::NavigateToResource { .. } => "navigate-to-resource",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Envelope::GetResources { request_id }
            | Envelope::ResourcesResponse { request_id, .. }
            | Envelope::DeleteResource { request_id, .. }
            | Envelope::DeleteResponse { request_id, .. }
            | Envelope::OpenLogs { request_id, .. }
            | Envelope::LogsResponse { request_id, .. } => Some(request_id),
            Envelope::Toggle { .. } | Envelope::NavigateToResource { .. } => None,
        }
    }

    pub fn request_kind(&self) -> Option<RequestKind> {
        match self {
            Envelope::GetResources { .. } => Some(RequestKind::GetResources),
            Envelope::DeleteResource { .. } => Some(RequestKind::DeleteResource),
            Envelope::OpenLogs { .. } => Some(RequestKind::OpenLogs),
            _ => None,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Envelope::ResourcesResponse { .. } | Envelope::DeleteResponse { .. } | Envelope::LogsResponse { .. }
        )
    }

    /// Error field carried by a response envelope, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Envelope::ResourcesResponse { error, .. }
            | Envelope::DeleteResponse { error, .. }
            | Envelope::LogsResponse { error, .. } => error.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_fields_are_exact() {
        let v = Envelope::GetResources { request_id: "r1".into() }.to_value();
        assert_eq!(v, json!({"type": "get-resources", "requestId": "r1"}));

        let v = Envelope::Toggle { context_id: None }.to_value();
        assert_eq!(v, json!({"type": "toggle"}));

        let v = Envelope::DeleteResponse { request_id: "r2".into(), error: Some("forbidden".into()) }.to_value();
        assert_eq!(v, json!({"type": "delete-response", "requestId": "r2", "error": "forbidden"}));

        let nav = Envelope::NavigateToResource { context_id: "c1".into(), resource: Resource::new("Pod", "a", Some("ns1")) };
        let v = nav.to_value();
        assert_eq!(v["type"], "navigate-to-resource");
        assert_eq!(v["contextId"], "c1");
        assert_eq!(v["resource"]["name"], "a");
    }

    #[test]
    fn unknown_or_malformed_messages_are_ignored() {
        assert!(Envelope::from_value(&json!({"type": "something-else", "requestId": "x"})).is_none());
        assert!(Envelope::from_value(&json!({"requestId": "x"})).is_none());
        assert!(Envelope::from_value(&json!("hello")).is_none());
        let parsed = Envelope::from_value(&json!({"type": "resources-response", "requestId": "x", "resources": []}));
        assert_eq!(parsed, Some(Envelope::ResourcesResponse { request_id: "x".into(), resources: Some(vec![]), error: None }));
    }

    #[test]
    fn respond_maps_outcome_to_matching_response_type() {
        let ok = RequestKind::GetResources.respond("a".into(), Ok(Reply::Resources(vec![Resource::new("Pod", "p", None)])));
        assert_eq!(ok.type_tag(), "resources-response");
        assert!(ok.error().is_none());
        let err = RequestKind::OpenLogs.respond("b".into(), Err("no such pod".into()));
        assert_eq!(err.type_tag(), "logs-response");
        assert_eq!(err.error(), Some("no such pod"));
        assert_eq!(err.request_id(), Some("b"));
        assert!(err.is_response());
    }
}

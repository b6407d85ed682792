//! Outcome of rectifying one pair, and the per-pair error taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::DeploymentId;

/// What happened to a pair. Serialized as the plain description string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResolutionDesc {
    Created,
    NotCreated,
    Updated,
    NotUpdated,
    Removed,
    NotRemoved,
    Unchanged,
    /// Unchanged, but the cluster still reports tasks starting.
    Coming,
    Other(String),
}

impl ResolutionDesc {
    pub fn as_str(&self) -> &str {
        match self {
            ResolutionDesc::Created => "created",
            ResolutionDesc::NotCreated => "not created",
            ResolutionDesc::Updated => "updated",
            ResolutionDesc::NotUpdated => "not updated",
            ResolutionDesc::Removed => "removed",
            ResolutionDesc::NotRemoved => "not removed",
            ResolutionDesc::Unchanged => "unchanged",
            ResolutionDesc::Coming => "coming",
            ResolutionDesc::Other(s) => s,
        }
    }
}

impl From<String> for ResolutionDesc {
    fn from(s: String) -> Self {
        match s.as_str() {
            "created" => ResolutionDesc::Created,
            "not created" => ResolutionDesc::NotCreated,
            "updated" => ResolutionDesc::Updated,
            "not updated" => ResolutionDesc::NotUpdated,
            "removed" => ResolutionDesc::Removed,
            "not removed" => ResolutionDesc::NotRemoved,
            "unchanged" => ResolutionDesc::Unchanged,
            "coming" => ResolutionDesc::Coming,
            _ => ResolutionDesc::Other(s),
        }
    }
}

impl From<ResolutionDesc> for String {
    fn from(desc: ResolutionDesc) -> Self {
        desc.as_str().to_string()
    }
}

impl fmt::Display for ResolutionDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolveErrorKind {
    /// No artifact could be found for the intended source.
    MissingImage,
    /// The artifact carries an advisory the cluster does not whitelist.
    UnacceptableAdvisory,
    Create,
    Delete,
    Change,
    /// The cluster reports the deployment as failed.
    FailedStatus,
    /// Anything else surfaced while resolving, e.g. a forwarded upstream
    /// failure.
    Other,
}

impl fmt::Display for ResolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolveErrorKind::MissingImage => "missing image",
            ResolveErrorKind::UnacceptableAdvisory => "unacceptable advisory",
            ResolveErrorKind::Create => "create",
            ResolveErrorKind::Delete => "delete",
            ResolveErrorKind::Change => "change",
            ResolveErrorKind::FailedStatus => "failed status",
            ResolveErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A per-pair failure. `retryable` is fixed at construction and travels
/// over the wire, so consumers never need to inspect the kind to decide.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[error("{kind}: {message}")]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ResolveError {
    pub fn new(kind: ResolveErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn missing_image(cause: impl fmt::Display) -> Self {
        Self::new(
            ResolveErrorKind::MissingImage,
            format!("no artifact found: {cause}"),
            false,
        )
    }

    pub fn unacceptable_advisory(advisory: &str, cluster: &str) -> Self {
        Self::new(
            ResolveErrorKind::UnacceptableAdvisory,
            format!("advisory {advisory:?} is not allowed in cluster {cluster}"),
            false,
        )
    }

    pub fn create(cause: impl fmt::Display) -> Self {
        Self::new(ResolveErrorKind::Create, cause.to_string(), true)
    }

    pub fn change(cause: impl fmt::Display) -> Self {
        Self::new(ResolveErrorKind::Change, cause.to_string(), true)
    }

    pub fn delete(cause: impl fmt::Display) -> Self {
        Self::new(ResolveErrorKind::Delete, cause.to_string(), false)
    }

    pub fn failed_status() -> Self {
        Self::new(
            ResolveErrorKind::FailedStatus,
            "deployment reported as failed by the cluster",
            false,
        )
    }

    pub fn is_transient(&self) -> bool {
        self.retryable
    }
}

/// The single outcome record for one rectified pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiffResolution {
    #[serde(rename = "DeploymentID")]
    pub deployment_id: DeploymentId,
    pub desc: ResolutionDesc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResolveError>,
}

impl DiffResolution {
    pub fn ok(deployment_id: DeploymentId, desc: ResolutionDesc) -> Self {
        Self {
            deployment_id,
            desc,
            error: None,
        }
    }

    pub fn failed(deployment_id: DeploymentId, desc: ResolutionDesc, error: ResolveError) -> Self {
        Self {
            deployment_id,
            desc,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for DiffResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{} {}", self.deployment_id, self.desc),
            Some(e) => write!(f, "{} {}: {e}", self.deployment_id, self.desc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desc_strings_roundtrip() {
        for desc in [
            ResolutionDesc::Created,
            ResolutionDesc::NotCreated,
            ResolutionDesc::Updated,
            ResolutionDesc::NotUpdated,
            ResolutionDesc::Removed,
            ResolutionDesc::NotRemoved,
            ResolutionDesc::Unchanged,
            ResolutionDesc::Coming,
        ] {
            let s: String = desc.clone().into();
            assert_eq!(ResolutionDesc::from(s), desc);
        }
        assert_eq!(
            ResolutionDesc::from("paused".to_string()),
            ResolutionDesc::Other("paused".into())
        );
    }

    #[test]
    fn transience_is_fixed_at_construction() {
        assert!(ResolveError::create("503").is_transient());
        assert!(ResolveError::change("503").is_transient());
        assert!(!ResolveError::delete("404").is_transient());
        assert!(!ResolveError::missing_image("no such tag").is_transient());
        assert!(!ResolveError::unacceptable_advisory("dirty", "east").is_transient());
        assert!(!ResolveError::failed_status().is_transient());
    }

    #[test]
    fn wire_shape() {
        let rez = DiffResolution::failed(
            DeploymentId::new("r", "", "", "c"),
            ResolutionDesc::NotCreated,
            ResolveError::create("timeout"),
        );
        let json = serde_json::to_value(&rez).unwrap();
        assert_eq!(json["Desc"], "not created");
        assert_eq!(json["Error"]["Retryable"], true);
        assert_eq!(json["DeploymentID"]["Cluster"], "c");

        let back: DiffResolution = serde_json::from_value(json).unwrap();
        assert_eq!(back, rez);
    }

    #[test]
    fn ok_resolution_omits_error() {
        let rez = DiffResolution::ok(DeploymentId::new("r", "", "", "c"), ResolutionDesc::Created);
        let json = serde_json::to_string(&rez).unwrap();
        assert!(!json.contains("Error"));
    }
}

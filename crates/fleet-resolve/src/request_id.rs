//! Cluster request IDs: how a deployment identity is named inside a
//! cluster, and how to read it back.
//!
//! Format: `{location}:{flavor}:{cluster}`, where the location is `repo`
//! or `repo,offset` with every `/` replaced by `>`.

use fleet_state::{DeploymentId, ManifestId, SourceLocation, StateError, StateResult};

pub fn make_request_id(id: &DeploymentId) -> String {
    let location = id.manifest_id.source.to_string().replace('/', ">");
    format!("{}:{}:{}", location, id.manifest_id.flavor, id.cluster)
}

pub fn parse_request_id(request_id: &str) -> StateResult<DeploymentId> {
    let invalid = |reason| StateError::InvalidRequestId {
        id: request_id.to_string(),
        reason,
    };

    let parts: Vec<&str> = request_id.split(':').collect();
    let [location, flavor, cluster] = parts.as_slice() else {
        return Err(invalid("should contain exactly 2 colons"));
    };
    if location.is_empty() {
        return Err(invalid("empty source location"));
    }
    if cluster.is_empty() {
        return Err(invalid("empty cluster name"));
    }

    let location = location.replace('>', "/");
    let (repo, dir) = location.split_once(',').unwrap_or((location.as_str(), ""));
    Ok(DeploymentId {
        manifest_id: ManifestId {
            source: SourceLocation::new(repo, dir),
            flavor: flavor.to_string(),
        },
        cluster: cluster.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slashes_become_angle_brackets() {
        let id = DeploymentId::new("github.com/acme/web", "", "", "east");
        assert_eq!(make_request_id(&id), "github.com>acme>web::east");

        let id = DeploymentId::new("github.com/acme/web", "api/v2", "canary", "east");
        assert_eq!(make_request_id(&id), "github.com>acme>web,api>v2:canary:east");
    }

    #[test]
    fn parse_inverts_make() {
        for id in [
            DeploymentId::new("github.com/acme/web", "", "", "east"),
            DeploymentId::new("github.com/acme/web", "api", "canary", "west-2"),
        ] {
            assert_eq!(parse_request_id(&make_request_id(&id)).unwrap(), id);
        }
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["no-colons", "a:b", "a:b:c:d", ":flavor:east", "repo:flavor:"] {
            assert!(parse_request_id(bad).is_err(), "{bad} should not parse");
        }
    }
}

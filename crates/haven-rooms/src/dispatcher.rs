//! Entry point: join a room by ID or alias.

use haven_common::{RoomAlias, RoomId};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::{
    builder::{MembershipDraft, join_content},
    candidates::{CandidateList, dedup_servers, resolve_candidates},
    capabilities::CapabilityError,
    context::{JoinRequest, JoinServices},
    federated::{AttemptError, FederatedJoinError, join_via_server},
    local::{LocalJoin, join_locally},
    outcome::{BadRequest, JoinError, JoinOutcome},
    target::RoomTarget,
};

/// Join `target` (`!room:server` or `#alias:server`) as `request.user_id`.
///
/// The room is joined locally when this server is already in it; otherwise
/// each candidate server is tried in order until one handshake succeeds.
pub async fn join_room(
    services: &JoinServices,
    target: &str,
    request: &JoinRequest,
) -> JoinOutcome {
    let target = RoomTarget::parse(target)?;

    let profile = services
        .profiles
        .profile(&request.user_id)
        .await
        .map_err(|e| JoinError::Internal(anyhow::Error::new(e).context("loading profile")))?;
    let content = join_content(&request.content, &profile);

    let (room_id, candidates) = match target {
        RoomTarget::Id(room_id) => {
            let candidates = candidates_for_room(services, request, &room_id).await?;
            (room_id, candidates)
        }
        RoomTarget::Alias(alias) if alias.server_name() == services.server_name => {
            let room_id = services
                .local_directory
                .resolve_alias(&alias)
                .await
                .map_err(|e| {
                    JoinError::Internal(anyhow::Error::new(e).context("resolving local alias"))
                })?
                .ok_or_else(|| JoinError::NotFound(format!("Room alias {} not found.", alias)))?;
            let candidates = candidates_for_room(services, request, &room_id).await?;
            (room_id, candidates)
        }
        RoomTarget::Alias(alias) => resolve_remote_alias(services, &alias).await?,
    };

    join_using_servers(services, request, &content, &room_id, candidates).await
}

async fn candidates_for_room(
    services: &JoinServices,
    request: &JoinRequest,
    room_id: &RoomId,
) -> Result<CandidateList, JoinError> {
    let inviters = services
        .invites
        .inviters(room_id, &request.user_id)
        .await
        .map_err(|e| JoinError::Internal(anyhow::Error::new(e).context("querying invites")))?;
    Ok(resolve_candidates(&inviters, room_id, &services.server_name))
}

async fn resolve_remote_alias(
    services: &JoinServices,
    alias: &RoomAlias,
) -> Result<(RoomId, CandidateList), JoinError> {
    let server = alias.server_name();
    debug!(alias = %alias, server = %server, "Resolving alias over federation");
    let resolved = services
        .bounded(services.remote_directory.lookup_alias(&server, alias))
        .await
        .map_err(|_| {
            JoinError::Upstream(anyhow::anyhow!("alias lookup via {} timed out", server))
        })?;

    match resolved {
        Ok(resolved) => Ok((resolved.room_id, dedup_servers(resolved.servers))),
        Err(CapabilityError::NotFound) => Err(JoinError::NotFound("Room alias not found".into())),
        Err(CapabilityError::Other(e)) => {
            error!(alias = %alias, server = %server, error = %e, "Remote alias lookup failed");
            Err(JoinError::Upstream(e.context(format!("alias lookup via {}", server))))
        }
    }
}

async fn join_using_servers(
    services: &JoinServices,
    request: &JoinRequest,
    content: &Map<String, Value>,
    room_id: &RoomId,
    candidates: CandidateList,
) -> JoinOutcome {
    let draft = MembershipDraft::new(&request.user_id, room_id, content);
    match join_locally(services, request, &draft).await {
        Ok(LocalJoin::Joined(room_id)) => return Ok(room_id),
        Ok(LocalJoin::RoomAbsent) => {}
        Err(e) => {
            error!(room_id = %room_id, error = %e, "Local join failed");
            return Err(JoinError::Internal(e));
        }
    }

    if candidates.is_empty() {
        return Err(JoinError::NotFound("No candidate servers found for room".into()));
    }

    let mut last_failure: Option<AttemptError> = None;
    for server in &candidates {
        // A failed attempt discards its event; each server gets a fresh draft.
        let draft = MembershipDraft::new(&request.user_id, room_id, content);
        match join_via_server(services, request, &draft, server).await {
            Ok(room_id) => return Ok(room_id),
            Err(FederatedJoinError::Attempt(e)) => {
                warn!(server = %server, error = %e, "Failed to join room using server");
                last_failure = Some(e);
            }
            Err(FederatedJoinError::Fatal(e)) => {
                error!(server = %server, error = %e, "Join failed after remote acceptance");
                return Err(JoinError::Internal(e));
            }
        }
    }

    Err(exhausted(last_failure))
}

/// Classify the failure once every candidate has been tried.
///
/// An unsupported room version as the final cause is something the client
/// can act on, so it is reported as a bad request.
fn exhausted(last_failure: Option<AttemptError>) -> JoinError {
    match last_failure {
        None => JoinError::NotFound("No candidate servers found for room".into()),
        Some(AttemptError::UnsupportedRoomVersion { version, .. }) => {
            BadRequest::UnsupportedRoomVersion(version.to_string()).into()
        }
        Some(e) => {
            error!(error = %e, "Failed to join through any server");
            JoinError::Upstream(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[tokio::test]
    async fn remote_alias_scenario() {
        let h = Harness::new()
            .with_alias("#foo:example.org", "!abc:example.org", &["example.org"])
            .with_remote("example.org", Some("5"));

        let room = join_room(&h.services(), "#foo:example.org", &h.request).await.unwrap();

        assert_eq!(room.as_str(), "!abc:example.org");
        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0.pdu().content().unwrap()["membership"], "join");
    }

    #[tokio::test]
    async fn invalid_leading_character() {
        let h = Harness::new();
        let err = join_room(&h.services(), "@not-a-room-or-alias", &h.request).await.unwrap_err();
        assert!(matches!(err, JoinError::BadRequest(BadRequest::InvalidTarget('@'))));
        assert!(h.federation.calls().is_empty());
    }

    #[tokio::test]
    async fn local_room_joins_without_federation() {
        let h = Harness::new().with_local_room("!abc:haven.example.com", "6");

        let room = join_room(&h.services(), "!abc:haven.example.com", &h.request).await.unwrap();

        assert_eq!(room.as_str(), "!abc:haven.example.com");
        assert!(h.federation.calls().is_empty());
        let (event, state) = h.publisher.published().remove(0);
        assert!(!state);
        assert_eq!(event.pdu().depth(), 11);
        assert_eq!(event.pdu().prev_event_ids(), ["$latest"]);
        assert_eq!(event.pdu().content().unwrap()["displayname"], "Alice");
    }

    #[tokio::test]
    async fn local_alias_resolves_through_directory() {
        let h = Harness::new()
            .with_local_alias("#lobby:haven.example.com", "!abc:haven.example.com")
            .with_local_room("!abc:haven.example.com", "6");

        let room = join_room(&h.services(), "#lobby:haven.example.com", &h.request).await.unwrap();
        assert_eq!(room.as_str(), "!abc:haven.example.com");
    }

    #[tokio::test]
    async fn unknown_local_alias_is_not_found() {
        let h = Harness::new();
        let err =
            join_room(&h.services(), "#nope:haven.example.com", &h.request).await.unwrap_err();
        assert!(matches!(err, JoinError::NotFound(_)));
    }

    #[tokio::test]
    async fn remote_alias_not_found() {
        let h = Harness::new();
        let err = join_room(&h.services(), "#nope:example.org", &h.request).await.unwrap_err();
        assert!(matches!(err, JoinError::NotFound(_)));
    }

    #[tokio::test]
    async fn remote_alias_lookup_error_is_upstream() {
        let h = Harness::new();
        h.remote_directory.fail();
        let err = join_room(&h.services(), "#foo:example.org", &h.request).await.unwrap_err();
        assert!(matches!(err, JoinError::Upstream(_)));
    }

    #[tokio::test]
    async fn absent_room_with_no_candidates_is_not_found() {
        let h = Harness::new();
        let err = join_room(&h.services(), "!abc:haven.example.com", &h.request).await.unwrap_err();
        assert!(matches!(err, JoinError::NotFound(_)));
        assert!(h.federation.calls().is_empty());
    }

    #[tokio::test]
    async fn first_success_stops_the_loop() {
        let h = Harness::new()
            .with_inviters(&["@bob:one.example", "@carol:two.example"])
            .with_remote("one.example", Some("5"))
            .with_remote("two.example", Some("5"));

        join_room(&h.services(), "!abc:example.org", &h.request).await.unwrap();

        let servers: Vec<String> = h.federation.calls().into_iter().map(|(s, _)| s).collect();
        assert!(servers.iter().all(|s| s == "one.example"));
        assert_eq!(h.federation.count("make_join"), 1);
    }

    #[tokio::test]
    async fn fallback_uses_the_succeeding_servers_version() {
        let h = Harness::new()
            .with_inviters(&["@bob:one.example"])
            .with_remote("one.example", Some("3"))
            .with_remote("example.org", Some("6"));
        h.federation.fail_make_join("one.example");

        join_room(&h.services(), "!abc:example.org", &h.request).await.unwrap();

        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0.room_version().as_str(), "6");
        assert_eq!(h.federation.count("make_join"), 2);
    }

    #[tokio::test]
    async fn rejected_verification_moves_on_without_publishing() {
        let h = Harness::new()
            .with_inviters(&["@bob:one.example"])
            .with_remote("one.example", Some("5"))
            .with_remote("example.org", Some("5"));
        h.trust.reject("one.example");

        join_room(&h.services(), "!abc:example.org", &h.request).await.unwrap();

        assert_eq!(h.publisher.published().len(), 1);
        assert_eq!(h.federation.count("send_join"), 2);
    }

    #[tokio::test]
    async fn sole_unsupported_version_is_bad_request() {
        let h = Harness::new().with_remote("example.org", Some("99"));
        let err = join_room(&h.services(), "!abc:example.org", &h.request).await.unwrap_err();
        assert!(matches!(
            err,
            JoinError::BadRequest(BadRequest::UnsupportedRoomVersion(ref v)) if v == "99"
        ));
    }

    #[tokio::test]
    async fn unsupported_version_does_not_stop_the_loop() {
        let h = Harness::new()
            .with_inviters(&["@bob:one.example"])
            .with_remote("one.example", Some("99"))
            .with_remote("example.org", Some("5"));

        let room = join_room(&h.services(), "!abc:example.org", &h.request).await.unwrap();
        assert_eq!(room.as_str(), "!abc:example.org");
    }

    #[tokio::test]
    async fn exhausted_candidates_keep_the_last_cause() {
        let h = Harness::new()
            .with_inviters(&["@bob:one.example"])
            .with_remote("one.example", Some("5"))
            .with_remote("example.org", Some("5"));
        h.federation.fail_make_join("one.example");
        h.federation.fail_send_join("example.org");

        let err = join_room(&h.services(), "!abc:example.org", &h.request).await.unwrap_err();
        let JoinError::Upstream(cause) = err else {
            panic!("expected upstream failure, got {err:?}")
        };
        let attempt = cause.downcast_ref::<AttemptError>().unwrap();
        assert!(matches!(attempt, AttemptError::SendJoin { .. }));
        assert_eq!(attempt.server().as_str(), "example.org");
        assert!(h.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn local_failure_is_not_retried_remotely() {
        let h = Harness::new()
            .with_inviters(&["@bob:one.example"])
            .with_remote("one.example", Some("5"));
        h.room_state.fail();

        let err = join_room(&h.services(), "!abc:example.org", &h.request).await.unwrap_err();
        assert!(matches!(err, JoinError::Internal(_)));
        assert!(h.federation.calls().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_after_acceptance_is_not_retried() {
        let h = Harness::new()
            .with_inviters(&["@bob:one.example"])
            .with_remote("one.example", Some("5"))
            .with_remote("example.org", Some("5"));
        h.publisher.fail();

        let err = join_room(&h.services(), "!abc:example.org", &h.request).await.unwrap_err();
        assert!(matches!(err, JoinError::Internal(_)));
        assert_eq!(h.federation.count("send_join"), 1);
    }
}

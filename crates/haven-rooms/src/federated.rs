//! The make_join / sign / send_join / verify handshake against one server.

use anyhow::Context as _;
use haven_common::{RoomId, ServerName};
use haven_federation::RoomVersionId;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    builder::MembershipDraft,
    capabilities::CapabilityError,
    context::{JoinRequest, JoinServices, TimedOut},
};

/// A single candidate failed; the caller moves on to the next one.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("make_join via {server} failed: {source}")]
    MakeJoin { server: ServerName, source: CapabilityError },

    #[error("{server} offered unsupported room version '{version}'")]
    UnsupportedRoomVersion { server: ServerName, version: RoomVersionId },

    #[error("send_join via {server} failed: {source}")]
    SendJoin { server: ServerName, source: CapabilityError },

    #[error("send_join response from {server} failed verification: {source}")]
    Verification { server: ServerName, source: CapabilityError },

    #[error("{step} via {server} timed out")]
    TimedOut { server: ServerName, step: &'static str },
}

impl AttemptError {
    pub fn server(&self) -> &ServerName {
        match self {
            AttemptError::MakeJoin { server, .. }
            | AttemptError::UnsupportedRoomVersion { server, .. }
            | AttemptError::SendJoin { server, .. }
            | AttemptError::Verification { server, .. }
            | AttemptError::TimedOut { server, .. } => server,
        }
    }
}

/// Outcome of [`join_via_server`] when it does not succeed.
#[derive(Debug, Error)]
pub enum FederatedJoinError {
    #[error(transparent)]
    Attempt(#[from] AttemptError),

    /// Local signing or publication failed; not retried elsewhere.
    #[error(transparent)]
    Fatal(anyhow::Error),
}

fn timed_out(server: &ServerName, step: &'static str) -> impl FnOnce(TimedOut) -> AttemptError {
    let server = server.clone();
    move |TimedOut| AttemptError::TimedOut { server, step }
}

/// Join `draft.room_id()` through `server`.
///
/// The remote template only contributes event-graph linkage; every field the
/// draft owns is overwritten before signing. A response that fails
/// verification is never published.
pub async fn join_via_server(
    services: &JoinServices,
    request: &JoinRequest,
    draft: &MembershipDraft,
    server: &ServerName,
) -> Result<RoomId, FederatedJoinError> {
    let room_id = draft.room_id();
    let supported = services.room_state.supported_room_versions();

    debug!(server = %server, room_id = %room_id, "Requesting join template");
    let made = services
        .bounded(services.federation.make_join(server, room_id, &request.user_id, &supported))
        .await
        .map_err(timed_out(server, "make_join"))?
        .map_err(|source| AttemptError::MakeJoin { server: server.clone(), source })?;

    let mut template = made.event;
    draft.write_to(&mut template);

    // Servers that predate room versions omit the field or leave it empty.
    let version = made
        .room_version
        .filter(|v| !v.as_str().is_empty())
        .unwrap_or_else(RoomVersionId::v1);
    if !version.is_known() || !supported.contains(&version) {
        return Err(AttemptError::UnsupportedRoomVersion { server: server.clone(), version }.into());
    }

    let event = template
        .build(
            request.origin_server_ts,
            services.server_name.as_str(),
            &services.key_pair,
            &version,
        )
        .context("signing join event")
        .map_err(FederatedJoinError::Fatal)?;

    debug!(
        server = %server,
        event_id = %event.event_id(),
        room_version = %version,
        "Submitting join"
    );
    let response = services
        .bounded(services.federation.send_join(server, &event))
        .await
        .map_err(timed_out(server, "send_join"))?
        .map_err(|source| AttemptError::SendJoin { server: server.clone(), source })?;

    services
        .bounded(services.trust.verify_send_join(&response, &event, room_id))
        .await
        .map_err(timed_out(server, "verification"))?
        .map_err(|source| AttemptError::Verification { server: server.clone(), source })?;

    let event_id = event.event_id().to_owned();
    services
        .publisher
        .publish(event, Some(response))
        .await
        .context("publishing accepted join event")
        .map_err(FederatedJoinError::Fatal)?;

    info!(
        server = %server,
        room_id = %room_id,
        event_id = %event_id,
        "Joined room over federation"
    );
    Ok(room_id.clone())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{builder::join_content, capabilities::Profile, testing::Harness};

    fn draft(h: &Harness) -> MembershipDraft {
        MembershipDraft::new(
            &h.request.user_id,
            &RoomId::parse("!abc:example.org").unwrap(),
            &join_content(&h.request.content, &Profile::default()),
        )
    }

    #[tokio::test]
    async fn successful_handshake_publishes_with_state() {
        let h = Harness::new().with_remote("example.org", Some("5"));
        let room = join_via_server(&h.services(), &h.request, &draft(&h), &"example.org".into())
            .await
            .unwrap();

        assert_eq!(room.as_str(), "!abc:example.org");
        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].1, "state snapshot is handed over");
        assert_eq!(published[0].0.room_version().as_str(), "5");
    }

    #[tokio::test]
    async fn remote_template_cannot_change_membership() {
        let h = Harness::new().with_remote("example.org", Some("4"));
        join_via_server(&h.services(), &h.request, &draft(&h), &"example.org".into())
            .await
            .unwrap();

        let (event, _) = h.publisher.published().remove(0);
        let pdu = event.pdu();
        assert_eq!(pdu.sender(), Some("@alice:haven.example.com"));
        assert_eq!(pdu.state_key(), Some("@alice:haven.example.com"));
        assert_eq!(pdu.room_id(), Some("!abc:example.org"));
        assert_eq!(pdu.content().unwrap()["membership"], "join");
        // Linkage from the template is kept.
        assert_eq!(pdu.prev_event_ids(), ["$prev:example.org"]);
        assert_eq!(pdu.depth(), 7);
    }

    #[tokio::test]
    async fn missing_room_version_means_v1() {
        let h = Harness::new().with_remote("example.org", None);
        join_via_server(&h.services(), &h.request, &draft(&h), &"example.org".into())
            .await
            .unwrap();
        assert_eq!(h.publisher.published()[0].0.room_version().as_str(), "1");
    }

    #[tokio::test]
    async fn empty_room_version_means_v1() {
        let h = Harness::new().with_remote("example.org", Some(""));
        join_via_server(&h.services(), &h.request, &draft(&h), &"example.org".into())
            .await
            .unwrap();
        assert_eq!(h.publisher.published()[0].0.room_version().as_str(), "1");
    }

    #[tokio::test]
    async fn unknown_room_version_stops_before_send_join() {
        let h = Harness::new().with_remote("example.org", Some("org.example.custom"));
        let err = join_via_server(&h.services(), &h.request, &draft(&h), &"example.org".into())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FederatedJoinError::Attempt(AttemptError::UnsupportedRoomVersion { .. })
        ));
        assert_eq!(h.federation.calls(), [("example.org".to_owned(), "make_join")]);
    }

    #[tokio::test]
    async fn known_but_unadvertised_version_is_unsupported() {
        let h = Harness::new().with_supported(&["1", "2"]).with_remote("example.org", Some("5"));
        let err = join_via_server(&h.services(), &h.request, &draft(&h), &"example.org".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FederatedJoinError::Attempt(AttemptError::UnsupportedRoomVersion { .. })
        ));
    }

    #[tokio::test]
    async fn failed_verification_is_never_published() {
        let h = Harness::new().with_remote("example.org", Some("5"));
        h.trust.reject("example.org");
        let err = join_via_server(&h.services(), &h.request, &draft(&h), &"example.org".into())
            .await
            .unwrap_err();

        assert!(matches!(err, FederatedJoinError::Attempt(AttemptError::Verification { .. })));
        assert!(h.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn publisher_failure_is_fatal() {
        let h = Harness::new().with_remote("example.org", Some("5"));
        h.publisher.fail();
        let err = join_via_server(&h.services(), &h.request, &draft(&h), &"example.org".into())
            .await
            .unwrap_err();
        assert!(matches!(err, FederatedJoinError::Fatal(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let h = Harness::new()
            .with_remote("slow.example", Some("5"))
            .with_timeout(Duration::from_millis(50));
        h.federation.delay("slow.example", Duration::from_secs(5));
        let err = join_via_server(&h.services(), &h.request, &draft(&h), &"slow.example".into())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FederatedJoinError::Attempt(AttemptError::TimedOut { step: "make_join", .. })
        ));
    }
}

//! Joining a room this server already participates in.

use anyhow::Context as _;
use haven_common::RoomId;
use tracing::{debug, info};

use crate::{
    builder::MembershipDraft,
    context::{JoinRequest, JoinServices},
};

/// Result of a local join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalJoin {
    Joined(RoomId),
    /// No local state for the room; the caller should try federation.
    RoomAbsent,
}

/// Place the join on top of the local event graph, sign it, and publish it.
///
/// Errors are fatal for the request.
pub async fn join_locally(
    services: &JoinServices,
    request: &JoinRequest,
    draft: &MembershipDraft,
) -> anyhow::Result<LocalJoin> {
    let room_id = draft.room_id();
    let Some(snapshot) = services
        .room_state
        .room_snapshot(room_id, &draft.state_needed())
        .await
        .context("querying local room state")?
    else {
        debug!(room_id = %room_id, "Room not present locally");
        return Ok(LocalJoin::RoomAbsent);
    };

    let format = snapshot.room_version.event_format()?;
    let mut template = draft.template();
    template.prev_events = format.references(&snapshot.latest_events);
    template.auth_events = format.references(&snapshot.auth_events);
    template.depth = snapshot.max_depth + 1;

    let event = template
        .build(
            request.origin_server_ts,
            services.server_name.as_str(),
            &services.key_pair,
            &snapshot.room_version,
        )
        .context("signing local join event")?;

    let event_id = event.event_id().to_owned();
    services.publisher.publish(event, None).await.context("publishing local join event")?;

    info!(
        room_id = %room_id,
        event_id = %event_id,
        user_id = %request.user_id,
        "Joined room locally"
    );
    Ok(LocalJoin::Joined(room_id.clone()))
}

//! Which remote servers to ask when joining a room we are not in.

use haven_common::{RoomId, ServerName, UserId};

/// Ordered, duplicate-free list of servers to try, first success wins.
pub type CandidateList = Vec<ServerName>;

/// Inviters' servers in first-seen order, then the room ID's own server as
/// a last resort unless it is us or already listed. A room ID's server is
/// only where the room was created, so inviters go first.
pub fn resolve_candidates(
    inviters: &[UserId],
    room_id: &RoomId,
    local_server: &ServerName,
) -> CandidateList {
    let mut servers = CandidateList::new();
    for inviter in inviters {
        push_unique(&mut servers, inviter.server_name());
    }

    let room_server = room_id.server_name();
    if room_server != *local_server {
        push_unique(&mut servers, room_server);
    }
    servers
}

/// Servers returned by a remote directory, deduplicated in order.
pub fn dedup_servers(servers: impl IntoIterator<Item = ServerName>) -> CandidateList {
    let mut out = CandidateList::new();
    for server in servers {
        push_unique(&mut out, server);
    }
    out
}

// Lists are a handful of entries; a linear scan keeps insertion order.
fn push_unique(servers: &mut CandidateList, server: ServerName) {
    if !servers.contains(&server) {
        servers.push(server);
    }
}

//! Admitting accepted join events into the local room store.
//!
//! Everything for one join is written in a single transaction: the room row,
//! any state and auth chain received over federation (as outliers), the join
//! event itself, the new forward extremity, and current state.

use async_trait::async_trait;
use haven_db::repository::{invites, rooms};
use haven_federation::{Pdu, RoomVersionRules, SendJoinResponse, SignedEvent};
use haven_rooms::capabilities::{CapabilityError, EventPublisher};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

/// [`EventPublisher`] over PostgreSQL.
pub struct RoomEventPublisher {
    pool: PgPool,
}

impl RoomEventPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn malformed(what: &str) -> CapabilityError {
    CapabilityError::Other(anyhow::anyhow!("event has no {}", what))
}

/// Store a state or auth-chain event received with a join.
async fn store_outlier(
    conn: &mut PgConnection,
    pdu: &Pdu,
    rules: &RoomVersionRules,
) -> Result<String, CapabilityError> {
    let event_id = pdu.event_id(rules).map_err(|e| CapabilityError::Other(e.into()))?;
    let json = pdu.to_value();
    let new = rooms::NewEvent {
        event_id: &event_id,
        room_id: pdu.room_id().ok_or_else(|| malformed("room_id"))?,
        event_type: pdu.event_type().ok_or_else(|| malformed("type"))?,
        state_key: pdu.state_key(),
        sender: pdu.sender().ok_or_else(|| malformed("sender"))?,
        depth: pdu.depth(),
        origin_server_ts: pdu.origin_server_ts(),
        event_json: &json,
        is_outlier: true,
    };
    rooms::insert_event(conn, &new).await.map_err(|e| CapabilityError::Other(e.into()))?;
    Ok(event_id)
}

#[async_trait]
impl EventPublisher for RoomEventPublisher {
    async fn publish(
        &self,
        event: SignedEvent,
        state: Option<SendJoinResponse>,
    ) -> Result<(), CapabilityError> {
        let db = |e: sqlx::Error| CapabilityError::Other(e.into());
        let rules = event.room_version().rules().map_err(|e| CapabilityError::Other(e.into()))?;
        let pdu = event.pdu();
        let room_id = pdu.room_id().ok_or_else(|| malformed("room_id"))?;
        let sender = pdu.sender().ok_or_else(|| malformed("sender"))?;
        let event_type = pdu.event_type().ok_or_else(|| malformed("type"))?;

        let mut tx = self.pool.begin().await.map_err(db)?;
        rooms::ensure_room(&mut tx, room_id, event.room_version().as_str()).await.map_err(db)?;

        if let Some(state) = &state {
            for auth in &state.auth_chain {
                store_outlier(&mut tx, auth, &rules).await?;
            }
            for current in &state.state {
                let event_id = store_outlier(&mut tx, current, &rules).await?;
                if let (Some(kind), Some(key)) = (current.event_type(), current.state_key()) {
                    rooms::set_current_state(&mut tx, room_id, kind, key, &event_id)
                        .await
                        .map_err(db)?;
                }
            }
            debug!(
                room_id,
                state = state.state.len(),
                auth_chain = state.auth_chain.len(),
                "Stored room state received with join"
            );
        }

        let json = pdu.to_value();
        let inserted = rooms::insert_event(
            &mut tx,
            &rooms::NewEvent {
                event_id: event.event_id(),
                room_id,
                event_type,
                state_key: pdu.state_key(),
                sender,
                depth: pdu.depth(),
                origin_server_ts: pdu.origin_server_ts(),
                event_json: &json,
                is_outlier: false,
            },
        )
        .await
        .map_err(db)?;
        if !inserted {
            debug!(event_id = event.event_id(), "Join event was already stored");
        }

        let prev_events = pdu.prev_event_ids();
        rooms::advance_forward_extremities(&mut tx, room_id, event.event_id(), &prev_events)
            .await
            .map_err(db)?;
        if let Some(state_key) = pdu.state_key() {
            rooms::set_current_state(&mut tx, room_id, event_type, state_key, event.event_id())
                .await
                .map_err(db)?;
        }
        invites::retire_invites(&mut tx, room_id, sender).await.map_err(db)?;
        tx.commit().await.map_err(db)?;

        info!(room_id, event_id = event.event_id(), "Published join event");
        Ok(())
    }
}

//! In-memory collaborators with call recorders, shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use haven_common::{RoomAlias, RoomId, ServerName, UserId};
use haven_federation::{
    EventReference, MakeJoinResponse, ProtoEvent, RoomVersionId, SendJoinResponse, ServerKeyPair,
    SignedEvent, room_version::known_room_versions,
};
use serde_json::{Map, json};

use crate::{
    capabilities::{
        CapabilityError, EventPublisher, FederationApi, InviteQuery, LocalDirectory, Profile,
        ProfileQuery, RemoteDirectory, ResolvedAlias, RoomSnapshot, RoomStateQuery, TrustVerifier,
    },
    context::{JoinRequest, JoinServices},
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeInvites {
    inviters: Mutex<Vec<UserId>>,
}

#[async_trait]
impl InviteQuery for FakeInvites {
    async fn inviters(
        &self,
        _room_id: &RoomId,
        _user_id: &UserId,
    ) -> Result<Vec<UserId>, CapabilityError> {
        Ok(self.inviters.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeLocalDirectory {
    aliases: Mutex<HashMap<String, RoomId>>,
}

#[async_trait]
impl LocalDirectory for FakeLocalDirectory {
    async fn resolve_alias(&self, alias: &RoomAlias) -> Result<Option<RoomId>, CapabilityError> {
        Ok(self.aliases.lock().unwrap().get(alias.as_str()).cloned())
    }
}

#[derive(Default)]
pub struct FakeRemoteDirectory {
    aliases: Mutex<HashMap<String, ResolvedAlias>>,
    fail: AtomicBool,
}

impl FakeRemoteDirectory {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteDirectory for FakeRemoteDirectory {
    async fn lookup_alias(
        &self,
        _server: &ServerName,
        alias: &RoomAlias,
    ) -> Result<ResolvedAlias, CapabilityError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused").into());
        }
        self.aliases.lock().unwrap().get(alias.as_str()).cloned().ok_or(CapabilityError::NotFound)
    }
}

pub struct FakeProfiles;

#[async_trait]
impl ProfileQuery for FakeProfiles {
    async fn profile(&self, _user_id: &UserId) -> Result<Profile, CapabilityError> {
        Ok(Profile {
            display_name: "Alice".into(),
            avatar_url: "mxc://haven.example.com/alice".into(),
        })
    }
}

pub struct FakeRoomState {
    supported: Mutex<Vec<RoomVersionId>>,
    rooms: Mutex<HashMap<String, RoomSnapshot>>,
    fail: AtomicBool,
}

impl Default for FakeRoomState {
    fn default() -> Self {
        Self {
            supported: Mutex::new(known_room_versions().collect()),
            rooms: Mutex::default(),
            fail: AtomicBool::new(false),
        }
    }
}

impl FakeRoomState {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoomStateQuery for FakeRoomState {
    fn supported_room_versions(&self) -> Vec<RoomVersionId> {
        self.supported.lock().unwrap().clone()
    }

    async fn room_snapshot(
        &self,
        room_id: &RoomId,
        _state_needed: &[(String, String)],
    ) -> Result<Option<RoomSnapshot>, CapabilityError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("database is down").into());
        }
        Ok(self.rooms.lock().unwrap().get(room_id.as_str()).cloned())
    }
}

#[derive(Debug, Clone, Default)]
struct Remote {
    room_version: Option<String>,
    fail_make_join: bool,
    fail_send_join: bool,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeFederation {
    remotes: Mutex<HashMap<String, Remote>>,
    calls: Mutex<Vec<(String, &'static str)>>,
}

impl FakeFederation {
    fn update(&self, server: &str, f: impl FnOnce(&mut Remote)) {
        f(self.remotes.lock().unwrap().entry(server.to_owned()).or_default());
    }

    pub fn fail_make_join(&self, server: &str) {
        self.update(server, |r| r.fail_make_join = true);
    }

    pub fn fail_send_join(&self, server: &str) {
        self.update(server, |r| r.fail_send_join = true);
    }

    pub fn delay(&self, server: &str, delay: Duration) {
        self.update(server, |r| r.delay = Some(delay));
    }

    pub fn calls(&self) -> Vec<(String, &'static str)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, step: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, s)| *s == step).count()
    }

    async fn enter(
        &self,
        server: &ServerName,
        step: &'static str,
    ) -> Result<Remote, CapabilityError> {
        self.calls.lock().unwrap().push((server.to_string(), step));
        let remote = self.remotes.lock().unwrap().get(server.as_str()).cloned();
        let remote = remote.ok_or_else(|| anyhow!("{} is unreachable", server))?;
        if let Some(delay) = remote.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(remote)
    }
}

#[async_trait]
impl FederationApi for FakeFederation {
    async fn make_join(
        &self,
        server: &ServerName,
        room_id: &RoomId,
        _user_id: &UserId,
        _supported_versions: &[RoomVersionId],
    ) -> Result<MakeJoinResponse, CapabilityError> {
        let remote = self.enter(server, "make_join").await?;
        if remote.fail_make_join {
            return Err(anyhow!("M_FORBIDDEN").into());
        }
        Ok(MakeJoinResponse {
            room_version: remote.room_version.map(RoomVersionId::new),
            event: ProtoEvent {
                sender: "@mallory:evil.example".into(),
                room_id: room_id.to_string(),
                event_type: "m.room.member".into(),
                state_key: Some("@mallory:evil.example".into()),
                content: json!({"membership": "ban"}),
                prev_events: json!(["$prev:example.org"]),
                auth_events: json!(["$auth:example.org"]),
                depth: 7,
                redacts: None,
                unsigned: None,
            },
        })
    }

    async fn send_join(
        &self,
        server: &ServerName,
        _event: &SignedEvent,
    ) -> Result<SendJoinResponse, CapabilityError> {
        let remote = self.enter(server, "send_join").await?;
        if remote.fail_send_join {
            return Err(anyhow!("HTTP 502").into());
        }
        Ok(SendJoinResponse {
            origin: server.to_string(),
            state: Vec::new(),
            auth_chain: Vec::new(),
        })
    }
}

#[derive(Default)]
pub struct FakeTrust {
    rejected: Mutex<HashSet<String>>,
}

impl FakeTrust {
    pub fn reject(&self, server: &str) {
        self.rejected.lock().unwrap().insert(server.to_owned());
    }
}

#[async_trait]
impl TrustVerifier for FakeTrust {
    async fn verify_send_join(
        &self,
        response: &SendJoinResponse,
        _event: &SignedEvent,
        _room_id: &RoomId,
    ) -> Result<(), CapabilityError> {
        if self.rejected.lock().unwrap().contains(&response.origin) {
            return Err(anyhow!("signature check failed").into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePublisher {
    published: Mutex<Vec<(SignedEvent, bool)>>,
    fail: AtomicBool,
}

impl FakePublisher {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Every published event and whether a state snapshot came with it.
    pub fn published(&self) -> Vec<(SignedEvent, bool)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for FakePublisher {
    async fn publish(
        &self,
        event: SignedEvent,
        state: Option<SendJoinResponse>,
    ) -> Result<(), CapabilityError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("broker unavailable").into());
        }
        self.published.lock().unwrap().push((event, state.is_some()));
        Ok(())
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

fn reference(event_id: &str) -> EventReference {
    EventReference { event_id: event_id.into(), sha256: Some("aGFzaA".into()) }
}

pub struct Harness {
    pub request: JoinRequest,
    pub invites: Arc<FakeInvites>,
    pub local_directory: Arc<FakeLocalDirectory>,
    pub remote_directory: Arc<FakeRemoteDirectory>,
    pub room_state: Arc<FakeRoomState>,
    pub federation: Arc<FakeFederation>,
    pub trust: Arc<FakeTrust>,
    pub publisher: Arc<FakePublisher>,
    key_pair: Arc<ServerKeyPair>,
    timeout: Duration,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            request: JoinRequest {
                user_id: UserId::parse("@alice:haven.example.com").unwrap(),
                content: Map::new(),
                origin_server_ts: 1_700_000_000_000,
            },
            invites: Arc::default(),
            local_directory: Arc::default(),
            remote_directory: Arc::default(),
            room_state: Arc::default(),
            federation: Arc::default(),
            trust: Arc::default(),
            publisher: Arc::default(),
            key_pair: Arc::new(ServerKeyPair::generate()),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_inviters(self, inviters: &[&str]) -> Self {
        *self.invites.inviters.lock().unwrap() =
            inviters.iter().map(|id| UserId::parse(*id).unwrap()).collect();
        self
    }

    pub fn with_remote(self, server: &str, room_version: Option<&str>) -> Self {
        self.federation.update(server, |r| r.room_version = room_version.map(str::to_owned));
        self
    }

    pub fn with_alias(self, alias: &str, room_id: &str, servers: &[&str]) -> Self {
        self.remote_directory.aliases.lock().unwrap().insert(
            alias.to_owned(),
            ResolvedAlias {
                room_id: RoomId::parse(room_id).unwrap(),
                servers: servers.iter().map(|s| ServerName::from(*s)).collect(),
            },
        );
        self
    }

    pub fn with_local_alias(self, alias: &str, room_id: &str) -> Self {
        self.local_directory
            .aliases
            .lock()
            .unwrap()
            .insert(alias.to_owned(), RoomId::parse(room_id).unwrap());
        self
    }

    pub fn with_local_room(self, room_id: &str, room_version: &str) -> Self {
        self.room_state.rooms.lock().unwrap().insert(
            room_id.to_owned(),
            RoomSnapshot {
                room_version: RoomVersionId::new(room_version),
                latest_events: vec![reference("$latest")],
                max_depth: 10,
                auth_events: vec![reference("$create")],
            },
        );
        self
    }

    pub fn with_supported(self, versions: &[&str]) -> Self {
        *self.room_state.supported.lock().unwrap() =
            versions.iter().map(|v| RoomVersionId::new(*v)).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn services(&self) -> JoinServices {
        JoinServices {
            server_name: ServerName::from("haven.example.com"),
            key_pair: self.key_pair.clone(),
            remote_call_timeout: self.timeout,
            invites: self.invites.clone(),
            local_directory: self.local_directory.clone(),
            remote_directory: self.remote_directory.clone(),
            profiles: Arc::new(FakeProfiles),
            room_state: self.room_state.clone(),
            federation: self.federation.clone(),
            trust: self.trust.clone(),
            publisher: self.publisher.clone(),
        }
    }
}

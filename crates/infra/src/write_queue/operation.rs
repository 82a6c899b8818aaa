//! Operation descriptors: what callers ask for and what the queue stores.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use syndicate_core::{ActionLogEntry, ActionLogId, PlayerChanges, PlayerId, StatChanges};

use super::completion::CompletionSender;
use super::error::{WriteQueueError, WriteQueueResult};

/// Scheduling priorities used by the game. Higher runs earlier.
pub mod priority {
    /// Wallet writes.
    pub const HIGH: i32 = 10;
    /// Stats and everything without an explicit priority.
    pub const NORMAL: i32 = 5;
    /// Audit log.
    pub const LOW: i32 = 1;
}

/// Unique operation identifier, assigned at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Upsert,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Upsert => "upsert",
            OperationKind::Delete => "delete",
        }
    }

    fn needs_selector(self) -> bool {
        !matches!(self, OperationKind::Create)
    }

    fn needs_payload(self) -> bool {
        !matches!(self, OperationKind::Delete)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table a mutation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Player,
    Stats,
    ActionLog,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Player => "player",
            Target::Stats => "stats",
            Target::ActionLog => "action_log",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which row a mutation affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "target", content = "key")]
pub enum Selector {
    Player(PlayerId),
    Stats(PlayerId),
    ActionLog(ActionLogId),
}

impl Selector {
    pub fn target(&self) -> Target {
        match self {
            Selector::Player(_) => Target::Player,
            Selector::Stats(_) => Target::Stats,
            Selector::ActionLog(_) => Target::ActionLog,
        }
    }
}

/// Data written by a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "target", content = "data")]
pub enum Payload {
    Player(PlayerChanges),
    Stats(StatChanges),
    ActionLog(ActionLogEntry),
}

impl Payload {
    pub fn target(&self) -> Target {
        match self {
            Payload::Player(_) => Target::Player,
            Payload::Stats(_) => Target::Stats,
            Payload::ActionLog(_) => Target::ActionLog,
        }
    }
}

/// A validated write against a keyed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write<K, C> {
    Create { key: K, changes: C },
    Update { key: K, changes: C },
    Upsert { key: K, changes: C },
    Delete { key: K },
}

impl<K: Copy, C> Write<K, C> {
    pub fn kind(&self) -> OperationKind {
        match self {
            Write::Create { .. } => OperationKind::Create,
            Write::Update { .. } => OperationKind::Update,
            Write::Upsert { .. } => OperationKind::Upsert,
            Write::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn key(&self) -> K {
        match self {
            Write::Create { key, .. }
            | Write::Update { key, .. }
            | Write::Upsert { key, .. }
            | Write::Delete { key } => *key,
        }
    }
}

/// A fully validated mutation. Only these reach the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Player(Write<PlayerId, PlayerChanges>),
    Stats(Write<PlayerId, StatChanges>),
    /// The action log is append-only.
    AppendAction(ActionLogEntry),
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Player(write) => write.kind(),
            Mutation::Stats(write) => write.kind(),
            Mutation::AppendAction(_) => OperationKind::Create,
        }
    }

    pub fn target(&self) -> Target {
        match self {
            Mutation::Player(_) => Target::Player,
            Mutation::Stats(_) => Target::Stats,
            Mutation::AppendAction(_) => Target::ActionLog,
        }
    }

    /// Player the row belongs to.
    pub fn player_id(&self) -> PlayerId {
        match self {
            Mutation::Player(write) => write.key(),
            Mutation::Stats(write) => write.key(),
            Mutation::AppendAction(entry) => entry.player_id,
        }
    }
}

/// A write request as handed to `enqueue`.
///
/// Fields are optional so that malformed requests can be represented and
/// rejected; the constructors below always produce complete ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub kind: Option<OperationKind>,
    pub target: Option<Target>,
    pub selector: Option<Selector>,
    pub payload: Option<Payload>,
    /// Defaults to [`priority::NORMAL`].
    pub priority: Option<i32>,
    /// Defaults to the queue's configured `max_retries`.
    pub max_retries: Option<u32>,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, target: Target) -> Self {
        Self {
            kind: Some(kind),
            target: Some(target),
            ..Self::default()
        }
    }

    pub fn create_player(id: PlayerId, changes: PlayerChanges) -> Self {
        Self::new(OperationKind::Create, Target::Player)
            .with_selector(Selector::Player(id))
            .with_payload(Payload::Player(changes))
    }

    pub fn update_player(id: PlayerId, changes: PlayerChanges) -> Self {
        Self::new(OperationKind::Update, Target::Player)
            .with_selector(Selector::Player(id))
            .with_payload(Payload::Player(changes))
    }

    pub fn upsert_player(id: PlayerId, changes: PlayerChanges) -> Self {
        Self::new(OperationKind::Upsert, Target::Player)
            .with_selector(Selector::Player(id))
            .with_payload(Payload::Player(changes))
    }

    pub fn delete_player(id: PlayerId) -> Self {
        Self::new(OperationKind::Delete, Target::Player).with_selector(Selector::Player(id))
    }

    pub fn create_stats(player_id: PlayerId, changes: StatChanges) -> Self {
        Self::new(OperationKind::Create, Target::Stats)
            .with_selector(Selector::Stats(player_id))
            .with_payload(Payload::Stats(changes))
    }

    pub fn update_stats(player_id: PlayerId, changes: StatChanges) -> Self {
        Self::new(OperationKind::Update, Target::Stats)
            .with_selector(Selector::Stats(player_id))
            .with_payload(Payload::Stats(changes))
    }

    pub fn upsert_stats(player_id: PlayerId, changes: StatChanges) -> Self {
        Self::new(OperationKind::Upsert, Target::Stats)
            .with_selector(Selector::Stats(player_id))
            .with_payload(Payload::Stats(changes))
    }

    pub fn delete_stats(player_id: PlayerId) -> Self {
        Self::new(OperationKind::Delete, Target::Stats).with_selector(Selector::Stats(player_id))
    }

    pub fn append_action(entry: ActionLogEntry) -> Self {
        Self::new(OperationKind::Create, Target::ActionLog).with_payload(Payload::ActionLog(entry))
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Check the request and turn it into a typed [`Mutation`].
    pub fn into_mutation(self) -> WriteQueueResult<Mutation> {
        let kind = self
            .kind
            .ok_or_else(|| WriteQueueError::validation("operation kind is required"))?;
        let target = self
            .target
            .ok_or_else(|| WriteQueueError::validation("operation target is required"))?;

        if kind.needs_selector() && self.selector.is_none() {
            return Err(WriteQueueError::validation(format!(
                "selector is required for {kind}"
            )));
        }
        if kind.needs_payload() && self.payload.is_none() {
            return Err(WriteQueueError::validation(format!(
                "payload is required for {kind}"
            )));
        }
        if !kind.needs_payload() && self.payload.is_some() {
            return Err(WriteQueueError::validation("delete takes no payload"));
        }
        if let Some(selector) = &self.selector {
            if selector.target() != target {
                return Err(WriteQueueError::validation(format!(
                    "selector names {} but target is {target}",
                    selector.target()
                )));
            }
        }
        if let Some(payload) = &self.payload {
            if payload.target() != target {
                return Err(WriteQueueError::validation(format!(
                    "payload is for {} but target is {target}",
                    payload.target()
                )));
            }
        }

        match (self.selector, self.payload) {
            (selector, Some(Payload::ActionLog(entry))) => {
                if kind != OperationKind::Create {
                    return Err(WriteQueueError::validation(format!(
                        "action log is append-only; {kind} is not allowed"
                    )));
                }
                if let Some(Selector::ActionLog(id)) = selector {
                    if id != entry.id {
                        return Err(WriteQueueError::validation(
                            "selector does not match the action log entry id",
                        ));
                    }
                }
                entry.validate()?;
                Ok(Mutation::AppendAction(entry))
            }
            (Some(Selector::ActionLog(_)), None) => Err(WriteQueueError::validation(format!(
                "action log is append-only; {kind} is not allowed"
            ))),
            (None, _) => Err(WriteQueueError::validation(format!(
                "{kind} on {target} needs a selector naming the row"
            ))),
            (Some(Selector::Player(key)), payload) => {
                let changes = match payload {
                    Some(Payload::Player(changes)) => {
                        changes.validate()?;
                        Some(changes)
                    }
                    _ => None,
                };
                Ok(Mutation::Player(keyed_write(kind, key, changes)?))
            }
            (Some(Selector::Stats(key)), payload) => {
                let changes = match payload {
                    Some(Payload::Stats(changes)) => {
                        changes.validate()?;
                        Some(changes)
                    }
                    _ => None,
                };
                Ok(Mutation::Stats(keyed_write(kind, key, changes)?))
            }
            (Some(Selector::ActionLog(_)), Some(_)) => Err(WriteQueueError::validation(
                "selector and payload name different targets",
            )),
        }
    }
}

fn keyed_write<K, C>(
    kind: OperationKind,
    key: K,
    changes: Option<C>,
) -> WriteQueueResult<Write<K, C>> {
    let missing = || WriteQueueError::validation(format!("payload is required for {kind}"));
    Ok(match kind {
        OperationKind::Create => Write::Create {
            key,
            changes: changes.ok_or_else(missing)?,
        },
        OperationKind::Update => Write::Update {
            key,
            changes: changes.ok_or_else(missing)?,
        },
        OperationKind::Upsert => Write::Upsert {
            key,
            changes: changes.ok_or_else(missing)?,
        },
        OperationKind::Delete => Write::Delete { key },
    })
}

impl From<Mutation> for OperationRequest {
    fn from(value: Mutation) -> Self {
        fn keyed<K, C>(
            write: Write<K, C>,
            target: Target,
            selector: impl Fn(K) -> Selector,
            payload: impl Fn(C) -> Payload,
        ) -> OperationRequest {
            let (kind, key, changes) = match write {
                Write::Create { key, changes } => (OperationKind::Create, key, Some(changes)),
                Write::Update { key, changes } => (OperationKind::Update, key, Some(changes)),
                Write::Upsert { key, changes } => (OperationKind::Upsert, key, Some(changes)),
                Write::Delete { key } => (OperationKind::Delete, key, None),
            };
            OperationRequest {
                selector: Some(selector(key)),
                payload: changes.map(payload),
                ..OperationRequest::new(kind, target)
            }
        }

        match value {
            Mutation::Player(write) => {
                keyed(write, Target::Player, Selector::Player, Payload::Player)
            }
            Mutation::Stats(write) => keyed(write, Target::Stats, Selector::Stats, Payload::Stats),
            Mutation::AppendAction(entry) => OperationRequest::append_action(entry),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InBatch,
    Succeeded,
    Failed,
}

/// A queued operation.
#[derive(Debug)]
pub(crate) struct Operation {
    pub id: OperationId,
    pub mutation: Mutation,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Enqueue sequence number; FIFO tie-break within a priority.
    pub enqueued_at: u64,
    /// Scheduler cycle at (re)insertion, for starvation promotion.
    pub enqueued_cycle: u64,
    /// Backoff: not selectable before this instant.
    pub not_before: Option<Instant>,
    pub status: OperationStatus,
    pub completion: Option<CompletionSender>,
}

impl Operation {
    pub fn is_ready(&self, now: Instant) -> bool {
        self.not_before.is_none_or(|at| at <= now)
    }

    /// Deliver the terminal outcome to a tracked caller, if any.
    pub fn complete(&mut self, result: WriteQueueResult<()>) {
        self.status = if result.is_ok() {
            OperationStatus::Succeeded
        } else {
            OperationStatus::Failed
        };
        if let Some(completion) = self.completion.take() {
            completion.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syndicate_core::Amount;

    fn wallet() -> PlayerChanges {
        PlayerChanges::new().cash(Amount::increment(100))
    }

    fn rejects(request: OperationRequest, needle: &str) {
        match request.into_mutation() {
            Err(WriteQueueError::Validation(msg)) => {
                assert!(msg.contains(needle), "{msg:?} does not mention {needle:?}")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn complete_requests_become_mutations() {
        let id = PlayerId::new();
        let mutation = OperationRequest::update_player(id, wallet())
            .into_mutation()
            .unwrap();
        assert_eq!(mutation.kind(), OperationKind::Update);
        assert_eq!(mutation.target(), Target::Player);
        assert_eq!(mutation.player_id(), id);

        let entry = ActionLogEntry::new(id, "bank.deposit", "moved cash");
        let mutation = OperationRequest::append_action(entry.clone())
            .into_mutation()
            .unwrap();
        assert_eq!(mutation, Mutation::AppendAction(entry));
    }

    #[test]
    fn missing_fields_are_rejected() {
        rejects(OperationRequest::default(), "kind is required");

        let no_target = OperationRequest {
            kind: Some(OperationKind::Create),
            ..OperationRequest::default()
        };
        rejects(no_target, "target is required");

        let no_selector = OperationRequest::new(OperationKind::Update, Target::Player)
            .with_payload(Payload::Player(wallet()));
        rejects(no_selector, "selector is required for update");

        let no_payload = OperationRequest::new(OperationKind::Upsert, Target::Stats)
            .with_selector(Selector::Stats(PlayerId::new()));
        rejects(no_payload, "payload is required for upsert");

        let create_without_payload = OperationRequest::new(OperationKind::Create, Target::Player);
        rejects(create_without_payload, "payload is required for create");
    }

    #[test]
    fn mismatched_targets_are_rejected() {
        let request = OperationRequest::new(OperationKind::Update, Target::Stats)
            .with_selector(Selector::Player(PlayerId::new()))
            .with_payload(Payload::Player(wallet()));
        rejects(request, "selector names player but target is stats");

        let request = OperationRequest::new(OperationKind::Update, Target::Player)
            .with_selector(Selector::Player(PlayerId::new()))
            .with_payload(Payload::Stats(StatChanges::new().heat(Amount::set(0))));
        rejects(request, "payload is for stats");
    }

    #[test]
    fn action_log_is_append_only() {
        let entry = ActionLogEntry::new(PlayerId::new(), "crime.mug", "took a watch");
        let request = OperationRequest::new(OperationKind::Update, Target::ActionLog)
            .with_selector(Selector::ActionLog(entry.id))
            .with_payload(Payload::ActionLog(entry.clone()));
        rejects(request, "append-only");

        let request = OperationRequest::new(OperationKind::Delete, Target::ActionLog)
            .with_selector(Selector::ActionLog(entry.id));
        rejects(request, "append-only");
    }

    #[test]
    fn keyed_create_needs_selector_and_changes() {
        let request = OperationRequest::new(OperationKind::Create, Target::Player)
            .with_payload(Payload::Player(wallet()));
        rejects(request, "needs a selector");

        rejects(
            OperationRequest::update_player(PlayerId::new(), PlayerChanges::new()),
            "empty",
        );
    }

    #[test]
    fn delete_with_payload_is_rejected() {
        let request = OperationRequest::delete_player(PlayerId::new())
            .with_payload(Payload::Player(wallet()));
        rejects(request, "delete takes no payload");
    }

    #[test]
    fn mutation_converts_back_to_an_equivalent_request() {
        let id = PlayerId::new();
        let original =
            OperationRequest::upsert_stats(id, StatChanges::new().respect(Amount::increment(2)));
        let mutation = original.clone().into_mutation().unwrap();
        assert_eq!(OperationRequest::from(mutation), original);

        let delete = OperationRequest::delete_player(id);
        let mutation = delete.clone().into_mutation().unwrap();
        assert_eq!(OperationRequest::from(mutation), delete);
    }
}

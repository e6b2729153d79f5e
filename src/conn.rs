//! Mock connection implementation.

use crate::command::{Cmd, Signature, ToArg};
use crate::config::{MockConnConfig, Settings};
use crate::error::MockError;
use crate::gate::{ReceiveGate, ReceiveSignal};
use crate::matcher::{RecordId, Registry};
use crate::reply::Reply;
use crate::response::Response;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use tracing::{debug, warn};

/// A pipelined key-value store connection.
///
/// `do_cmd` is a full round trip. `send` queues a command and `receive`
/// returns the replies of queued commands in the order they were sent.
#[async_trait]
pub trait Conn: Send + Sync {
    /// Send a command and wait for its reply.
    async fn do_cmd(&self, cmd: &Cmd) -> Result<Reply, MockError>;

    /// Queue a command without waiting for its reply.
    async fn send(&self, cmd: &Cmd) -> Result<(), MockError>;

    /// Reply to the oldest queued command.
    ///
    /// Not cancel safe when the mock's receive gate is armed: the queued
    /// command is taken before the gate wait, so a receive dropped while
    /// parked (for example by `tokio::time::timeout`) discards it.
    async fn receive(&self) -> Result<Reply, MockError>;

    /// Push queued commands to the server.
    async fn flush(&self) -> Result<(), MockError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), MockError>;

    /// Fatal error of the connection, if any.
    fn err(&self) -> Result<(), MockError>;
}

/// Override for a lifecycle call.
pub type Hook = Arc<dyn Fn() -> Result<(), MockError> + Send + Sync>;

#[derive(Default)]
struct Hooks {
    close: Option<Hook>,
    err: Option<Hook>,
    flush: Option<Hook>,
}

/// A sent command awaiting `receive`.
#[derive(Debug)]
struct PendingCall {
    cmd: Cmd,
    /// `None` when nothing matched at send time
    record: Option<RecordId>,
}

/// State guarded by the connection's single lock.
#[derive(Debug, Default)]
struct State {
    registry: Registry,
    pending: VecDeque<PendingCall>,
    /// Commands that matched no registration, in order
    unregistered: Vec<Cmd>,
}

/// Mock connection
///
/// Hands out canned replies for registered commands without any network
/// backend. Independent instances share nothing.
pub struct MockConn {
    settings: Settings,
    state: Arc<Mutex<State>>,
    gate: OnceLock<ReceiveGate>,
    hooks: RwLock<Hooks>,
    /// Total commands issued through `do_cmd` or `send`.
    requests_total: AtomicU64,
    /// Total commands matched to a registration.
    requests_matched: AtomicU64,
    /// Total commands that matched nothing.
    requests_unmatched: AtomicU64,
}

impl MockConn {
    /// Create an empty mock connection with default settings.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Create an empty mock connection.
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            state: Arc::new(Mutex::new(State::default())),
            gate: OnceLock::new(),
            hooks: RwLock::new(Hooks::default()),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    /// Create a mock connection with the commands of a fixture configuration.
    pub fn from_config(config: &MockConnConfig) -> anyhow::Result<Self> {
        let conn = Self::with_settings(config.settings.clone());
        for (i, fixture) in config.commands.iter().enumerate() {
            let handle = conn.register(fixture.signature());
            for response in &fixture.responses {
                let response = response
                    .to_response()
                    .map_err(|e| anyhow::anyhow!("Command {}: {}", i, e))?;
                handle.push(response);
            }
        }

        debug!(
            commands = config.commands.len(),
            responses = config.response_count(),
            "Mock connection loaded from configuration"
        );
        Ok(conn)
    }

    /// Create from a YAML fixture string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Self::from_config(&MockConnConfig::from_yaml(yaml)?)
    }

    /// Register a command with exactly these arguments.
    ///
    /// Registering an identical signature again returns a handle to the
    /// existing registration, so its responses keep accumulating.
    pub fn command<I>(&self, name: &str, args: I) -> CommandHandle
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.register(Signature::Exact(Cmd::with_args(name, args)))
    }

    /// Register a command matching any arguments.
    pub fn generic_command(&self, name: &str) -> CommandHandle {
        self.register(Signature::Generic(name.to_string()))
    }

    /// Register a signature.
    pub fn register(&self, signature: Signature) -> CommandHandle {
        let id = self.lock().registry.register(signature);
        CommandHandle {
            state: self.state.clone(),
            id,
        }
    }

    /// Drop every registration and every pending call.
    ///
    /// The receive gate and lifecycle overrides are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.registry.reset();
        state.pending.clear();
        state.unregistered.clear();
    }

    /// Arm the receive gate and return the handle that releases receives.
    ///
    /// Once armed, every `receive` waits for one `ReceiveSignal::release`
    /// after dequeuing its pending call. Arming again returns another handle
    /// to the same gate.
    ///
    /// A parked `receive` that is dropped before its signal arrives has
    /// already consumed its pending call; that call is lost, not requeued.
    pub fn arm_receive_gate(&self) -> ReceiveSignal {
        self.gate.get_or_init(ReceiveGate::new).signal()
    }

    /// Whether the receive gate is armed.
    pub fn is_gated(&self) -> bool {
        self.gate.get().is_some()
    }

    /// Override `close`.
    pub fn on_close<F>(&self, hook: F)
    where
        F: Fn() -> Result<(), MockError> + Send + Sync + 'static,
    {
        self.hooks_mut().close = Some(Arc::new(hook));
    }

    /// Override `err`.
    pub fn on_err<F>(&self, hook: F)
    where
        F: Fn() -> Result<(), MockError> + Send + Sync + 'static,
    {
        self.hooks_mut().err = Some(Arc::new(hook));
    }

    /// Override `flush`.
    pub fn on_flush<F>(&self, hook: F)
    where
        F: Fn() -> Result<(), MockError> + Send + Sync + 'static,
    {
        self.hooks_mut().flush = Some(Arc::new(hook));
    }

    /// Number of sent commands not yet received.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of registrations.
    pub fn registered(&self) -> usize {
        self.lock().registry.len()
    }

    /// Commands that matched no registration since the last `clear`.
    pub fn unregistered(&self) -> Vec<Cmd> {
        self.lock().unregistered.clone()
    }

    /// Get total commands issued.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total commands matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total commands unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Check that every registration was called and drained.
    pub fn expectations_met(&self) -> Result<(), MockError> {
        let state = self.lock();
        let unmet: Vec<String> = state
            .registry
            .records()
            .filter_map(|record| {
                if record.calls == 0 {
                    Some(format!("{} was never called", record.signature))
                } else if !record.responses.is_empty() {
                    Some(format!(
                        "{} has {} unconsumed responses",
                        record.signature,
                        record.responses.len()
                    ))
                } else {
                    None
                }
            })
            .collect();

        if unmet.is_empty() {
            Ok(())
        } else {
            Err(MockError::UnmetExpectations(unmet.join("; ")))
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hooks_mut(&self) -> std::sync::RwLockWriteGuard<'_, Hooks> {
        self.hooks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn hook(&self, select: impl Fn(&Hooks) -> Option<Hook>) -> Option<Hook> {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        select(&hooks)
    }

    /// Resolve a command to a registration, updating counters and logs.
    fn match_command(&self, state: &mut State, cmd: &Cmd) -> Option<RecordId> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        match state.registry.find_match(cmd) {
            Some(id) => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                if let Some(record) = state.registry.get_mut(id) {
                    record.calls += 1;
                    if self.settings.log_matches {
                        debug!(
                            command = %cmd,
                            signature = %record.signature,
                            remaining = record.responses.len(),
                            "Command matched registration"
                        );
                    }
                }
                Some(id)
            }
            None => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                state.unregistered.push(cmd.clone());
                if self.settings.log_unmatched {
                    warn!(command = %cmd, "No registration matches command");
                }
                None
            }
        }
    }

    /// Pop the next response of a matched registration.
    fn resolve(state: &mut State, cmd: &Cmd, record: Option<RecordId>) -> Result<Reply, MockError> {
        let record = record
            .and_then(|id| state.registry.get_mut(id))
            .ok_or_else(|| MockError::CommandNotRegistered(cmd.to_string()))?;

        record
            .responses
            .pop_next()
            .ok_or_else(|| MockError::ResponsesExhausted(record.signature.to_string()))?
            .into_result()
    }
}

impl Default for MockConn {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Conn for MockConn {
    async fn do_cmd(&self, cmd: &Cmd) -> Result<Reply, MockError> {
        let mut state = self.lock();
        let record = self.match_command(&mut state, cmd);
        Self::resolve(&mut state, cmd, record)
    }

    async fn send(&self, cmd: &Cmd) -> Result<(), MockError> {
        let mut state = self.lock();
        let record = self.match_command(&mut state, cmd);
        state.pending.push_back(PendingCall {
            cmd: cmd.clone(),
            record,
        });
        Ok(())
    }

    async fn receive(&self) -> Result<Reply, MockError> {
        let call = self
            .lock()
            .pending
            .pop_front()
            .ok_or(MockError::NothingToReceive)?;

        if let Some(gate) = self.gate.get() {
            gate.wait().await;
        }

        let mut state = self.lock();
        Self::resolve(&mut state, &call.cmd, call.record)
    }

    async fn flush(&self) -> Result<(), MockError> {
        match self.hook(|h| h.flush.clone()) {
            Some(hook) => {
                debug!("Flush overridden");
                hook()
            }
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), MockError> {
        match self.hook(|h| h.close.clone()) {
            Some(hook) => {
                debug!("Close overridden");
                hook()
            }
            None => Ok(()),
        }
    }

    fn err(&self) -> Result<(), MockError> {
        match self.hook(|h| h.err.clone()) {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }
}

/// Handle for queueing responses on one registration.
///
/// Methods consume and return the handle so calls chain. A handle obtained
/// before `MockConn::clear` no longer refers to anything; responses added
/// through it are dropped.
#[derive(Clone)]
pub struct CommandHandle {
    state: Arc<Mutex<State>>,
    id: RecordId,
}

impl CommandHandle {
    /// Queue a reply.
    pub fn expect(self, reply: impl Into<Reply>) -> Self {
        self.push(Response::Value(reply.into()));
        self
    }

    /// Queue a record-like reply flattened from ordered `(field, value)` pairs.
    pub fn expect_map<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<bytes::Bytes>,
        V: Into<bytes::Bytes>,
    {
        self.expect(Reply::map(pairs))
    }

    /// Queue a multi-bulk reply of strings.
    pub fn expect_slice<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<bytes::Bytes>,
    {
        self.expect(Reply::strings(values))
    }

    /// Queue an error, returned verbatim when consumed.
    pub fn expect_error(self, message: impl Into<String>) -> Self {
        self.push(Response::Error(message.into()));
        self
    }

    /// Number of commands matched to this registration.
    pub fn calls(&self) -> u64 {
        self.lock().registry.get(self.id).map(|r| r.calls).unwrap_or(0)
    }

    /// Number of responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock()
            .registry
            .get(self.id)
            .map(|r| r.responses.len())
            .unwrap_or(0)
    }

    fn push(&self, response: Response) {
        if !self.lock().registry.append(self.id, response) {
            warn!("Response dropped: registration was cleared");
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::cmd;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, PartialEq)]
    struct Person {
        name: String,
        age: u32,
    }

    /// Scan a flattened field/value reply into a person.
    fn scan_person(reply: Reply) -> Result<Person, String> {
        let items = reply.as_array().ok_or("expected array")?;
        let mut name = None;
        let mut age = None;
        for pair in items.chunks(2) {
            let field = pair[0].as_bytes().ok_or("expected bulk field")?;
            let value = pair.get(1).and_then(|v| v.as_bytes()).ok_or("missing value")?;
            let value = String::from_utf8_lossy(value).to_string();
            match field {
                b"name" => name = Some(value),
                b"age" => age = Some(value.parse::<u32>().map_err(|_| "bad age")?),
                _ => {}
            }
        }
        Ok(Person {
            name: name.ok_or("missing name")?,
            age: age.ok_or("missing age")?,
        })
    }

    async fn retrieve_person(conn: &dyn Conn, id: &str) -> Result<Person, String> {
        let reply = conn
            .do_cmd(&cmd("HGETALL").arg(format!("person:{}", id)))
            .await
            .map_err(|e| e.to_string())?;
        scan_person(reply)
    }

    async fn retrieve_people(conn: &dyn Conn, ids: &[&str]) -> Result<Vec<Person>, String> {
        for id in ids {
            let _ = conn.send(&cmd("HGETALL").arg(format!("person:{}", id))).await;
        }
        conn.flush().await.map_err(|e| e.to_string())?;

        let mut people = Vec::new();
        for _ in ids {
            let reply = conn.receive().await.map_err(|e| e.to_string())?;
            people.push(scan_person(reply)?);
        }
        Ok(people)
    }

    fn person(name: &str, age: u32) -> Person {
        Person {
            name: name.to_string(),
            age,
        }
    }

    #[tokio::test]
    async fn test_do_command() {
        let conn = MockConn::new();
        conn.command("HGETALL", ["person:1"])
            .expect_map([("name", "Mr. Johson"), ("age", "42")]);

        let reply = conn.do_cmd(&cmd("HGETALL").arg("person:1")).await.unwrap();
        assert_eq!(reply, Reply::strings(["name", "Mr. Johson", "age", "42"]));

        // Nothing left
        let err = conn.do_cmd(&cmd("HGETALL").arg("person:1")).await.unwrap_err();
        assert!(matches!(err, MockError::ResponsesExhausted(_)));
    }

    #[tokio::test]
    async fn test_do_command_multiple_return_values() {
        let conn = MockConn::new();
        conn.command("HGETALL", ["person:1"])
            .expect_map([("name", "Mr. Johson"), ("age", "42")])
            .expect_map([("name", "Ms. Jennifer"), ("age", "28")])
            .expect_error("simulated error");

        assert_eq!(retrieve_person(&conn, "1").await, Ok(person("Mr. Johson", 42)));
        assert_eq!(retrieve_person(&conn, "1").await, Ok(person("Ms. Jennifer", 28)));
        assert_eq!(
            retrieve_person(&conn, "1").await,
            Err("simulated error".to_string())
        );
    }

    #[tokio::test]
    async fn test_do_generic_command() {
        let conn = MockConn::new();
        conn.generic_command("HGETALL")
            .expect_map([("name", "Mr. Johson"), ("age", "42")]);

        assert_eq!(retrieve_person(&conn, "1").await, Ok(person("Mr. Johson", 42)));
    }

    #[tokio::test]
    async fn test_do_command_with_generic() {
        let conn = MockConn::new();
        conn.command("HGETALL", ["person:1"])
            .expect_map([("name", "Mr. Johson"), ("age", "42")]);
        conn.generic_command("HGETALL")
            .expect_map([("name", "Mr. Mark"), ("age", "32")]);

        assert_eq!(retrieve_person(&conn, "1").await, Ok(person("Mr. Johson", 42)));
        assert_eq!(retrieve_person(&conn, "9").await, Ok(person("Mr. Mark", 32)));
    }

    #[tokio::test]
    async fn test_exact_wins_regardless_of_registration_order() {
        let conn = MockConn::new();
        conn.generic_command("GET").expect("generic");
        conn.command("GET", ["key"]).expect("exact");

        assert_eq!(conn.do_cmd(&cmd("GET").arg("key")).await, Ok(Reply::from("exact")));
        assert_eq!(conn.do_cmd(&cmd("GET").arg("other")).await, Ok(Reply::from("generic")));
    }

    #[tokio::test]
    async fn test_do_command_with_error() {
        let conn = MockConn::new();
        conn.command("HGETALL", ["person:1"]).expect_error("simulated error");

        let err = conn.do_cmd(&cmd("HGETALL").arg("person:1")).await.unwrap_err();
        assert_eq!(err, MockError::simulated("simulated error"));
    }

    #[tokio::test]
    async fn test_do_command_with_unexpected_command() {
        let conn = MockConn::new();

        let err = conn.do_cmd(&cmd("HGETALL").arg("person:X")).await.unwrap_err();
        assert_eq!(err, MockError::CommandNotRegistered("HGETALL person:X".to_string()));
        assert_eq!(conn.unregistered(), vec![cmd("HGETALL").arg("person:X")]);
        assert_eq!(conn.total_unmatched(), 1);
    }

    #[tokio::test]
    async fn test_do_command_without_response() {
        let conn = MockConn::new();
        conn.command("HGETALL", ["person:1"]);

        let err = conn.do_cmd(&cmd("HGETALL").arg("person:1")).await.unwrap_err();
        assert!(matches!(err, MockError::ResponsesExhausted(_)));
    }

    #[tokio::test]
    async fn test_reregistration_appends_after_exhaustion() {
        let conn = MockConn::new();
        conn.command("GET", ["k"]).expect("one");
        assert_ok!(conn.do_cmd(&cmd("GET").arg("k")).await);
        assert_err!(conn.do_cmd(&cmd("GET").arg("k")).await);

        conn.command("GET", ["k"]).expect("two");
        assert_eq!(conn.registered(), 1);
        assert_eq!(conn.do_cmd(&cmd("GET").arg("k")).await, Ok(Reply::from("two")));
    }

    #[tokio::test]
    async fn test_send_flush_receive() {
        let conn = MockConn::new();
        conn.command("HGETALL", ["person:1"])
            .expect_map([("name", "Mr. Johson"), ("age", "42")]);
        conn.command("HGETALL", ["person:2"])
            .expect_map([("name", "Ms. Jennifer"), ("age", "28")]);

        let people = retrieve_people(&conn, &["1", "2"]).await.unwrap();
        assert_eq!(people, vec![person("Mr. Johson", 42), person("Ms. Jennifer", 28)]);

        assert_eq!(conn.receive().await, Err(MockError::NothingToReceive));
    }

    #[tokio::test]
    async fn test_send_receive_interleaved_names() {
        let conn = MockConn::new();
        conn.command("GET", ["a"]).expect("value-a");
        conn.command("INCR", ["counter"]).expect(1i64).expect(2i64);
        conn.generic_command("PING").expect(Reply::status("PONG"));

        for c in [
            cmd("INCR").arg("counter"),
            cmd("GET").arg("a"),
            cmd("PING"),
            cmd("INCR").arg("counter"),
        ] {
            assert_ok!(conn.send(&c).await);
        }
        assert_eq!(conn.pending(), 4);

        assert_eq!(conn.receive().await, Ok(Reply::Int(1)));
        assert_eq!(conn.receive().await, Ok(Reply::from("value-a")));
        assert_eq!(conn.receive().await, Ok(Reply::status("PONG")));
        assert_eq!(conn.receive().await, Ok(Reply::Int(2)));
        assert_eq!(conn.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_flush_receive_with_error() {
        let conn = MockConn::new();
        conn.command("HGETALL", ["person:1"])
            .expect_map([("name", "Mr. Johson"), ("age", "42")]);
        conn.command("HGETALL", ["person:2"])
            .expect_map([("name", "Ms. Jennifer"), ("age", "28")]);
        conn.command("HGETALL", ["person:2"]).expect_error("simulated error");

        let err = retrieve_people(&conn, &["1", "2", "3"]).await.unwrap_err();
        assert_eq!(err, "command HGETALL person:3 is not registered");
    }

    #[tokio::test]
    async fn test_receive_consumes_responses_in_order() {
        let conn = MockConn::new();
        conn.command("GET", ["k"]).expect("v").expect_error("boom");

        for _ in 0..3 {
            assert_ok!(conn.send(&cmd("GET").arg("k")).await);
        }

        assert_eq!(conn.receive().await, Ok(Reply::from("v")));
        assert_eq!(conn.receive().await, Err(MockError::simulated("boom")));
        let err = conn.receive().await.unwrap_err();
        assert_eq!(err, MockError::ResponsesExhausted("GET k".to_string()));
    }

    #[tokio::test]
    async fn test_receive_without_responses_is_exhausted() {
        let conn = MockConn::new();
        conn.generic_command("DEL");
        assert_ok!(conn.send(&cmd("DEL").arg("k")).await);

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, MockError::ResponsesExhausted(_)));
    }

    #[tokio::test]
    async fn test_send_defers_match_failure() {
        let conn = MockConn::new();
        conn.command("GET", ["k"]).expect("v");

        // Unregistered command enqueues fine
        assert_ok!(conn.send(&cmd("GET").arg("missing")).await);
        assert_ok!(conn.send(&cmd("GET").arg("k")).await);

        assert_eq!(
            conn.receive().await,
            Err(MockError::CommandNotRegistered("GET missing".to_string()))
        );
        // Failure leaves the queue usable
        assert_eq!(conn.receive().await, Ok(Reply::from("v")));
    }

    #[tokio::test]
    async fn test_send_registered_after_send_still_misses() {
        let conn = MockConn::new();
        assert_ok!(conn.send(&cmd("GET").arg("k")).await);
        conn.command("GET", ["k"]).expect("late");

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, MockError::CommandNotRegistered(_)));
    }

    #[tokio::test]
    async fn test_send_receive_with_wait() {
        let conn = Arc::new(MockConn::new());
        let signal = conn.arm_receive_gate();
        assert!(conn.is_gated());

        conn.command("HGETALL", ["person:1"])
            .expect_map([("name", "Mr. Johson"), ("age", "42")]);
        conn.command("HGETALL", ["person:2"])
            .expect_map([("name", "Ms. Jennifer"), ("age", "28")]);

        for id in ["1", "2"] {
            assert_ok!(conn.send(&cmd("HGETALL").arg(format!("person:{}", id))).await);
        }

        let consumer = {
            let conn = conn.clone();
            tokio::spawn(async move {
                let mut people = Vec::new();
                for _ in 0..2 {
                    let reply = conn.receive().await.map_err(|e| e.to_string())?;
                    people.push(scan_person(reply)?);
                }
                Ok::<_, String>(people)
            })
        };

        // Responses are available, but the consumer must not get past the gate
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        assert!(signal.release().await);
        assert!(signal.release().await);

        let people = timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(people, vec![person("Mr. Johson", 42), person("Ms. Jennifer", 28)]);
    }

    #[tokio::test]
    async fn test_gate_releases_one_receive_per_signal() {
        let conn = Arc::new(MockConn::new());
        let signal = conn.arm_receive_gate();
        conn.generic_command("GET").expect("a").expect("b");
        assert_ok!(conn.send(&cmd("GET").arg(1)).await);
        assert_ok!(conn.send(&cmd("GET").arg(2)).await);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let consumer = {
            let conn = conn.clone();
            tokio::spawn(async move {
                for _ in 0..2 {
                    let _ = tx.send(conn.receive().await);
                }
            })
        };

        assert!(signal.release().await);
        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(first, Some(Ok(Reply::from("a"))));

        // Second receive is still parked
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        assert!(signal.release().await);
        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(second, Some(Ok(Reply::from("b"))));
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn test_gated_receive_dropped_while_parked_loses_its_call() {
        let conn = MockConn::new();
        let signal = conn.arm_receive_gate();
        conn.command("GET", ["a"]).expect("value-a");
        conn.command("GET", ["b"]).expect("value-b");
        assert_ok!(conn.send(&cmd("GET").arg("a")).await);
        assert_ok!(conn.send(&cmd("GET").arg("b")).await);

        // Parked on the gate with no signal; the timeout drops it
        let parked = timeout(Duration::from_millis(20), conn.receive()).await;
        assert!(parked.is_err());
        assert_eq!(conn.pending(), 1);

        let next = {
            let conn = &conn;
            async move { conn.receive().await }
        };
        let (reply, released) = tokio::join!(next, signal.release());
        assert!(released);
        assert_eq!(reply, Ok(Reply::from("value-b")));
    }

    #[tokio::test]
    async fn test_gated_receive_with_nothing_pending_fails_immediately() {
        let conn = MockConn::new();
        conn.arm_receive_gate();

        let result = timeout(Duration::from_secs(1), conn.receive()).await.unwrap();
        assert_eq!(result, Err(MockError::NothingToReceive));
    }

    #[tokio::test]
    async fn test_dummy_functions() {
        let conn = MockConn::new();

        assert_ok!(conn.close().await);
        conn.on_close(|| Err(MockError::simulated("close error")));
        let err = conn.close().await.unwrap_err();
        assert_eq!(err.to_string(), "close error");

        assert_ok!(conn.err());
        conn.on_err(|| Err(MockError::simulated("err error")));
        let err = conn.err().unwrap_err();
        assert_eq!(err.to_string(), "err error");

        assert_ok!(conn.flush().await);
        conn.on_flush(|| Err(MockError::simulated("flush error")));
        let err = conn.flush().await.unwrap_err();
        assert_eq!(err.to_string(), "flush error");
    }

    #[tokio::test]
    async fn test_flush_does_not_touch_pending() {
        let conn = MockConn::new();
        conn.on_flush(|| Err(MockError::simulated("flush error")));
        assert_ok!(conn.send(&cmd("PING")).await);

        assert_err!(conn.flush().await);
        assert_eq!(conn.pending(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let conn = MockConn::new();
        conn.command("HGETALL", ["person:1"])
            .expect_map([("name", "Mr. Johson"), ("age", "42")]);
        conn.command("HGETALL", ["person:2"])
            .expect_map([("name", "Ms. Jennifer"), ("age", "28")]);
        conn.generic_command("HGETALL")
            .expect_map([("name", "Ms. Mark"), ("age", "32")]);

        assert_ok!(conn.send(&cmd("HGETALL").arg("person:1")).await);
        assert_ok!(conn.send(&cmd("HGETALL").arg("person:2")).await);

        conn.clear();

        assert_eq!(conn.registered(), 0);
        assert_eq!(conn.pending(), 0);
        assert_eq!(conn.receive().await, Err(MockError::NothingToReceive));

        let err = conn.do_cmd(&cmd("HGETALL").arg("person:1")).await.unwrap_err();
        assert!(matches!(err, MockError::CommandNotRegistered(_)));
    }

    #[tokio::test]
    async fn test_clear_keeps_hooks_and_gate() {
        let conn = MockConn::new();
        conn.arm_receive_gate();
        conn.on_close(|| Err(MockError::simulated("close error")));

        conn.clear();

        assert!(conn.is_gated());
        assert_err!(conn.close().await);
    }

    #[tokio::test]
    async fn test_stale_handle_after_clear() {
        let conn = MockConn::new();
        let stale = conn.command("GET", ["k"]);
        conn.clear();

        let fresh = conn.command("SET", ["k", "v"]);
        let stale = stale.expect("leaked");
        assert_eq!(stale.calls(), 0);
        assert_eq!(fresh.remaining(), 0);

        let err = conn.do_cmd(&cmd("SET").arg("k").arg("v")).await.unwrap_err();
        assert!(matches!(err, MockError::ResponsesExhausted(_)));
    }

    #[tokio::test]
    async fn test_call_stats() {
        let conn = MockConn::new();
        let get = conn.command("GET", ["k"]).expect("v1").expect("v2");
        let set = conn.generic_command("SET");

        assert_ok!(conn.do_cmd(&cmd("GET").arg("k")).await);
        assert_ok!(conn.send(&cmd("GET").arg("k")).await);
        assert_eq!(get.calls(), 2);
        assert_eq!(set.calls(), 0);

        assert_eq!(conn.total_requests(), 2);
        assert_eq!(conn.total_matched(), 2);
        assert_eq!(conn.total_unmatched(), 0);
    }

    #[tokio::test]
    async fn test_expectations_met() {
        let conn = MockConn::new();
        conn.command("GET", ["k"]).expect("v1").expect("v2");
        conn.generic_command("DEL");

        let err = conn.expectations_met().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("GET k was never called"));
        assert!(message.contains("DEL * was never called"));

        assert_ok!(conn.do_cmd(&cmd("GET").arg("k")).await);
        let err = conn.expectations_met().unwrap_err();
        assert!(err.to_string().contains("GET k has 1 unconsumed responses"));

        assert_ok!(conn.do_cmd(&cmd("GET").arg("k")).await);
        assert_err!(conn.do_cmd(&cmd("DEL").arg("x")).await);
        assert_ok!(conn.expectations_met());
    }

    #[tokio::test]
    async fn test_independent_connections() {
        let a = MockConn::new();
        let b = MockConn::new();
        a.command("GET", ["k"]).expect("from-a");

        assert_ok!(a.do_cmd(&cmd("GET").arg("k")).await);
        assert_err!(b.do_cmd(&cmd("GET").arg("k")).await);
    }

    #[tokio::test]
    async fn test_from_yaml() {
        let yaml = r#"
settings:
  log_matches: false
commands:
  - name: HGETALL
    args: ["person:1"]
    responses:
      - type: map
        fields:
          name: Mr. Johson
          age: "42"
  - name: HGETALL
    generic: true
    responses:
      - type: map
        fields:
          name: Mr. Mark
          age: "32"
"#;
        let conn = MockConn::from_yaml(yaml).unwrap();
        assert_eq!(conn.registered(), 2);
        assert_eq!(retrieve_person(&conn, "1").await, Ok(person("Mr. Johson", 42)));
        assert_eq!(retrieve_person(&conn, "9").await, Ok(person("Mr. Mark", 32)));
    }
}

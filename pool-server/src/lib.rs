//! Connection Manager, Session State Machine, and Share Validator
//! (§4.D/E/F): the pool's TCP-facing surface.
//!
//! Grounded on the teacher's `StratumServer`/`StratumSession`
//! (`mining/src/stratum.rs`): one listener per port, a shared session
//! table behind an `RwLock`, a per-session outbound channel so writes never
//! block a reader, and a background task that evicts idle sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use pool_adapters::ParentAdapter;
use pool_core::{AlgorithmId, PoolConfig, PoolStats};
use pool_jobs::JobHandle;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub mod message;
pub mod session;
pub mod validator;

pub use session::SessionEntry;
pub use validator::{ShareOutcome, ShareValidator};

use message::{err_response, job_notification, job_params, ok_response, subscribe_result, RpcError, RpcRequest};

/// Everything the Connection Manager and Session State Machine need for one
/// algorithm's listener (§4.D/E).
pub struct AlgorithmContext {
    pub algorithm: AlgorithmId,
    pub listen_port: u16,
    pub adapter: Arc<dyn ParentAdapter>,
    pub job_handle: JobHandle,
    pub validator: Arc<ShareValidator>,
}

type SessionTable = RwLock<HashMap<String, Arc<Mutex<SessionEntry>>>>;

/// The pool server: owns every per-algorithm context, the shared session
/// table, and the running flag every task selects against (§5).
pub struct Server {
    config: PoolConfig,
    contexts: HashMap<AlgorithmId, AlgorithmContext>,
    sessions: Arc<SessionTable>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<PoolStats>>,
    next_conn_id: AtomicU64,
}

impl Server {
    pub fn new(config: PoolConfig, contexts: HashMap<AlgorithmId, AlgorithmContext>) -> Self {
        Server {
            config,
            contexts,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(Mutex::new(PoolStats::default())),
            next_conn_id: AtomicU64::new(0),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// `GetStats` (SPEC_FULL supplementary feature): a read-only snapshot of
    /// per-algorithm connection and share counters.
    pub fn stats(&self) -> PoolStats {
        self.stats.lock().unwrap().clone()
    }

    /// Shared handle to the live stats table, so the Scoring Engine's task
    /// can read `shares_accepted` without going through the server itself.
    pub fn stats_handle(&self) -> Arc<Mutex<PoolStats>> {
        self.stats.clone()
    }

    fn max_total_sessions(&self) -> usize {
        self.config.max_clients_per_algo * self.contexts.len().max(1)
    }

    /// Binds one listener per configured algorithm and runs until `running`
    /// flips to false (§5 "the listening sockets are closed ... and every
    /// task joins").
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let mut listeners = Vec::new();
        for ctx in self.contexts.values() {
            let addr = format!("{}:{}", self.config.bind_address, ctx.listen_port);
            let listener = TcpListener::bind(&addr).await?;
            info!("{}: listening on {}", ctx.algorithm, addr);
            listeners.push((ctx.algorithm, listener));
        }

        let mut handles = Vec::new();
        for (algorithm, listener) in listeners {
            let server = self.clone();
            handles.push(tokio::spawn(async move {
                server.accept_loop(algorithm, listener).await;
            }));
        }
        handles.push(tokio::spawn(self.clone().idle_eviction_loop()));

        for h in handles {
            let _ = h.await;
        }
        Ok(())
    }

    /// §4.D: "listens with backlog 10, and accepts synchronously".
    async fn accept_loop(self: Arc<Self>, algorithm: AlgorithmId, listener: TcpListener) {
        while self.running.load(Ordering::Relaxed) {
            let accepted = tokio::time::timeout(Duration::from_secs(1), listener.accept()).await;
            let (socket, addr) = match accepted {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    warn!("{algorithm}: accept failed: {e}");
                    continue;
                }
                Err(_) => continue,
            };

            if self.sessions.read().unwrap().len() >= self.max_total_sessions() {
                debug!("{algorithm}: rejecting {addr}, at capacity");
                continue;
            }

            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
            let server = self.clone();
            tokio::spawn(async move {
                server.handle_connection(algorithm, conn_id, socket, addr).await;
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, algorithm: AlgorithmId, conn_id: u64, socket: TcpStream, addr: SocketAddr) {
        let session_id = format!("{conn_id:016x}-{}", pool_util::random_hex_id(4));
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(256);
        let entry = Arc::new(Mutex::new(SessionEntry::new(
            session_id.clone(),
            algorithm,
            self.config.pool_secondary_address.clone(),
            outbound_tx,
        )));
        self.sessions.write().unwrap().insert(session_id.clone(), entry.clone());
        self.bump_connected(algorithm, 1);
        info!("{algorithm}: {addr} connected as {session_id}");

        let (read_half, mut write_half) = socket.into_split();

        let job_handle = self.contexts[&algorithm].job_handle.current.clone();
        let writer_session = session_id.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(line) = outbound_rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
            debug!("writer for {writer_session} stopped");
        });

        let notify_task = {
            let entry = entry.clone();
            let mut job_handle = job_handle;
            tokio::spawn(async move {
                loop {
                    if job_handle.changed().await.is_err() {
                        break;
                    }
                    let job = job_handle.borrow().clone();
                    let Some(job) = job else { continue };
                    let subscribed = entry.lock().unwrap().session.flags.subscribed;
                    if subscribed {
                        entry.lock().unwrap().send_line(job_notification(&job));
                    }
                }
            })
        };

        self.reader_loop(algorithm, read_half, entry.clone()).await;

        notify_task.abort();
        writer_task.abort();
        self.sessions.write().unwrap().remove(&session_id);
        self.bump_connected(algorithm, -1);
        info!("{algorithm}: {addr} ({session_id}) disconnected");
    }

    /// §4.D literal reader semantics: poll for readability with a 1 s
    /// timeout, read up to 4 KiB on wakeup, dispatch every complete line.
    async fn reader_loop(&self, algorithm: AlgorithmId, read_half: tokio::net::tcp::OwnedReadHalf, entry: Arc<Mutex<SessionEntry>>) {
        let mut buf = [0u8; 4096];
        loop {
            if !self.running.load(Ordering::Relaxed) {
                return;
            }
            match tokio::time::timeout(Duration::from_secs(1), read_half.readable()).await {
                Err(_) => continue,
                Ok(Err(_)) => return,
                Ok(Ok(())) => {}
            }
            match read_half.try_read(&mut buf) {
                Ok(0) => return,
                Ok(n) => {
                    let messages = entry.lock().unwrap().drain_messages(&buf[..n]);
                    for line in messages {
                        self.dispatch(algorithm, &entry, &line).await;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(_) => return,
            }
        }
    }

    /// §4.E dispatch table.
    async fn dispatch(&self, algorithm: AlgorithmId, entry: &Arc<Mutex<SessionEntry>>, line: &str) {
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(_) => return,
        };
        entry.lock().unwrap().session.touch();

        let response = match request.method.as_str() {
            "mining.subscribe" => self.handle_subscribe(entry, &request.id),
            "mining.authorize" | "login" => self.handle_authorize(algorithm, entry, &request),
            "getjob" => self.handle_getjob(algorithm, entry, &request.id),
            "mining.submit" | "submit" => {
                self.handle_submit(algorithm, entry, &request).await
            }
            "keepalived" => ok_response(&request.id, serde_json::json!({"status": "KEEPALIVED"})),
            _ => err_response(&request.id, RpcError::unknown_method()),
        };
        entry.lock().unwrap().send_line(response);
    }

    fn handle_subscribe(&self, entry: &Arc<Mutex<SessionEntry>>, id: &Value) -> String {
        let mut e = entry.lock().unwrap();
        e.session.flags.subscribed = true;
        if e.session.extranonce1.is_empty() {
            e.session.extranonce1 = pool_util::random_hex_id(4);
        }
        let session_id = e.session.session_id.clone();
        let extranonce1 = e.session.extranonce1.clone();
        drop(e);
        ok_response(id, subscribe_result(&session_id, &extranonce1))
    }

    /// §4.E: authorizing a session replies with the current job, the same
    /// payload `handle_getjob` returns, since several miners never issue a
    /// separate `getjob` call after logging in.
    fn handle_authorize(&self, algorithm: AlgorithmId, entry: &Arc<Mutex<SessionEntry>>, request: &RpcRequest) -> String {
        let login = request
            .params
            .get("login")
            .and_then(Value::as_str)
            .or_else(|| request.params.get(0).and_then(Value::as_str))
            .unwrap_or("");

        let Some(fields) = pool_util::parse_login(login) else {
            return err_response(&request.id, RpcError::new(-1, "Invalid login"));
        };

        let mut e = entry.lock().unwrap();
        e.session.apply_login(fields, &self.config.pool_secondary_address);
        drop(e);

        let job = self.contexts[&algorithm].job_handle.current.borrow().clone();
        match job {
            Some(job) => ok_response(&request.id, job_params(&job)),
            None => ok_response(&request.id, serde_json::json!({"status": "OK"})),
        }
    }

    fn handle_getjob(&self, algorithm: AlgorithmId, entry: &Arc<Mutex<SessionEntry>>, id: &Value) -> String {
        if !entry.lock().unwrap().session.flags.authorized {
            return err_response(id, RpcError::not_authorized());
        }
        let job = self.contexts[&algorithm].job_handle.current.borrow().clone();
        match job {
            Some(job) => ok_response(id, job_params(&job)),
            None => err_response(id, RpcError::new(-1, "No job available")),
        }
    }

    async fn handle_submit(&self, algorithm: AlgorithmId, entry: &Arc<Mutex<SessionEntry>>, request: &RpcRequest) -> String {
        let (authorized, secondary_address, job_id_from_session) = {
            let e = entry.lock().unwrap();
            (e.session.flags.authorized, e.session.secondary_address.clone(), e.session.session_id.clone())
        };
        if !authorized {
            return err_response(&request.id, RpcError::not_authorized());
        }
        let _ = job_id_from_session;

        let job_id = request
            .params
            .get("job_id")
            .and_then(Value::as_str)
            .or_else(|| request.params.get(1).and_then(Value::as_str))
            .unwrap_or("");
        let nonce_hex = request
            .params
            .get("nonce")
            .and_then(Value::as_str)
            .or_else(|| request.params.get(2).and_then(Value::as_str))
            .unwrap_or("");
        let result_hex = request
            .params
            .get("result")
            .and_then(Value::as_str)
            .or_else(|| request.params.get(3).and_then(Value::as_str))
            .unwrap_or("");

        let ctx = &self.contexts[&algorithm];
        let job = {
            let table = ctx.job_handle.table.lock().unwrap();
            table.get(job_id).cloned()
        };
        let Some(job) = job else {
            self.bump_rejected(algorithm);
            return err_response(&request.id, RpcError::invalid_share());
        };

        let outcome = ctx
            .validator
            .validate(&job, &secondary_address, self.config.share_difficulty, nonce_hex, result_hex)
            .await;

        match outcome {
            Ok(ShareOutcome::Accepted) => {
                entry.lock().unwrap().session.counters.record_accepted(&ctx.validator.chain_name);
                self.bump_accepted(algorithm);
                ok_response(&request.id, serde_json::json!({"status": "OK"}))
            }
            _ => {
                entry.lock().unwrap().session.counters.rejected_shares += 1;
                self.bump_rejected(algorithm);
                err_response(&request.id, RpcError::invalid_share())
            }
        }
    }

    /// Idle-session eviction (SPEC_FULL supplementary feature), grounded on
    /// the teacher's `StratumServer::cleanup_sessions`: drop sessions quiet
    /// past the job timeout so dead sockets don't linger in the table.
    async fn idle_eviction_loop(self: Arc<Self>) {
        let idle_limit = self.config.job_timeout_seconds.max(1) * 4;
        while self.running.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let stale: Vec<String> = self
                .sessions
                .read()
                .unwrap()
                .iter()
                .filter(|(_, e)| e.lock().unwrap().session.idle_secs() > idle_limit)
                .map(|(id, _)| id.clone())
                .collect();
            for id in stale {
                self.sessions.write().unwrap().remove(&id);
            }
        }
    }

    fn bump_connected(&self, algorithm: AlgorithmId, delta: i64) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.connected_clients.entry(algorithm).or_insert(0);
        *entry = (*entry as i64 + delta).max(0) as usize;
    }

    fn bump_accepted(&self, algorithm: AlgorithmId) {
        *self.stats.lock().unwrap().shares_accepted.entry(algorithm).or_insert(0) += 1;
    }

    fn bump_rejected(&self, algorithm: AlgorithmId) {
        *self.stats.lock().unwrap().shares_rejected.entry(algorithm).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_scales_with_algorithm_count() {
        let config = PoolConfig {
            max_clients_per_algo: 10,
            ..PoolConfig::default()
        };
        let server = Server::new(config, HashMap::new());
        // No contexts registered -> treated as at least one algorithm's worth.
        assert_eq!(server.max_total_sessions(), 10);
    }
}

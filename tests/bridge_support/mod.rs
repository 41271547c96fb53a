#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use garmin_bridge::auth::{
    AuthOrchestrator, LoginOutcome, LoginProvider, PendingAuthStore, ProviderError, Secret,
    TokenStore,
};
use garmin_bridge::storage::{FileBackend, KvRestBackend, MemoryBackend, StorageBackend};
use garmin_bridge::util::{Clock, ManualClock};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const EMAIL: &str = "runner@example.com";
pub const PASSWORD: &str = "hunter2";
pub const MFA_CODE: &str = "123456";

/// Provider double: accounts configured up front, MFA handles issued as
/// `T1`, `T2`, ... in call order.
#[derive(Default)]
pub struct FakeProvider {
    accounts: Mutex<HashMap<String, Account>>,
    issued: AtomicUsize,
    pub logins: AtomicUsize,
    pub mfa_attempts: AtomicUsize,
}

struct Account {
    password: String,
    mfa_code: Option<String>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account that logs in without a second factor.
    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.insert(email, password, None)
    }

    /// Account that requires `code` after the password.
    pub fn with_mfa_account(self, email: &str, password: &str, code: &str) -> Self {
        self.insert(email, password, Some(code.to_string()))
    }

    fn insert(self, email: &str, password: &str, mfa_code: Option<String>) -> Self {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                mfa_code,
            },
        );
        self
    }
}

#[async_trait]
impl LoginProvider for FakeProvider {
    async fn login(&self, email: &str, password: &Secret) -> Result<LoginOutcome, ProviderError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get(email)
            .filter(|a| a.password == password.expose())
            .ok_or(ProviderError::InvalidCredentials)?;
        Ok(match account.mfa_code {
            Some(_) => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                LoginOutcome::MfaRequired {
                    mfa_token: format!("T{n}"),
                }
            }
            None => LoginOutcome::Authenticated {
                token: Secret::new(format!("session-{email}")),
            },
        })
    }

    async fn complete_mfa(
        &self,
        email: &str,
        password: &Secret,
        mfa_token: &str,
        mfa_code: &Secret,
    ) -> Result<Secret, ProviderError> {
        self.mfa_attempts.fetch_add(1, Ordering::SeqCst);
        let accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get(email)
            .filter(|a| a.password == password.expose())
            .ok_or(ProviderError::InvalidCredentials)?;
        match &account.mfa_code {
            Some(code) if code == mfa_code.expose() => {
                Ok(Secret::new(format!("session-{email}-{mfa_token}")))
            }
            _ => Err(ProviderError::InvalidMfaCode),
        }
    }
}

/// A backend plus whatever keeps it alive (temp dir, mock server).
pub struct Harness {
    pub clock: ManualClock,
    pub backend: Arc<dyn StorageBackend>,
    _dir: Option<TempDir>,
    _server: Option<MockServer>,
}

impl Harness {
    pub fn shared_clock(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }

    pub fn orchestrator(&self, provider: Arc<dyn LoginProvider>) -> AuthOrchestrator {
        let clock = self.shared_clock();
        AuthOrchestrator::new(
            provider,
            TokenStore::new(self.backend.clone(), clock.clone()),
            Arc::new(PendingAuthStore::new(self.backend.clone(), clock.clone())),
            clock,
        )
    }
}

pub fn memory_harness() -> Harness {
    let clock = ManualClock::new();
    let backend = Arc::new(MemoryBackend::with_clock(Arc::new(clock.clone())));
    Harness {
        clock,
        backend,
        _dir: None,
        _server: None,
    }
}

pub fn filesystem_harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let backend = Arc::new(FileBackend::with_clock(dir.path(), Arc::new(clock.clone())));
    Harness {
        clock,
        backend,
        _dir: Some(dir),
        _server: None,
    }
}

pub async fn remote_harness() -> Harness {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("authorization", "Bearer kv-token"))
        .respond_with(FakeKv::default())
        .mount(&server)
        .await;
    let backend = KvRestBackend::new(server.uri(), Secret::new("kv-token")).unwrap();
    Harness {
        clock: ManualClock::new(),
        backend: Arc::new(backend),
        _dir: None,
        _server: Some(server),
    }
}

/// One harness per backend variant.
pub async fn all_harnesses() -> Vec<(&'static str, Harness)> {
    vec![
        ("memory", memory_harness()),
        ("filesystem", filesystem_harness()),
        ("remote", remote_harness().await),
    ]
}

/// Minimal stateful KV REST server: GET, SET (EX ignored), DEL, GETDEL.
#[derive(Default, Clone)]
pub struct FakeKv {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl Respond for FakeKv {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(args) = serde_json::from_slice::<Vec<String>>(&request.body) else {
            return ResponseTemplate::new(400).set_body_json(json!({"error": "bad body"}));
        };
        let mut data = self.data.lock().unwrap();
        let result: Value = match args.first().map(String::as_str) {
            Some("GET") => data.get(&args[1]).cloned().map_or(Value::Null, Value::String),
            Some("SET") => {
                data.insert(args[1].clone(), args[2].clone());
                json!("OK")
            }
            Some("DEL") => json!(data.remove(&args[1]).map_or(0, |_| 1)),
            Some("GETDEL") => data.remove(&args[1]).map_or(Value::Null, Value::String),
            other => {
                return ResponseTemplate::new(200)
                    .set_body_json(json!({ "error": format!("ERR unknown command {other:?}") }))
            }
        };
        ResponseTemplate::new(200).set_body_json(json!({ "result": result }))
    }
}

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use uuid::Uuid;
use vaas::{
    auth::{
        session::{now_unix, Verification},
        Gateway, Inbound, PasswordHasher, Reply, Services, SessionCodec,
    },
    oauth::{AccessToken, OAuthExchange, ProviderProfile},
    store::{
        CredentialStore, Identity, InsertOutcome, MemoryStore, ProfileUpdate, UpdateOutcome,
    },
};

const SECRET: &str = "0123456789abcdef0123456789abcdef";

struct ScriptedGitHub {
    profile: ProviderProfile,
    exchanges: AtomicUsize,
}

impl ScriptedGitHub {
    fn new(login: &str, display_name: Option<&str>, provider_id: &str) -> Self {
        Self {
            profile: ProviderProfile {
                display_name: display_name.map(ToString::to_string),
                login: login.to_string(),
                provider_id: provider_id.to_string(),
            },
            exchanges: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OAuthExchange for ScriptedGitHub {
    async fn exchange_code(&self, code: &str) -> Result<AccessToken> {
        if code == "bad" {
            return Err(anyhow!("bad_verification_code"));
        }
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken {
            access_token: format!("gho_{code}"),
            token_type: "bearer".to_string(),
        })
    }

    async fn fetch_profile(&self, _token: &AccessToken) -> Result<ProviderProfile> {
        Ok(self.profile.clone())
    }
}

/// Store whose every call fails, as if the database were down.
struct BrokenStore;

#[async_trait]
impl CredentialStore for BrokenStore {
    async fn find_by_username(&self, _username: &str) -> Result<Option<Identity>> {
        Err(anyhow!("connection reset by peer"))
    }

    async fn insert(&self, _identity: Identity) -> Result<InsertOutcome> {
        Err(anyhow!("connection reset by peer"))
    }

    async fn update_fields(&self, _id: Uuid, _fields: &ProfileUpdate) -> Result<UpdateOutcome> {
        Err(anyhow!("connection reset by peer"))
    }

    async fn delete_by_username(&self, _username: &str) -> Result<u64> {
        Err(anyhow!("connection reset by peer"))
    }
}

/// Store that never answers within any reasonable timeout.
struct StalledStore;

#[async_trait]
impl CredentialStore for StalledStore {
    async fn find_by_username(&self, _username: &str) -> Result<Option<Identity>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }

    async fn insert(&self, _identity: Identity) -> Result<InsertOutcome> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(InsertOutcome::Inserted)
    }

    async fn update_fields(&self, _id: Uuid, _fields: &ProfileUpdate) -> Result<UpdateOutcome> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(UpdateOutcome::Updated)
    }

    async fn delete_by_username(&self, _username: &str) -> Result<u64> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(0)
    }
}

fn codec(grace_window: i64) -> Result<Arc<SessionCodec>> {
    Ok(Arc::new(SessionCodec::new(
        &SecretString::from(SECRET.to_string()),
        900,
        grace_window,
    )?))
}

fn gateway(
    store: Arc<dyn CredentialStore>,
    oauth: Option<Arc<dyn OAuthExchange>>,
    timeout: Duration,
) -> Result<Gateway> {
    let services = Services {
        store,
        oauth,
        codec: codec(3600)?,
        hasher: PasswordHasher::with_cost(1024, 1)?,
    };
    Gateway::from_services(&services, timeout)
}

fn memory_gateway(store: Arc<MemoryStore>) -> Result<Gateway> {
    gateway(store, None, Duration::from_secs(5))
}

async fn register(gateway: &Gateway, username: &str, password: &str) -> Reply {
    gateway
        .handle(Inbound::new(Method::POST, "/auth").with_json(&json!({
            "username": username,
            "password": password,
            "firstName": "Alice",
            "lastName": "Liddell",
        })))
        .await
}

async fn login(gateway: &Gateway, username: &str, password: &str) -> Reply {
    gateway
        .handle(
            Inbound::new(Method::PUT, "/auth")
                .with_json(&json!({"username": username, "password": password})),
        )
        .await
}

fn user_id(reply: &Reply) -> Result<Uuid> {
    let raw = reply
        .body
        .get("userId")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("reply has no userId: {}", reply.body))?;
    Ok(Uuid::parse_str(raw)?)
}

fn token(reply: &Reply) -> Result<String> {
    reply
        .body
        .get("token")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("reply has no token: {}", reply.body))
}

#[tokio::test]
async fn account_lifecycle() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = memory_gateway(store.clone())?;

    let created = register(&gateway, "alice", "pw1").await;
    assert_eq!(created.status, StatusCode::CREATED);
    let issued = token(&created)?;
    assert_eq!(created.header("x-auth-token"), Some(issued.as_str()));

    let duplicate = register(&gateway, "alice", "other").await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.body["exists"], json!(true));
    assert_eq!(store.len().await, 1);

    let logged_in = login(&gateway, "alice", "pw1").await;
    assert_eq!(logged_in.status, StatusCode::CREATED);
    assert_eq!(logged_in.body["userId"], created.body["userId"]);

    let wrong = login(&gateway, "alice", "nope").await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["invalid"], json!(true));

    let unknown = login(&gateway, "mallory", "pw1").await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.body, wrong.body);

    let deleted = gateway
        .handle(
            Inbound::new(Method::DELETE, "/user")
                .with_json(&json!({"username": "alice", "password": "pw1"})),
        )
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["deleted"], json!(true));
    assert!(store.is_empty().await);

    let after = login(&gateway, "alice", "pw1").await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn register_with_missing_password_is_bad_request() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = memory_gateway(store.clone())?;

    let reply = gateway
        .handle(Inbound::new(Method::POST, "/auth").with_json(&json!({"username": "alice"})))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(store.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn oauth_creates_then_reuses_the_account() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let github = Arc::new(ScriptedGitHub::new("bob", Some("Bob Builder"), "4242"));
    let gateway = gateway(store.clone(), Some(github.clone()), Duration::from_secs(5))?;

    let first = gateway
        .handle(Inbound::new(Method::POST, "/github").with_json(&json!({"code": "abc"})))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body["name"], json!("bob"));
    assert!(first.header("x-auth-token").is_some());

    let second = gateway
        .handle(Inbound::new(Method::POST, "/github").with_json(&json!({"code": "def"})))
        .await;
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(second.body["userId"], first.body["userId"]);

    assert_eq!(store.len().await, 1);
    assert_eq!(github.exchanges.load(Ordering::SeqCst), 2);

    let stored = store
        .find_by_username("bob")
        .await?
        .ok_or_else(|| anyhow!("bob was not persisted"))?;
    assert_eq!(stored.profile.first_name, "Bob");
    assert_eq!(stored.profile.last_name, "Builder");
    Ok(())
}

#[tokio::test]
async fn oauth_provider_rejection_is_a_server_error() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let github = Arc::new(ScriptedGitHub::new("bob", None, "4242"));
    let gateway = gateway(store.clone(), Some(github), Duration::from_secs(5))?;

    let reply = gateway
        .handle(Inbound::new(Method::POST, "/github").with_json(&json!({"code": "bad"})))
        .await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(store.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn oauth_without_provider_configured() -> Result<()> {
    let gateway = memory_gateway(Arc::new(MemoryStore::new()))?;

    let reply = gateway
        .handle(Inbound::new(Method::POST, "/github").with_json(&json!({"code": "abc"})))
        .await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn session_check_accepts_fresh_token() -> Result<()> {
    let gateway = memory_gateway(Arc::new(MemoryStore::new()))?;
    let created = register(&gateway, "alice", "pw1").await;

    let reply = gateway
        .handle(Inbound::new(Method::GET, "/auth").with_bearer(&token(&created)?))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["invalid"], json!(false));
    assert!(reply.header("x-auth-token").is_none());
    Ok(())
}

#[tokio::test]
async fn tampered_token_is_rejected() -> Result<()> {
    let gateway = memory_gateway(Arc::new(MemoryStore::new()))?;
    let created = register(&gateway, "alice", "pw1").await;
    let issued = token(&created)?;

    let (signed, signature) = issued
        .rsplit_once('.')
        .ok_or_else(|| anyhow!("token has no signature"))?;
    let mut raw = URL_SAFE_NO_PAD.decode(signature)?;
    raw[0] ^= 0x01;
    let tampered = format!("{signed}.{}", URL_SAFE_NO_PAD.encode(raw));

    let reply = gateway
        .handle(Inbound::new(Method::GET, "/auth").with_bearer(&tampered))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["invalid"], json!(true));

    let missing = gateway.handle(Inbound::new(Method::GET, "/auth")).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn token_in_grace_window_is_renewed() -> Result<()> {
    let gateway = memory_gateway(Arc::new(MemoryStore::new()))?;
    let created = register(&gateway, "alice", "pw1").await;
    let stale = codec(3600)?.issue_at(user_id(&created)?, "alice", now_unix() - 900 - 60)?;

    let reply = gateway
        .handle(Inbound::new(Method::GET, "/auth").with_bearer(&stale.token))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let renewed = reply
        .header("x-auth-token")
        .ok_or_else(|| anyhow!("no renewed token"))?;
    assert_ne!(renewed, stale.token);

    let check = gateway
        .handle(Inbound::new(Method::GET, "/auth").with_bearer(renewed))
        .await;
    assert_eq!(check.status, StatusCode::OK);
    assert!(check.header("x-auth-token").is_none());
    Ok(())
}

#[tokio::test]
async fn token_past_grace_window_is_expired() -> Result<()> {
    let gateway = memory_gateway(Arc::new(MemoryStore::new()))?;
    let stale = codec(3600)?.issue_at(Uuid::now_v7(), "alice", now_unix() - 900 - 7200)?;

    let reply = gateway
        .handle(Inbound::new(Method::GET, "/auth").with_bearer(&stale.token))
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn store_fault_is_not_reported_as_bad_credentials() -> Result<()> {
    let gateway = gateway(Arc::new(BrokenStore), None, Duration::from_secs(5))?;

    let reply = login(&gateway, "alice", "pw1").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["message"], json!("Internal server error"));
    assert!(reply.body.get("invalid").is_none());
    Ok(())
}

#[tokio::test]
async fn stalled_store_times_out() -> Result<()> {
    let gateway = gateway(Arc::new(StalledStore), None, Duration::from_millis(50))?;

    let started = std::time::Instant::now();
    let reply = register(&gateway, "alice", "pw1").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn guard_rejects_before_any_flow_runs() -> Result<()> {
    let gateway = gateway(Arc::new(BrokenStore), None, Duration::from_secs(5))?;

    let reply = gateway.handle(Inbound::new(Method::DELETE, "/auth")).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.header("allow"), Some("GET, POST, PUT"));

    let reply = gateway.handle(Inbound::new(Method::GET, "/nowhere")).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn settings_update_and_profile() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = memory_gateway(store.clone())?;
    let created = register(&gateway, "alice", "pw1").await;
    let issued = token(&created)?;

    let updated = gateway
        .handle(
            Inbound::new(Method::PUT, "/user")
                .with_bearer(&issued)
                .with_json(&json!({"darkMode": true, "refreshRate": 5000})),
        )
        .await;
    assert_eq!(updated.status, StatusCode::CREATED);
    assert_eq!(updated.body["success"], json!(true));

    let profile = gateway
        .handle(Inbound::new(Method::GET, "/user/alice").with_bearer(&issued))
        .await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.body["username"], json!("alice"));
    assert_eq!(profile.body["firstName"], json!("Alice"));
    assert_eq!(profile.body["darkMode"], json!(true));
    assert_eq!(profile.body["refreshRate"], json!(5000));
    assert!(profile.body.get("passwordHash").is_none());

    let missing = gateway
        .handle(Inbound::new(Method::GET, "/user/nobody").with_bearer(&issued))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["exists"], json!(false));

    let empty = gateway
        .handle(
            Inbound::new(Method::PUT, "/user")
                .with_bearer(&issued)
                .with_json(&json!({})),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let anonymous = gateway
        .handle(Inbound::new(Method::GET, "/user/alice"))
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn rename_to_taken_username_conflicts() -> Result<()> {
    let gateway = memory_gateway(Arc::new(MemoryStore::new()))?;
    register(&gateway, "bob", "pw2").await;
    let created = register(&gateway, "alice", "pw1").await;

    let reply = gateway
        .handle(
            Inbound::new(Method::PUT, "/user")
                .with_bearer(&token(&created)?)
                .with_json(&json!({"username": "bob"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn rename_reissues_token_and_blocks_stale_renewal() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = memory_gateway(store.clone())?;
    let created = register(&gateway, "alice", "pw1").await;
    let alice_id = user_id(&created)?;

    let renamed = gateway
        .handle(
            Inbound::new(Method::PUT, "/user")
                .with_bearer(&token(&created)?)
                .with_json(&json!({"username": "alicia"})),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::CREATED);
    let reissued = renamed
        .header("x-auth-token")
        .ok_or_else(|| anyhow!("rename did not reissue a token"))?;
    let Verification::Valid(session) = codec(3600)?.verify(reissued) else {
        return Err(anyhow!("reissued token does not verify"));
    };
    assert_eq!(session.subject_id, alice_id);
    assert_eq!(session.username, "alicia");

    // Someone else takes the old name.
    let newcomer = register(&gateway, "alice", "pw2").await;
    assert_eq!(newcomer.status, StatusCode::CREATED);
    assert_ne!(user_id(&newcomer)?, alice_id);

    let stale = codec(3600)?.issue_at(alice_id, "alice", now_unix() - 900 - 60)?;
    let refused = gateway
        .handle(Inbound::new(Method::GET, "/auth").with_bearer(&stale.token))
        .await;
    assert_eq!(refused.status, StatusCode::UNAUTHORIZED);
    assert!(refused.header("x-auth-token").is_none());

    let current = codec(3600)?.issue_at(alice_id, "alicia", now_unix() - 900 - 60)?;
    let renewed = gateway
        .handle(Inbound::new(Method::GET, "/auth").with_bearer(&current.token))
        .await;
    assert_eq!(renewed.status, StatusCode::OK);
    assert!(renewed.header("x-auth-token").is_some());
    assert_eq!(store.len().await, 2);
    Ok(())
}

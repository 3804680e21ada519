use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use whisperlock_client::agent::{
    AgentRequest, CacheAgent, CacheStorage, ClickOutcome, LogNotifier, MemoryWindows,
    StoredResponse, API_CACHE, APP_CACHE, PRECACHE,
};
use whisperlock_client::reconciler::{FlushStatus, Reconciler, StaticConnectivity};
use whisperlock_client::retry::{FileRetryRegistry, RetryRegistry, SYNC_TAG};
use whisperlock_client::ApiClient;
use whisperlock_core::{Store, VaultEntry};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Setup {
    dir: TempDir,
    store: Store,
    net: Arc<StaticConnectivity>,
    retry: Arc<FileRetryRegistry>,
    windows: Arc<MemoryWindows>,
    agent: CacheAgent,
}

async fn setup(base_url: &str, online: bool) -> Setup {
    let dir = tempdir().unwrap();
    let store = Store::open(&dir.path().join("vault.db")).await.unwrap();
    let client = Arc::new(ApiClient::new(base_url).unwrap());
    let net = Arc::new(StaticConnectivity::new(online));
    let retry = Arc::new(FileRetryRegistry::new(dir.path().join("retry-tasks.json")));
    let reconciler = Reconciler::new(store.clone(), client.clone(), net.clone(), retry.clone());
    let cache = Arc::new(CacheStorage::open(dir.path().join("cache")).unwrap());
    let windows = Arc::new(MemoryWindows::default());
    let agent = CacheAgent::new(
        cache,
        client,
        reconciler,
        retry.clone(),
        Arc::new(LogNotifier),
        windows.clone(),
    );
    Setup {
        dir,
        store,
        net,
        retry,
        windows,
        agent,
    }
}

async fn serve(server: &MockServer, p: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn install_precaches_manifest_and_activate_drops_old_generations() {
    let server = MockServer::start().await;
    for p in PRECACHE {
        serve(&server, p, 200, &format!("content of {p}")).await;
    }
    let s = setup(&server.uri(), true).await;
    s.agent
        .cache()
        .put("wl-app-shell-v0", "/index.html", StoredResponse::new(200, None, "old"))
        .unwrap();

    s.agent.install().await.unwrap();
    for p in PRECACHE {
        assert!(s.agent.cache().get(APP_CACHE, p).is_some(), "{p} not cached");
    }

    let deleted = s.agent.activate().unwrap();
    assert_eq!(deleted, vec!["wl-app-shell-v0".to_string()]);
    assert_eq!(s.agent.cache().names(), vec![APP_CACHE.to_string()]);

    let reopened = CacheStorage::open(s.dir.path().join("cache")).unwrap();
    assert_eq!(reopened.names(), vec![APP_CACHE.to_string()]);
}

#[tokio::test]
async fn first_start_precaches_shell_once() {
    let server = MockServer::start().await;
    for p in PRECACHE {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string("shell"))
            .expect(1)
            .mount(&server)
            .await;
    }
    let s = setup(&server.uri(), true).await;

    assert!(s.agent.ensure_installed().await.unwrap());
    s.agent.activate().unwrap();
    assert!(s.agent.cache().get(APP_CACHE, "/index.html").is_some());

    assert!(!s.agent.ensure_installed().await.unwrap());
}

#[tokio::test]
async fn install_is_all_or_nothing() {
    let server = MockServer::start().await;
    for p in PRECACHE {
        if p != "/icons/icon-512.png" {
            serve(&server, p, 200, "ok").await;
        }
    }
    let s = setup(&server.uri(), true).await;

    assert!(s.agent.install().await.is_err());
    assert!(s.agent.cache().get(APP_CACHE, "/index.html").is_none());
}

#[tokio::test]
async fn navigation_serves_shell_cache_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<shell>"))
        .expect(1)
        .mount(&server)
        .await;
    let s = setup(&server.uri(), true).await;

    let first = s
        .agent
        .handle_request(&AgentRequest::navigate("/some/deep/link"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&first.body[..], b"<shell>");

    let second = s
        .agent
        .handle_request(&AgentRequest::navigate("/other"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn generic_reads_cache_only_successes() {
    let server = MockServer::start().await;
    serve(&server, "/styles.css", 200, "body{}").await;
    serve(&server, "/missing.png", 404, "").await;
    let s = setup(&server.uri(), true).await;

    let css = s.agent.handle_request(&AgentRequest::get("/styles.css")).await.unwrap().unwrap();
    assert!(css.is_ok());
    assert_eq!(s.agent.cache().get(APP_CACHE, "/styles.css"), Some(css));

    let missing = s.agent.handle_request(&AgentRequest::get("/missing.png")).await.unwrap().unwrap();
    assert_eq!(missing.status, 404);
    assert!(s.agent.cache().get(APP_CACHE, "/missing.png").is_none());

    assert!(s.agent.handle_request(&AgentRequest::post("/api/sync")).await.unwrap().is_none());
}

#[tokio::test]
async fn api_reads_stale_while_revalidate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/vapidPublicKey"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "v1"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/vapidPublicKey"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "v2"})))
        .mount(&server)
        .await;
    let s = setup(&server.uri(), true).await;
    let req = AgentRequest::get("/api/vapidPublicKey");

    let miss = s.agent.handle_request(&req).await.unwrap().unwrap();
    assert_eq!(&miss.body[..], br#"{"key":"v1"}"#);

    let hit = s.agent.handle_request(&req).await.unwrap().unwrap();
    assert_eq!(&hit.body[..], br#"{"key":"v1"}"#);

    let mut refreshed = false;
    for _ in 0..100 {
        let cached = s.agent.cache().get(API_CACHE, "/api/vapidPublicKey").unwrap();
        if &cached.body[..] == br#"{"key":"v2"}"# {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refreshed, "background refresh never landed");
}

#[tokio::test]
async fn api_miss_without_network_is_not_ok_placeholder() {
    let s = setup("http://127.0.0.1:9", false).await;
    let res = s
        .agent
        .handle_request(&AgentRequest::get("/api/health"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(res, StoredResponse::not_ok());
    assert!(s.agent.cache().get(API_CACHE, "/api/health").is_none());
}

#[tokio::test]
async fn retry_tag_cleared_only_after_outbox_drains() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "syncedIds": ["a1"],
            "syncedAt": "2024-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;
    let s = setup(&server.uri(), false).await;

    let entry = VaultEntry {
        id: "a1".into(),
        title: "t".into(),
        body: "b".into(),
        created_at: chrono::Utc::now(),
        synced_at: None,
    };
    s.store.enqueue_entry(&entry).await.unwrap();
    s.retry.register(SYNC_TAG).unwrap();

    let reports = s.agent.run_pending_retries().await.unwrap();
    assert_eq!(reports[0].status, FlushStatus::Offline);
    assert_eq!(s.retry.pending().unwrap(), vec![SYNC_TAG.to_string()]);

    s.net.set_online(true);
    let report = s.agent.handle_retry(SYNC_TAG).await.unwrap().unwrap();
    assert_eq!(report.status, FlushStatus::Delivered);
    assert!(s.retry.pending().unwrap().is_empty());
    assert!(s.store.vault().get("a1").await.unwrap().unwrap().is_synced());

    assert!(s.agent.handle_retry("other-tag").await.unwrap().is_none());
}

#[tokio::test]
async fn push_and_click_route_to_window() {
    let s = setup("http://127.0.0.1:9", false).await;

    let n = s.agent.handle_push(Some(&b"{garbage"[..])).unwrap();
    assert_eq!(n.title, "WhisperLock");
    assert_eq!(n.body, "");
    assert_eq!(n.url, "/");

    let n = s
        .agent
        .handle_push(Some(
            &br#"{"title":"Secret diary","body":"Backup complete: 1 entries","url":"/#vault"}"#[..],
        ))
        .unwrap();
    assert_eq!(n.title, "Secret diary");

    assert_eq!(s.agent.handle_notification_click(&n).unwrap(), ClickOutcome::Opened(1));
    assert_eq!(s.agent.handle_notification_click(&n).unwrap(), ClickOutcome::Focused(1));
    assert_eq!(s.windows.url_of(1).as_deref(), Some("/#vault"));
}

#[tokio::test]
async fn run_loop_flushes_on_reconnect_and_stops_on_shutdown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "syncedIds": ["a1"]
        })))
        .mount(&server)
        .await;
    let s = setup(&server.uri(), true).await;
    let entry = VaultEntry {
        id: "a1".into(),
        title: "t".into(),
        body: String::new(),
        created_at: chrono::Utc::now(),
        synced_at: None,
    };
    s.store.enqueue_entry(&entry).await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let stopper = async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(());
    };
    let run = s.agent.run(Duration::from_millis(20), async {
        let _ = rx.await;
    });
    tokio::join!(run, stopper);

    assert_eq!(s.store.outbox().count().await.unwrap(), 0);
}

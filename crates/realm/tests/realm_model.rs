use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tabguard_core_types::NavigationMethod;
use tabguard_realm::{
    Element, FetchRequest, FetchResponse, FunctionFlavor, MutationRecord, NetworkError,
    PlatformEffect, Realm, RealmAccess, ScriptError, StaticNetwork, StorageKind, TimerHandler,
    XhrRequest,
};
use url::Url;

fn page(url: &str) -> Arc<Realm> {
    Realm::builder(Url::parse(url).unwrap()).build()
}

#[test]
fn navigation_primitives_commit_and_update_the_url() {
    let realm = page("https://example.com/account/settings");

    realm.assign("../login").unwrap();
    assert_eq!(realm.href(), "https://example.com/login");

    realm.push_state(&json!({}), Some("/inbox")).unwrap();
    realm.replace_state(&json!({}), None).unwrap();
    realm.history_go(-1).unwrap();
    assert_eq!(realm.href(), "https://example.com/login");

    let methods: Vec<NavigationMethod> = realm
        .platform()
        .navigations()
        .into_iter()
        .map(|(method, _)| method)
        .collect();
    assert_eq!(
        methods,
        vec![
            NavigationMethod::Assign,
            NavigationMethod::PushState,
            NavigationMethod::ReplaceState,
            NavigationMethod::HistoryGo,
        ]
    );
}

#[test]
fn cross_origin_push_state_is_a_security_error() {
    let realm = page("https://example.com/");
    let err = realm
        .push_state(&json!(null), Some("https://other.test/"))
        .unwrap_err();
    assert!(matches!(err, ScriptError::Security(_)));
    assert!(realm.platform().navigations().is_empty());
}

#[test]
fn dynamic_code_and_timers_are_recorded() {
    let realm = page("https://example.com/");
    realm.eval("1 + 1").unwrap();
    let compiled = realm
        .construct_function(FunctionFlavor::Async, &["a", "return a"])
        .unwrap();
    assert_eq!(compiled.params, vec!["a".to_string()]);
    realm.set_timeout(TimerHandler::Source("tick()".into()), Duration::from_millis(5));
    realm.set_interval(TimerHandler::Callback(Arc::new(|| {})), Duration::from_millis(5));
    realm.console_clear();

    assert_eq!(realm.platform().evaluated(), vec!["1 + 1".to_string()]);
    assert_eq!(realm.platform().compiled_bodies(), vec!["return a".to_string()]);
    assert_eq!(realm.platform().timer_sources(), vec!["tick()".to_string()]);
    assert_eq!(realm.platform().console_clears(), 1);
}

#[test]
fn storage_writes_go_through_the_shared_setter() {
    let realm = page("https://example.com/");
    realm.set_item(StorageKind::Local, "theme", "dark").unwrap();
    realm.set_item(StorageKind::Session, "step", "2").unwrap();
    assert_eq!(realm.storage(StorageKind::Local).get_item("theme").as_deref(), Some("dark"));
    assert_eq!(realm.storage(StorageKind::Session).keys(), vec!["step".to_string()]);
}

#[test]
fn inserted_frames_get_their_own_realm() {
    let realm = page("https://example.com/");
    let root = realm.document().root();
    let same = realm
        .document()
        .append_child(root, Element::new("iframe").with_attribute("src", "/widget"))
        .unwrap();
    let foreign = realm
        .document()
        .append_child(root, Element::new("iframe").with_attribute("src", "https://ads.test/"))
        .unwrap();

    let child = realm.content_window(same).unwrap();
    assert_eq!(child.url().as_str(), "https://example.com/widget");
    assert_eq!(child.access(), RealmAccess::SameOrigin);
    assert_eq!(child.parent().map(|p| p.id()), Some(realm.id()));
    assert_eq!(realm.content_window(foreign).unwrap().access(), RealmAccess::Opaque);

    let reloaded = realm.load_frame(same, "/widget?v=2").unwrap();
    assert!(!Arc::ptr_eq(&reloaded, &child));
    assert!(Arc::ptr_eq(&realm.content_window(same).unwrap(), &reloaded));
}

#[test]
fn protection_slot_is_set_once() {
    let realm = page("https://example.com/");
    assert!(realm.install_protection(Arc::new(7u32)));
    assert!(!realm.install_protection(Arc::new(8u32)));
    assert_eq!(realm.protection::<u32>().as_deref(), Some(&7));
    assert!(realm.protection::<String>().is_none());
}

#[tokio::test]
async fn fetch_and_xhr_use_the_network_backend() {
    let network = StaticNetwork::new();
    network.route("https://example.com/app.js", 200, Some("text/javascript"), "run()");
    let realm = Realm::builder(Url::parse("https://example.com/").unwrap())
        .network(network)
        .build();

    let response = realm
        .fetch(FetchRequest::get(Url::parse("https://example.com/app.js").unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), Some("text/javascript"));
    assert_eq!(response.text(), "run()");

    let (tx, rx) = tokio::sync::oneshot::channel();
    realm.xhr_send(
        XhrRequest {
            method: "GET".into(),
            url: Url::parse("https://example.com/missing").unwrap(),
        },
        Box::new(move |result: Result<FetchResponse, NetworkError>| {
            let _ = tx.send(result);
        }),
    );
    assert!(rx.await.unwrap().is_err());
}

#[test]
fn script_execution_is_recorded_after_insertion() {
    let realm = page("https://example.com/");
    let seen = Arc::new(Mutex::new(0usize));
    {
        let seen = Arc::clone(&seen);
        realm.document().observe(Arc::new(move |_: &MutationRecord| *seen.lock() += 1));
    }
    let node = realm
        .document()
        .append_child(realm.document().root(), Element::script("boot()"))
        .unwrap();
    assert_eq!(*seen.lock(), 1);
    assert!(realm.platform().effects().iter().any(|effect| matches!(
        effect,
        PlatformEffect::ScriptExecuted { node: executed, .. } if *executed == node
    )));
}

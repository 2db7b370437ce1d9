use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use protection_engine::{EngineConfig, ProtectionEngine};
use serde_json::json;
use tabguard_core_types::NavigationMethod;
use tabguard_realm::{Event, EventTarget, Modifiers, Realm};
use telemetry_bridge::TelemetryReporter;
use url::Url;

fn protected(url: &str) -> (ProtectionEngine, Arc<Realm>) {
    let engine = ProtectionEngine::new(EngineConfig::default(), TelemetryReporter::detached()).unwrap();
    let realm = Realm::builder(Url::parse(url).unwrap()).build();
    engine.install(&realm);
    (engine, realm)
}

fn blocked(engine: &ProtectionEngine, realm: &Realm) -> u64 {
    engine.state(realm).unwrap().blocked_count()
}

fn methods(realm: &Realm) -> Vec<NavigationMethod> {
    realm
        .platform()
        .navigations()
        .into_iter()
        .map(|(method, _)| method)
        .collect()
}

#[test]
fn forced_redirect_from_a_deep_page_is_absorbed() {
    let (engine, realm) = protected("https://example.com/account/settings");

    realm.assign("https://example.com/login").unwrap();
    assert_eq!(realm.href(), "https://example.com/account/settings");
    assert!(realm.platform().navigations().is_empty());
    assert_eq!(blocked(&engine, &realm), 1);

    realm.set_href("/").unwrap();
    realm.location_replace("/logout").unwrap();
    assert!(realm.platform().navigations().is_empty());
    assert_eq!(blocked(&engine, &realm), 3);
}

#[test]
fn ordinary_same_origin_navigation_goes_through() {
    let (engine, realm) = protected("https://example.com/account/settings");

    realm.assign("https://example.com/account/profile").unwrap();
    assert_eq!(realm.href(), "https://example.com/account/profile");
    assert_eq!(methods(&realm), vec![NavigationMethod::Assign]);
    assert_eq!(blocked(&engine, &realm), 0);
}

#[test]
fn cross_origin_navigation_is_blocked() {
    let (engine, realm) = protected("https://example.com/");

    realm.assign("https://evil.example/").unwrap();
    assert_eq!(realm.href(), "https://example.com/");
    assert_eq!(blocked(&engine, &realm), 1);
}

#[test]
fn landing_pages_may_go_to_login() {
    let (engine, realm) = protected("https://example.com/");

    realm.assign("/login").unwrap();
    assert_eq!(realm.href(), "https://example.com/login");
    assert_eq!(blocked(&engine, &realm), 0);
}

#[test]
fn self_reloads_are_blocked_while_idle() {
    let (engine, realm) = protected("https://example.com/account/settings");

    realm.reload().unwrap();
    realm.history_go(0).unwrap();
    assert!(realm.platform().navigations().is_empty());
    assert_eq!(blocked(&engine, &realm), 2);
}

#[test]
fn history_traversal_and_state_updates_are_left_alone() {
    let (engine, realm) = protected("https://example.com/account/settings");

    realm.push_state(&json!({"tab": 2}), Some("/account/settings?tab=2")).unwrap();
    realm.replace_state(&json!(null), None).unwrap();
    realm.history_go(-1).unwrap();
    assert_eq!(
        methods(&realm),
        vec![
            NavigationMethod::PushState,
            NavigationMethod::ReplaceState,
            NavigationMethod::HistoryGo
        ]
    );
    assert_eq!(realm.href(), "https://example.com/account/settings");

    realm.push_state(&json!(null), Some("/login")).unwrap();
    assert_eq!(realm.href(), "https://example.com/account/settings");
    assert_eq!(blocked(&engine, &realm), 1);
}

#[test]
fn same_page_updates_on_a_landing_path_are_not_counted() {
    let (engine, realm) = protected("https://app.example/home/feed");

    realm.push_state(&json!({"tab": 2}), None).unwrap();
    realm.replace_state(&json!({"tab": 3}), None).unwrap();
    realm.set_href("#comments").unwrap();
    assert_eq!(
        methods(&realm),
        vec![
            NavigationMethod::PushState,
            NavigationMethod::ReplaceState,
            NavigationMethod::Assign
        ]
    );
    assert_eq!(realm.href(), "https://app.example/home/feed#comments");
    assert_eq!(blocked(&engine, &realm), 0);

    realm.reload().unwrap();
    realm.history_go(0).unwrap();
    assert_eq!(methods(&realm).len(), 3);
    assert_eq!(blocked(&engine, &realm), 2);
}

#[test]
fn unresolvable_targets_are_allowed_through() {
    let (engine, realm) = protected("https://example.com/account/settings");

    assert!(realm.assign("http://[::1").is_err());
    assert_eq!(blocked(&engine, &realm), 0);
}

#[tokio::test(start_paused = true)]
async fn primary_click_arms_the_window() {
    let (engine, realm) = protected("https://example.com/account/settings");

    realm.dispatch_event(&Event::trusted("click", EventTarget::Document));
    tokio::time::advance(Duration::from_millis(500)).await;
    realm.reload().unwrap();
    assert_eq!(methods(&realm), vec![NavigationMethod::Reload]);

    tokio::time::advance(Duration::from_millis(600)).await;
    realm.reload().unwrap();
    assert_eq!(methods(&realm), vec![NavigationMethod::Reload]);
    assert_eq!(blocked(&engine, &realm), 1);
}

#[tokio::test(start_paused = true)]
async fn only_genuine_input_arms_the_window() {
    let (engine, realm) = protected("https://example.com/account/settings");

    realm.dispatch_event(&Event::new("click", EventTarget::Document));
    realm.dispatch_event(&Event::trusted("click", EventTarget::Document).with_button(2));
    realm.dispatch_event(&Event::key_down("a", Modifiers::default(), EventTarget::Document));
    realm.assign("/login").unwrap();
    assert_eq!(blocked(&engine, &realm), 1);

    realm.dispatch_event(&Event::key_down("Enter", Modifiers::default(), EventTarget::Document));
    realm.assign("/login").unwrap();
    assert_eq!(realm.href(), "https://example.com/login");

    let (engine, realm) = protected("https://example.com/account/settings");
    realm.dispatch_event(&Event::trusted("submit", EventTarget::Document));
    tokio::time::advance(Duration::from_millis(999)).await;
    realm.assign("https://elsewhere.example/").unwrap();
    assert_eq!(realm.href(), "https://elsewhere.example/");
    assert_eq!(blocked(&engine, &realm), 0);
}

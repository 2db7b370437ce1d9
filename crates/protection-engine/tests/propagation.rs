use std::sync::Arc;

use pretty_assertions::assert_eq;
use protection_engine::{EngineConfig, ProtectionEngine};
use tabguard_core_types::NodeId;
use tabguard_realm::{Element, Realm, RealmAccess};
use telemetry_bridge::TelemetryReporter;
use url::Url;

fn engine() -> ProtectionEngine {
    ProtectionEngine::new(EngineConfig::default(), TelemetryReporter::detached()).unwrap()
}

fn page(url: &str) -> Arc<Realm> {
    Realm::builder(Url::parse(url).unwrap()).build()
}

fn insert_frame(realm: &Realm, src: &str) -> NodeId {
    let document = realm.document();
    document
        .append_child(document.root(), Element::new("iframe").with_attribute("src", src))
        .unwrap()
}

#[test]
fn same_origin_frames_are_instrumented_on_insertion() {
    let engine = engine();
    let realm = page("https://example.com/app");
    engine.install(&realm);

    let node = insert_frame(&realm, "/widget");
    let child = realm.document().element(node).unwrap().frame.unwrap();
    assert_eq!(child.access(), RealmAccess::SameOrigin);
    assert!(child.is_protected());

    child.eval("debugger").unwrap();
    assert_eq!(engine.state(&child).unwrap().blocked_count(), 1);
    assert_eq!(engine.state(&realm).unwrap().blocked_count(), 0);
    assert_ne!(engine.state(&child).unwrap().context(), engine.state(&realm).unwrap().context());
}

#[test]
fn cross_origin_frames_are_left_alone() {
    let engine = engine();
    let realm = page("https://example.com/app");
    engine.install(&realm);

    let node = insert_frame(&realm, "https://ads.example/slot");
    let child = realm.content_window(node).unwrap();
    assert_eq!(child.access(), RealmAccess::Opaque);
    assert!(!child.is_protected());
}

#[test]
fn frames_present_before_installation_are_covered() {
    let engine = engine();
    let realm = page("https://example.com/app");
    let node = insert_frame(&realm, "/existing");
    let child = realm.content_window(node).unwrap();
    assert!(!child.is_protected());

    engine.install(&realm);
    assert!(child.is_protected());
}

#[test]
fn reloaded_frames_are_instrumented_on_load() {
    let engine = engine();
    let realm = page("https://example.com/app");
    engine.install(&realm);
    let node = insert_frame(&realm, "/first");

    let replacement = realm.load_frame(node, "/second").unwrap();
    assert!(replacement.is_protected());
    assert_eq!(replacement.url().path(), "/second");

    // The contentWindow getter hands back the same, already protected realm.
    let seen = realm.content_window(node).unwrap();
    assert!(Arc::ptr_eq(&seen, &replacement));
}

#[test]
fn explicit_install_after_propagation_does_not_stack_wrappers() {
    let engine = engine();
    let realm = page("https://example.com/app");
    engine.install(&realm);
    let node = insert_frame(&realm, "/widget");
    let child = realm.content_window(node).unwrap();

    assert!(engine.install(&child).report().is_none());
    child.eval("debugger").unwrap();
    assert_eq!(engine.state(&child).unwrap().blocked_count(), 1);
    assert_eq!(child.platform().evaluated(), vec!["void 0;".to_string()]);
}

#[test]
fn nested_frames_are_reached_recursively() {
    let engine = engine();
    let realm = page("https://example.com/app");
    engine.install(&realm);

    let outer = realm.content_window(insert_frame(&realm, "/outer")).unwrap();
    let inner = outer.content_window(insert_frame(&outer, "/inner")).unwrap();
    assert!(inner.is_protected());
    assert_eq!(inner.parent().map(|parent| parent.id()), Some(outer.id()));
}

//! Script Sanitizer delivery paths: inline script elements seen through the document's
//! mutation stream, and script bodies returned by `fetch` and `XMLHttpRequest`.

use std::sync::Arc;

use futures::future::BoxFuture;
use script_sanitizer::is_script_resource;
use tabguard_core_types::{GuardError, GuardKind};
use tabguard_realm::globals::{FetchFn, XhrSendFn};
use tabguard_realm::{
    FetchRequest, FetchResponse, MutationRecord, NetworkError, Realm, XhrCallback, XhrRequest,
};
use tracing::trace;

use crate::guard::{wrap_binding, Guard};

/// Type given to an original script element once its sanitized copy has been inserted. The
/// platform does not execute elements of unknown script types.
pub const NEUTRALIZED_SCRIPT_TYPE: &str = "text/tabguard-neutralized";

pub(crate) fn install_observer(guard: &Guard, realm: &Realm) {
    let guard = guard.clone();
    realm
        .document()
        .observe(Arc::new(move |record: &MutationRecord| inspect_insertion(&guard, record)));
}

fn inspect_insertion(guard: &Guard, record: &MutationRecord) {
    let node = record.node;
    if guard.state.is_processed(node) {
        return;
    }
    let Some(realm) = guard.realm() else {
        return;
    };
    let document = realm.document();
    let Some(element) = document.element(node) else {
        return;
    };
    if !element.is_script() {
        return;
    }
    if !element.is_executable_script() || element.attribute("src").is_some() {
        guard.state.mark_processed(node);
        return;
    }

    let Some(rewritten) = guard.neutralize(&element.text) else {
        trace!(%node, "inline script left as is");
        guard.state.mark_processed(node);
        return;
    };

    // Marked first: the replacement's own insertion re-enters this observer.
    guard.state.mark_processed(node);
    let mut replacement = element.clone();
    replacement.text = rewritten;
    match document.insert_before(node, replacement) {
        Ok(copy) => {
            guard.state.mark_processed(copy);
            if let Err(err) = document.set_attribute(node, "type", NEUTRALIZED_SCRIPT_TYPE) {
                guard.anomaly(format!("could not neutralize original script {node}: {err}"));
                return;
            }
            guard.block(
                GuardKind::ScriptObserver,
                format!("replaced inline script {node} with sanitized copy {copy}"),
            );
        }
        Err(err) => guard.anomaly(format!("sanitized copy of {node} not inserted: {err}")),
    }
}

/// Returns `response` with its body sanitized when it carries script text.
fn sanitize_response(guard: &Guard, kind: GuardKind, response: FetchResponse) -> FetchResponse {
    if !is_script_resource(response.url.path(), response.content_type()) {
        return response;
    }
    match guard.neutralize(response.text()) {
        Some(body) => {
            guard.block(kind, format!("sanitized script response from {}", response.url));
            response.with_body(body)
        }
        None => response,
    }
}

pub(crate) fn install_fetch(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::NetworkFetch, &realm.globals().fetch, move |native| {
        let fetch: Arc<FetchFn> = Arc::new(
            move |request: FetchRequest| -> BoxFuture<'static, Result<FetchResponse, NetworkError>> {
                let pending = (native.func())(request);
                let guard = guard.clone();
                Box::pin(async move {
                    let response = pending.await?;
                    Ok(sanitize_response(&guard, GuardKind::NetworkFetch, response))
                })
            },
        );
        fetch
    })
}

pub(crate) fn install_xhr(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::NetworkXhr, &realm.globals().xhr_send, move |native| {
        let send: Arc<XhrSendFn> = Arc::new(move |request: XhrRequest, done: XhrCallback| {
            let guard = guard.clone();
            let intercepted: XhrCallback = Box::new(move |result: Result<FetchResponse, NetworkError>| {
                done(result.map(|response| sanitize_response(&guard, GuardKind::NetworkXhr, response)))
            });
            (native.func())(request, intercepted)
        });
        send
    })
}

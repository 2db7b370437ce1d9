//! The guarded global bindings and their native implementations.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tabguard_core_types::NodeId;

use crate::capability::{Binding, Capability};
use crate::channel::{BroadcastChannel, ChannelHub};
use crate::network::{FetchRequest, FetchResponse, NetworkBackend, NetworkError, XhrCallback, XhrRequest};
use crate::platform::{PlatformEffect, PlatformLog, ScriptError, StorageArea, TimerId};
use crate::{Realm, ScriptValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionFlavor {
    Plain,
    Async,
    Generator,
    AsyncGenerator,
}

impl FunctionFlavor {
    pub const ALL: [FunctionFlavor; 4] = [
        FunctionFlavor::Plain,
        FunctionFlavor::Async,
        FunctionFlavor::Generator,
        FunctionFlavor::AsyncGenerator,
    ];

    pub fn constructor_name(&self) -> &'static str {
        match self {
            FunctionFlavor::Plain => "Function",
            FunctionFlavor::Async => "AsyncFunction",
            FunctionFlavor::Generator => "GeneratorFunction",
            FunctionFlavor::AsyncGenerator => "AsyncGeneratorFunction",
        }
    }

    fn index(&self) -> usize {
        match self {
            FunctionFlavor::Plain => 0,
            FunctionFlavor::Async => 1,
            FunctionFlavor::Generator => 2,
            FunctionFlavor::AsyncGenerator => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledFunction {
    pub flavor: FunctionFlavor,
    pub params: Vec<String>,
    pub body: String,
}

/// What a timer runs: a source string to evaluate or a host callback.
#[derive(Clone)]
pub enum TimerHandler {
    Source(String),
    Callback(Arc<dyn Fn() + Send + Sync>),
}

impl fmt::Debug for TimerHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerHandler::Source(source) => f.debug_tuple("Source").field(source).finish(),
            TimerHandler::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

pub type EvalFn = dyn Fn(&str) -> Result<ScriptValue, ScriptError> + Send + Sync;
pub type FunctionCtorFn = dyn Fn(&[String]) -> Result<CompiledFunction, ScriptError> + Send + Sync;
pub type TimerFn = dyn Fn(TimerHandler, Duration) -> TimerId + Send + Sync;
pub type StorageSetFn = dyn Fn(&StorageArea, &str, &str) -> Result<(), ScriptError> + Send + Sync;
pub type ConsoleClearFn = dyn Fn() + Send + Sync;
pub type ChannelCtorFn = dyn Fn(&str) -> BroadcastChannel + Send + Sync;
pub type FetchFn =
    dyn Fn(FetchRequest) -> BoxFuture<'static, Result<FetchResponse, NetworkError>> + Send + Sync;
pub type XhrSendFn = dyn Fn(XhrRequest, XhrCallback) + Send + Sync;
pub type ContentWindowFn = dyn Fn(NodeId) -> Option<Arc<Realm>> + Send + Sync;

/// The replaceable global capability slots of one realm.
pub struct GlobalScope {
    pub broadcast_channel: Binding<Capability<ChannelCtorFn>>,
    functions: [Binding<Capability<FunctionCtorFn>>; 4],
    pub eval: Binding<Capability<EvalFn>>,
    pub set_timeout: Binding<Capability<TimerFn>>,
    pub set_interval: Binding<Capability<TimerFn>>,
    pub storage_set_item: Binding<Capability<StorageSetFn>>,
    pub console_clear: Binding<Capability<ConsoleClearFn>>,
    pub fetch: Binding<Capability<FetchFn>>,
    pub xhr_send: Binding<Capability<XhrSendFn>>,
    pub content_window: Binding<Capability<ContentWindowFn>>,
}

impl GlobalScope {
    pub(crate) fn native(
        realm: Weak<Realm>,
        platform: Arc<PlatformLog>,
        hub: Arc<ChannelHub>,
        network: Arc<dyn NetworkBackend>,
    ) -> Self {
        let timers = Arc::new(AtomicU32::new(1));

        let eval: Arc<EvalFn> = {
            let platform = Arc::clone(&platform);
            Arc::new(move |source: &str| -> Result<ScriptValue, ScriptError> {
                platform.record(PlatformEffect::Evaluated(source.to_string()));
                Ok(ScriptValue::Null)
            })
        };

        let functions = FunctionFlavor::ALL.map(|flavor| {
            let platform = Arc::clone(&platform);
            let compile: Arc<FunctionCtorFn> = Arc::new(move |args: &[String]| -> Result<CompiledFunction, ScriptError> {
                let (body, params) = match args.split_last() {
                    Some((body, params)) => (body.clone(), params.to_vec()),
                    None => (String::new(), Vec::new()),
                };
                platform.record(PlatformEffect::FunctionCompiled {
                    params: params.clone(),
                    body: body.clone(),
                });
                Ok(CompiledFunction {
                    flavor,
                    params,
                    body,
                })
            });
            Binding::new(
                flavor.constructor_name(),
                Capability::native(flavor.constructor_name(), "Function", compile),
            )
        });

        let timer = |repeat: bool| -> Arc<TimerFn> {
            let platform = Arc::clone(&platform);
            let timers = Arc::clone(&timers);
            Arc::new(move |handler: TimerHandler, delay: Duration| {
                let id = TimerId(timers.fetch_add(1, Ordering::Relaxed));
                let source = match handler {
                    TimerHandler::Source(source) => Some(source),
                    TimerHandler::Callback(_) => None,
                };
                platform.record(PlatformEffect::TimerScheduled {
                    id,
                    repeat,
                    source,
                    delay,
                });
                id
            })
        };

        let storage_set_item: Arc<StorageSetFn> = {
            let platform = Arc::clone(&platform);
            Arc::new(move |area: &StorageArea, key: &str, value: &str| -> Result<(), ScriptError> {
                area.write(key, value);
                platform.record(PlatformEffect::StorageWritten {
                    kind: area.kind(),
                    key: key.to_string(),
                    value: value.to_string(),
                });
                Ok(())
            })
        };

        let console_clear: Arc<ConsoleClearFn> = {
            let platform = Arc::clone(&platform);
            Arc::new(move || platform.record(PlatformEffect::ConsoleCleared))
        };

        let broadcast_channel: Arc<ChannelCtorFn> = {
            let platform = Arc::clone(&platform);
            Arc::new(move |name: &str| {
                platform.record(PlatformEffect::ChannelOpened(name.to_string()));
                BroadcastChannel::Native(hub.open(name))
            })
        };

        let fetch: Arc<FetchFn> = {
            let network = Arc::clone(&network);
            Arc::new(
                move |request: FetchRequest| -> BoxFuture<'static, Result<FetchResponse, NetworkError>> {
                    let network = Arc::clone(&network);
                    Box::pin(async move { network.fetch(&request).await })
                },
            )
        };

        let xhr_send: Arc<XhrSendFn> = Arc::new(move |request: XhrRequest, done: XhrCallback| {
            let network = Arc::clone(&network);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let request = FetchRequest {
                            method: request.method,
                            url: request.url,
                        };
                        done(network.fetch(&request).await);
                    });
                }
                Err(_) => done(Err(NetworkError::NoRuntime)),
            }
        });

        let content_window: Arc<ContentWindowFn> = Arc::new(move |node: NodeId| {
            realm
                .upgrade()
                .and_then(|realm| realm.document().element(node))
                .and_then(|element| element.frame)
        });

        Self {
            broadcast_channel: Binding::new(
                "BroadcastChannel",
                Capability::native("BroadcastChannel", "Function", broadcast_channel),
            ),
            functions,
            eval: Binding::new("eval", Capability::native("eval", "Function", eval)),
            set_timeout: Binding::new(
                "setTimeout",
                Capability::native("setTimeout", "Function", timer(false)),
            ),
            set_interval: Binding::new(
                "setInterval",
                Capability::native("setInterval", "Function", timer(true)),
            ),
            storage_set_item: Binding::new(
                "Storage.prototype.setItem",
                Capability::native("setItem", "Function", storage_set_item),
            ),
            console_clear: Binding::new(
                "console.clear",
                Capability::native("clear", "Function", console_clear),
            ),
            fetch: Binding::new("fetch", Capability::native("fetch", "Function", fetch)),
            xhr_send: Binding::new(
                "XMLHttpRequest.prototype.send",
                Capability::native("send", "Function", xhr_send),
            ),
            content_window: Binding::new(
                "HTMLIFrameElement.prototype.contentWindow",
                Capability::native("get contentWindow", "Function", content_window),
            ),
        }
    }

    pub fn function_ctor(&self, flavor: FunctionFlavor) -> &Binding<Capability<FunctionCtorFn>> {
        &self.functions[flavor.index()]
    }

    /// Freezes every slot, modelling a context whose built-ins are non-writable.
    pub fn freeze_all(&self) {
        self.broadcast_channel.freeze();
        for binding in &self.functions {
            binding.freeze();
        }
        self.eval.freeze();
        self.set_timeout.freeze();
        self.set_interval.freeze();
        self.storage_set_item.freeze();
        self.console_clear.freeze();
        self.fetch.freeze();
        self.xhr_send.freeze();
        self.content_window.freeze();
    }
}

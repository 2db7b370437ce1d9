//! `Function`-family constructors, `eval` and string-form timers.

use std::sync::Arc;
use std::time::Duration;

use tabguard_core_types::{GuardError, GuardKind};
use tabguard_realm::globals::{EvalFn, FunctionCtorFn, TimerFn};
use tabguard_realm::{CompiledFunction, FunctionFlavor, Realm, ScriptError, ScriptValue, TimerHandler, TimerId};

use crate::guard::{wrap_binding, Guard};

/// Wraps all four constructor flavors. A frozen flavor fails the guard but does not stop the
/// others from being wrapped.
pub(crate) fn install_function_ctors(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let mut first_error = None;
    for flavor in FunctionFlavor::ALL {
        let guard = guard.clone();
        let result = wrap_binding(
            GuardKind::FunctionConstructor,
            realm.globals().function_ctor(flavor),
            move |native| {
                let ctor: Arc<FunctionCtorFn> =
                    Arc::new(move |args: &[String]| -> Result<CompiledFunction, ScriptError> {
                        let rewritten = args.split_last().and_then(|(body, params)| {
                            let body = guard.neutralize(body)?;
                            let mut args = params.to_vec();
                            args.push(body);
                            Some(args)
                        });
                        match rewritten {
                            Some(args) => {
                                guard.block(
                                    GuardKind::FunctionConstructor,
                                    format!("neutralized {} body", flavor.constructor_name()),
                                );
                                (native.func())(&args)
                            }
                            None => (native.func())(args),
                        }
                    });
                ctor
            },
        );
        if let Err(err) = result {
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}

pub(crate) fn install_eval(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::Eval, &realm.globals().eval, move |native| {
        let eval: Arc<EvalFn> = Arc::new(move |source: &str| -> Result<ScriptValue, ScriptError> {
            match guard.neutralize(source) {
                Some(rewritten) => {
                    guard.block(GuardKind::Eval, "neutralized eval() source");
                    (native.func())(&rewritten)
                }
                None => (native.func())(source),
            }
        });
        eval
    })
}

pub(crate) fn install_timers(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let timeout = wrap_timer(guard, realm, "setTimeout", false);
    let interval = wrap_timer(guard, realm, "setInterval", true);
    timeout.and(interval)
}

fn wrap_timer(guard: &Guard, realm: &Realm, name: &'static str, repeat: bool) -> Result<(), GuardError> {
    let binding = if repeat {
        &realm.globals().set_interval
    } else {
        &realm.globals().set_timeout
    };
    let guard = guard.clone();
    wrap_binding(GuardKind::Timers, binding, move |native| {
        let timer: Arc<TimerFn> = Arc::new(move |handler: TimerHandler, delay: Duration| -> TimerId {
            let handler = match handler {
                TimerHandler::Source(source) => match guard.neutralize(&source) {
                    Some(rewritten) => {
                        guard.block(GuardKind::Timers, format!("neutralized {name}() source"));
                        TimerHandler::Source(rewritten)
                    }
                    None => TimerHandler::Source(source),
                },
                callback => callback,
            };
            (native.func())(handler, delay)
        });
        timer
    })
}

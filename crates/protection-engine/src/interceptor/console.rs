use std::sync::Arc;

use tabguard_core_types::{GuardError, GuardKind};
use tabguard_realm::globals::ConsoleClearFn;
use tabguard_realm::Realm;

use crate::guard::{wrap_binding, Guard};

pub(crate) fn install(guard: &Guard, realm: &Realm) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::ConsoleClear, &realm.globals().console_clear, move |_native| {
        let clear: Arc<ConsoleClearFn> =
            Arc::new(move || guard.block(GuardKind::ConsoleClear, "suppressed console.clear()"));
        clear
    })
}

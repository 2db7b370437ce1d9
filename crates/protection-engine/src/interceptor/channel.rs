use std::sync::Arc;

use tabguard_core_types::{GuardError, GuardKind};
use tabguard_realm::globals::ChannelCtorFn;
use tabguard_realm::{BroadcastChannel, InertChannel};

use crate::guard::{wrap_binding, Guard};

/// Every construction yields an inert channel, so same-site tabs can never find each other.
pub(crate) fn install(guard: &Guard, realm: &tabguard_realm::Realm) -> Result<(), GuardError> {
    let guard = guard.clone();
    wrap_binding(GuardKind::BroadcastChannel, &realm.globals().broadcast_channel, move |_native| {
        let ctor: Arc<ChannelCtorFn> = Arc::new(move |name: &str| -> BroadcastChannel {
            guard.block(
                GuardKind::BroadcastChannel,
                format!("replaced BroadcastChannel('{name}') with an inert channel"),
            );
            BroadcastChannel::Inert(InertChannel::new(name))
        });
        ctor
    })
}

use tokio::sync::oneshot;

use crate::entry::PooledEntry;
use crate::handlers::LogHandler;

/// Items of the dispatch loop's input queue.
pub(crate) enum DispatchEvent {
    Entry(PooledEntry),

    /// A newer configuration snapshot is waiting on the watch channel.
    Reconfigure,

    RegisterHandler {
        key: String,
        handler: Box<dyn LogHandler>,
        reply: oneshot::Sender<bool>,
    },

    UnregisterHandler {
        key: String,
        reply: oneshot::Sender<bool>,
    },

    /// Soft stop: everything queued before is delivered, nothing after.
    Close,
}

impl std::fmt::Debug for DispatchEvent {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DispatchEvent::Entry(e) => f.debug_tuple("Entry").field(&e.text_or_empty()).finish(),
            DispatchEvent::Reconfigure => f.write_str("Reconfigure"),
            DispatchEvent::RegisterHandler { key, .. } => f.debug_struct("RegisterHandler").field("key", key).finish(),
            DispatchEvent::UnregisterHandler { key, .. } => {
                f.debug_struct("UnregisterHandler").field("key", key).finish()
            }
            DispatchEvent::Close => f.write_str("Close"),
        }
    }
}

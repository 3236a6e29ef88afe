use opcache_model::OperationId;

/// The caller-provided event-notification contract.
///
/// The store and the executor facade never log directly to a fixed sink — every diagnostic
/// passes through a `&dyn Notifier` so an embedding build system can route it wherever it likes.
/// All methods default to a no-op, so an implementor only overrides what it cares about.
pub trait Notifier {
    /// A one-shot, recoverable event — the cross-device-link fallback is the only caller today.
    fn notify_warn(&self, msg: &str) {
        let _ = msg;
    }

    /// A caught, non-fatal error encountered while servicing `op_id`.
    fn notify_error(&self, op_id: OperationId, msg: &str) {
        let _ = (op_id, msg);
    }

    /// An observability hook, e.g. reporting a cache hit or miss for `op`.
    fn notify_debug(&self, op_id: OperationId, header: &str) {
        let _ = (op_id, header);
    }
}

/// A [`Notifier`] that discards every event. The default choice for callers that don't need
/// observability.
#[derive(Default, Debug, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

/// A [`Notifier`] that routes every event through the `log` facade.
#[derive(Default, Debug, Clone, Copy)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify_warn(&self, msg: &str) {
        warn!("{msg}");
    }

    fn notify_error(&self, op_id: OperationId, msg: &str) {
        error!("operation {op_id}: {msg}");
    }

    fn notify_debug(&self, op_id: OperationId, header: &str) {
        debug!("operation {op_id}: {header}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcache_model::OperationIdGen;

    #[test]
    fn test_null_notifier_does_not_panic() {
        let n = NullNotifier;
        let gen = OperationIdGen::new();
        n.notify_warn("hello");
        n.notify_error(gen.next(), "oops");
        n.notify_debug(gen.next(), "hit");
    }

    #[test]
    fn test_logging_notifier_does_not_panic() {
        let n = LoggingNotifier;
        let gen = OperationIdGen::new();
        n.notify_warn("hello");
        n.notify_error(gen.next(), "oops");
        n.notify_debug(gen.next(), "hit");
    }
}

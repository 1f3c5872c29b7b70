use log::info;
use tokio::sync::mpsc;

use super::audit_model::ActionRecord;

/// Fire-and-forget destination for [`ActionRecord`]s.
///
/// `record` must not block and never fails; a sink that cannot deliver drops
/// the record.
pub trait ActionAuditSink: Send + Sync {
    fn record(&self, action: ActionRecord);
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpActionAuditSink;

impl ActionAuditSink for NoOpActionAuditSink {
    fn record(&self, _action: ActionRecord) {}
}

/// Writes each record to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogActionAuditSink;

impl ActionAuditSink for LogActionAuditSink {
    fn record(&self, action: ActionRecord) {
        info!(
            "[Audit] {} by {}: {}",
            action.kind, action.owner_id, action.details
        );
    }
}

/// Forwards records to an unbounded channel, typically drained by a task
/// that ships them to the action log service.
#[derive(Debug, Clone)]
pub struct ChannelActionAuditSink {
    sender: mpsc::UnboundedSender<ActionRecord>,
}

impl ChannelActionAuditSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ActionRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ActionAuditSink for ChannelActionAuditSink {
    fn record(&self, action: ActionRecord) {
        if self.sender.send(action).is_err() {
            log::debug!("[Audit] receiver closed; action dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn channel_sink_forwards_records_in_order() {
        let (sink, mut receiver) = ChannelActionAuditSink::channel();
        sink.record(ActionRecord::new("journal:create", "u1", json!({})));
        sink.record(ActionRecord::new("journal:delete", "u1", json!({})));

        assert_eq!(receiver.recv().await.unwrap().kind, "journal:create");
        assert_eq!(receiver.recv().await.unwrap().kind, "journal:delete");
    }

    #[test]
    fn channel_sink_drops_silently_after_receiver_closed() {
        let (sink, receiver) = ChannelActionAuditSink::channel();
        drop(receiver);
        sink.record(ActionRecord::new("journal:update", "u1", json!({})));
    }

    #[test]
    fn no_op_and_log_sinks_accept_records() {
        NoOpActionAuditSink.record(ActionRecord::new("a", "u1", json!(null)));
        LogActionAuditSink.record(ActionRecord::new("b", "u1", json!({ "x": 1 })));
    }
}

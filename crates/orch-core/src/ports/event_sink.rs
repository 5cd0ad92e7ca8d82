use async_trait::async_trait;

use crate::domain::Event;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Event) -> anyhow::Result<()>;

    async fn publish_batch(&self, events: Vec<Event>) -> anyhow::Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

const _: () = {
    fn _assert_object_safe(_: &dyn EventSink) {}
};

/// Default, dependency-free sink: publishes by logging. A message-broker
/// backed sink is an integration concern left to the embedding application.
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn publish(&self, event: Event) -> anyhow::Result<()> {
        tracing::info!(
            event_type = %event.event_type,
            event_id = %event.event_id,
            correlation_id = %event.correlation_id,
            payload = %event.payload,
            "domain event",
        );
        Ok(())
    }
}

//! Transformers driven by watched events.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::{DbOperation, DbValue, OperationSink, WatchedEventRepository};
use crate::types::chain::WatchedEvent;

use super::error::TransformationError;
use super::traits::{Transformer, TransformerDeps, TransformerInitializer};

/// Converts a watched event into a typed entity, then into the operation
/// that persists it. The operation must be keyed by `log_id` and ignore
/// conflicts.
pub trait EventConverter: Send + Sync + 'static {
    type Entity: Send;

    fn to_entity(&self, event: &WatchedEvent) -> Result<Self::Entity, TransformationError>;

    fn to_operation(&self, event: &WatchedEvent, entity: Self::Entity) -> DbOperation;
}

pub struct EventTransformer<C: EventConverter> {
    name: String,
    filters: Vec<String>,
    converter: C,
    watched_events: Arc<dyn WatchedEventRepository>,
    sink: Arc<dyn OperationSink>,
}

impl<C: EventConverter> EventTransformer<C> {
    pub fn new(name: &str, filters: Vec<String>, converter: C, deps: &TransformerDeps) -> Self {
        Self {
            name: name.to_string(),
            filters,
            converter,
            watched_events: deps.watched_events.clone(),
            sink: deps.sink.clone(),
        }
    }
}

#[async_trait]
impl<C: EventConverter> Transformer for EventTransformer<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<(), TransformationError> {
        for filter in &self.filters {
            let events = self.watched_events.get_watched_events(filter).await?;
            if events.is_empty() {
                continue;
            }

            let mut operations = Vec::with_capacity(events.len());
            for event in &events {
                let entity = self.converter.to_entity(event)?;
                operations.push(self.converter.to_operation(event, entity));
            }

            tracing::debug!(
                "{}: persisting {} events from filter {}",
                self.name,
                operations.len(),
                filter
            );
            self.sink.execute(operations).await?;
        }
        Ok(())
    }
}

pub const WATCHED_EVENT_RECORDS_TABLE: &str = "watched_event_records";

/// Stores each watched event verbatim in `watched_event_records`, once per
/// transformer name, filter and log.
pub struct WatchedEventRecorder {
    transformer: String,
}

impl WatchedEventRecorder {
    pub fn new(transformer: &str) -> Self {
        Self {
            transformer: transformer.to_string(),
        }
    }

    /// Initializer for an [`EventTransformer`] recording `filters` under `name`.
    pub fn initializer(name: &str, filters: Vec<String>) -> TransformerInitializer {
        let name = name.to_string();
        Box::new(move |deps: &TransformerDeps| {
            let transformer: Arc<dyn Transformer> = Arc::new(EventTransformer::new(
                &name,
                filters.clone(),
                WatchedEventRecorder::new(&name),
                deps,
            ));
            transformer
        })
    }
}

fn topic_value(event: &WatchedEvent, i: usize) -> DbValue {
    DbValue::opt_bytes32(event.topics[i].map(|t| t.0))
}

impl EventConverter for WatchedEventRecorder {
    type Entity = WatchedEvent;

    fn to_entity(&self, event: &WatchedEvent) -> Result<WatchedEvent, TransformationError> {
        if event.log_id <= 0 {
            return Err(TransformationError::handler(
                &self.transformer,
                format!("watched event without log id in tx {:#x}", event.tx_hash),
            ));
        }
        Ok(event.clone())
    }

    fn to_operation(&self, _event: &WatchedEvent, entity: WatchedEvent) -> DbOperation {
        DbOperation::insert_ignore(
            WATCHED_EVENT_RECORDS_TABLE,
            &[
                "transformer",
                "filter_name",
                "log_id",
                "block_number",
                "address",
                "tx_hash",
                "log_index",
                "topic0",
                "topic1",
                "topic2",
                "topic3",
                "data",
            ],
            vec![
                DbValue::Text(self.transformer.clone()),
                DbValue::Text(entity.name.clone()),
                DbValue::Int64(entity.log_id),
                DbValue::Int64(entity.block_number),
                DbValue::Address(entity.address.into_array()),
                DbValue::Bytes32(entity.tx_hash.0),
                DbValue::Int64(entity.index),
                topic_value(&entity, 0),
                topic_value(&entity, 1),
                topic_value(&entity, 2),
                topic_value(&entity, 3),
                DbValue::Bytes(entity.data.to_vec()),
            ],
            &["transformer", "filter_name", "log_id"],
        )
    }
}

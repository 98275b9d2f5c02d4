//! Task orchestration pipeline: typed task definitions, the queue
//! abstraction, the dispatcher that serializes tasks onto it, the consumer
//! that routes queued tasks to executors, and the executors themselves.

pub mod chunk;
pub mod collaborators;
pub mod consumer;
pub mod definitions;
pub mod dispatcher;
pub mod envelope;
pub mod executors;
pub mod queue;
pub mod triggers;

pub use chunk::chunk_payload;
pub use collaborators::{
    AbsentAttachmentParameters, AckTemplateParameters, DocumentPartParameters, DocumentPayload,
    DocumentReference, InMemoryObjectStore, ObjectStore, PayloadTemplate, RecordClient,
    StructuredRecord, TemplateRenderer, TransportClient, TransportCorrelation,
};
pub use consumer::{TaskConsumer, TaskExecutors};
pub use definitions::{
    AckType, GetDocumentTask, GetStructuredRecordTask, SendAbsentAttachmentTask,
    SendAcknowledgementTask, SendCoreTask, SendDocumentTask, TaskDefinition, TaskType,
};
pub use dispatcher::TaskDispatcher;
pub use executors::{document_object, structured_record_object};
pub use envelope::{Attachment, AttachmentDescription, ExternalAttachment, OutboundEnvelope};
pub use queue::{InMemoryQueue, MessageQueue, QueueError, ReceivedMessage};
pub use triggers::CompletionTriggers;

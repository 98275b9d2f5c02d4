//! HTTP-backed implementations of the pipeline's outbound collaborators.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde_json::json;

use ehrflow_core::{CoreError, Result};
use ehrflow_tasks::{
    DocumentPayload, GetDocumentTask, GetStructuredRecordTask, RecordClient, StructuredRecord,
    TransportClient, TransportCorrelation,
};

fn classify_transport(err: reqwest::Error) -> CoreError {
    if err.is_connect() || err.is_timeout() {
        CoreError::TransportConnection(err.to_string())
    } else {
        CoreError::TransportServer(err.to_string())
    }
}

/// Outbound messaging transport client.
pub struct MhsTransportClient {
    http: reqwest::Client,
    base_url: String,
}

impl MhsTransportClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TransportClient for MhsTransportClient {
    async fn send_to_transport(
        &self,
        payload: &str,
        correlation: &TransportCorrelation,
    ) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/mhs-outbound", self.base_url))
            .header("Correlation-Id", &correlation.conversation_id)
            .header("Message-Id", &correlation.message_id)
            .header("Ods-Code", &correlation.from_ods_code)
            .header("Content-Type", "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(CoreError::TransportServer(format!(
                "transport responded with {status}"
            )))
        }
    }
}

/// Clinical-record provider client.
pub struct GpcRecordClient {
    http: reqwest::Client,
    base_url: String,
}

impl GpcRecordClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RecordClient for GpcRecordClient {
    async fn fetch_structured_record(
        &self,
        task: &GetStructuredRecordTask,
    ) -> Result<StructuredRecord> {
        let response = self
            .http
            .post(format!("{}/structured-record", self.base_url))
            .json(&json!({
                "nhsNumber": task.nhs_number,
                "conversationId": task.conversation_id,
                "fromOdsCode": task.from_ods_code,
            }))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CoreError::not_found("Patient", &task.nhs_number));
        }
        if !status.is_success() {
            // A provider failure means the extract cannot be generated.
            return Err(CoreError::invalid_argument(format!(
                "record provider responded with {status}"
            )));
        }

        response
            .json::<StructuredRecord>()
            .await
            .map_err(|err| CoreError::invalid_argument(format!("invalid record body: {err}")))
    }

    async fn fetch_document(&self, task: &GetDocumentTask) -> Result<DocumentPayload> {
        let response = self
            .http
            .get(&task.access_url)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CoreError::not_found("Document", &task.document_id));
        }
        if !status.is_success() {
            return Err(CoreError::invalid_argument(format!(
                "document provider responded with {status}"
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| CoreError::invalid_argument(format!("invalid document body: {err}")))?;

        Ok(DocumentPayload {
            content_type,
            base64_content: BASE64.encode(&bytes),
        })
    }
}

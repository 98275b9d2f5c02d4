//! Payload templates for the messages the pipeline generates itself: the
//! application acknowledgement, the absent-attachment placeholder and the
//! chunk wrapper for oversized attachments.

use ehrflow_core::Result;
use ehrflow_tasks::{PayloadTemplate, TemplateRenderer};

#[derive(Debug, Default, Clone, Copy)]
pub struct XmlTemplateRenderer;

impl XmlTemplateRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for XmlTemplateRenderer {
    fn render(&self, template: &PayloadTemplate) -> Result<String> {
        let rendered = match template {
            PayloadTemplate::Acknowledgement(p) => {
                let detail = match (&p.reason_code, &p.detail) {
                    (Some(code), detail) => format!(
                        concat!(
                            "<acknowledgementDetail typeCode=\"ER\">",
                            "<code code=\"{}\" displayName=\"{}\"/>",
                            "</acknowledgementDetail>"
                        ),
                        code,
                        detail.as_deref().unwrap_or_default()
                    ),
                    (None, _) => String::new(),
                };
                format!(
                    concat!(
                        "<MCCI_IN010000UK13>",
                        "<id root=\"{message_id}\"/>",
                        "<acknowledgement typeCode=\"{type_code}\">",
                        "{detail}",
                        "<messageRef><id root=\"{message_ref}\"/></messageRef>",
                        "</acknowledgement>",
                        "<communicationFunctionRcv><device><id extension=\"{to_asid}\"/></device></communicationFunctionRcv>",
                        "<communicationFunctionSnd><device><id extension=\"{from_asid}\"/></device></communicationFunctionSnd>",
                        "</MCCI_IN010000UK13>"
                    ),
                    message_id = p.message_id,
                    type_code = p.type_code,
                    detail = detail,
                    message_ref = p.message_ref,
                    to_asid = p.to_asid,
                    from_asid = p.from_asid,
                )
            }
            PayloadTemplate::AbsentAttachment(p) => format!(
                "The document could not be retrieved. DocumentId: {}. Reason: {}",
                p.document_id, p.reason
            ),
            PayloadTemplate::DocumentPart(p) => format!(
                concat!(
                    "<COPC_IN000001UK01>",
                    "<id root=\"{message_id}\"/>",
                    "<attachment filename=\"{filename}\">{content}</attachment>",
                    "</COPC_IN000001UK01>"
                ),
                message_id = p.message_id,
                filename = p.filename,
                content = p.content,
            ),
        };
        Ok(rendered)
    }
}

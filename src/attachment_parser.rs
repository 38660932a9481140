use anyhow::Result;
use log::{debug, info, warn};
use mail_parser::{MessageParser, MimeHeaders};

#[derive(Debug)]
pub struct PdfAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

pub struct AttachmentParser;

impl AttachmentParser {
    /// Extracts the PDF attachments from a raw RFC822 message. Attachments
    /// without a filename, or whose filename is not .pdf, are skipped.
    pub fn parse_email(raw_email: &[u8]) -> Result<Vec<PdfAttachment>> {
        debug!("Parsing email of {} bytes for attachments", raw_email.len());

        let Some(message) = MessageParser::default().parse(raw_email) else {
            warn!("⚠️ Unable to parse the email, treating it as attachment-free");
            return Ok(Vec::new());
        };

        let mut attachments = Vec::new();

        for (i, part) in message.attachments().enumerate() {
            let Some(filename) = part.attachment_name() else {
                debug!("Attachment {} has no filename, skipping", i);
                continue;
            };

            if !Self::is_pdf_file(filename) {
                debug!("Attachment {} ({}) is not a PDF, skipping", i, filename);
                continue;
            }

            let contents = part.contents();
            if contents.is_empty() {
                debug!("Attachment {} ({}) is empty, skipping", i, filename);
                continue;
            }

            debug!("Attachment {}: {} ({} bytes)", i, filename, contents.len());

            attachments.push(PdfAttachment {
                filename: filename.to_string(),
                content: contents.to_vec(),
            });
        }

        info!("📎 Found {} PDF attachment(s)", attachments.len());
        Ok(attachments)
    }

    fn is_pdf_file(filename: &str) -> bool {
        filename.to_lowercase().ends_with(".pdf")
    }
}

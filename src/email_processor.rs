use std::io::Write;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tempfile::NamedTempFile;

use crate::attachment_parser::{AttachmentParser, PdfAttachment};
use crate::config::Config;
use crate::imap_client::ImapClient;
use crate::payslip_extractor::PayslipExtractor;
use crate::pdf_extractor::PdfTextExtractor;
use crate::sheets_client::SheetsClient;

pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_NO_VALUES: &str = "Error: could not extract values";
pub const STATUS_NO_TEXT: &str = "Error: could not extract text from PDF";
pub const STATUS_SINK_FAILED: &str = "Error: could not append to sheet";

/// Status pair for one processed message. Both labels describe the last
/// attachment processed; a message with no PDF attachment leaves both unset.
#[derive(Debug, Default)]
pub struct ProcessingOutcome {
    pub attachments: usize,
    pub extraction_status: Option<String>,
    pub sink_status: Option<String>,
}

impl ProcessingOutcome {
    pub fn extraction_succeeded(&self) -> bool {
        self.extraction_status.as_deref() == Some(STATUS_SUCCESS)
    }

    pub fn sink_succeeded(&self) -> bool {
        self.sink_status.as_deref() == Some(STATUS_SUCCESS)
    }
}

pub struct PayslipProcessor {
    pdf_password: String,
    extractor: PayslipExtractor,
    sheets: Option<SheetsClient>,
    dry_run: bool,
}

impl PayslipProcessor {
    pub async fn new(config: &Config, dry_run: bool) -> Self {
        let extractor = PayslipExtractor::new(&config.extraction.api_key);

        if dry_run {
            info!("🧪 Initializing the payslip processor in dry-run mode (no spreadsheet writes)");
            return PayslipProcessor {
                pdf_password: config.pdf_password.clone(),
                extractor,
                sheets: None,
                dry_run,
            };
        }

        let sheets = if config.sheets.spreadsheet_url.is_empty() {
            warn!("⚠️ SPREADSHEET_URL is not set, extracted rows will not be appended");
            None
        } else {
            match SheetsClient::new(&config.sheets).await {
                Ok(client) => Some(client),
                Err(e) => {
                    error!("❌ Unable to initialize the Sheets client: {}", e);
                    None
                }
            }
        };

        PayslipProcessor {
            pdf_password: config.pdf_password.clone(),
            extractor,
            sheets,
            dry_run,
        }
    }

    /// Runs the whole pipeline for one message. Attachment, extraction and
    /// sink failures land in the returned statuses; only fetch-level
    /// failures surface as an error, and the caller still marks the
    /// message as processed either way.
    pub async fn process_message(
        &self,
        imap_client: &mut ImapClient,
        message_id: u32,
    ) -> Result<ProcessingOutcome> {
        debug!("Processing email ID: {}", message_id);

        // 1. Fetch the whole message in a single call
        let email = imap_client
            .fetch_email(message_id)
            .await
            .context("Unable to fetch the email")?;

        let email_date = email.date.format("%d/%m/%Y %H:%M:%S").to_string();
        let id_str = message_id.to_string();

        // 2. Extract the PDF attachments
        let attachments = AttachmentParser::parse_email(&email.content)
            .context("Error extracting attachments")?;

        let mut outcome = ProcessingOutcome {
            attachments: attachments.len(),
            ..ProcessingOutcome::default()
        };

        if attachments.is_empty() {
            warn!("No PDF attachment in email {}", message_id);
            return Ok(outcome);
        }

        // 3. Each attachment appends its own row; the reported status pair
        //    is the last attachment's
        for attachment in &attachments {
            let (extraction_status, sink_status) =
                self.process_attachment(attachment, &id_str, &email_date).await;

            info!("📎 '{}': {}", attachment.filename, extraction_status);

            outcome.extraction_status = Some(extraction_status);
            outcome.sink_status = sink_status;
        }

        Ok(outcome)
    }

    async fn process_attachment(
        &self,
        attachment: &PdfAttachment,
        message_id: &str,
        email_date: &str,
    ) -> (String, Option<String>) {
        debug!("Processing attachment: {}", attachment.filename);

        // 1. Persist the payload to a transient file, removed on drop
        let temp_file = match self.write_temp_pdf(&attachment.content) {
            Ok(file) => file,
            Err(e) => {
                error!(
                    "❌ Unable to stage '{}' in a temporary file: {}",
                    attachment.filename, e
                );
                return (STATUS_NO_TEXT.to_string(), None);
            }
        };

        // 2. Decrypt the PDF and pull the text out of it
        let text = match PdfTextExtractor::extract_text(temp_file.path(), &self.pdf_password) {
            Ok(text) => text,
            Err(e) => {
                error!(
                    "❌ Unable to extract text from '{}': {}",
                    attachment.filename, e
                );
                return (STATUS_NO_TEXT.to_string(), None);
            }
        };

        debug!(
            "Extracted {} characters of text from '{}'",
            text.len(),
            attachment.filename
        );

        // 3. Turn the text into named pay fields. An empty record still
        //    lands as a row of blanks so a reviewer can see the gap.
        let record = self.extractor.extract(&text).await;
        let extraction_status = if record.is_empty() {
            STATUS_NO_VALUES
        } else {
            STATUS_SUCCESS
        };

        // 4. Append the row
        let row = record.to_row(message_id, email_date);
        let sink_status = self.append_record(&row).await;

        (extraction_status.to_string(), Some(sink_status))
    }

    async fn append_record(&self, row: &[String]) -> String {
        if self.dry_run {
            info!("🧪 Dry-run: row not appended: {:?}", row);
            return STATUS_SUCCESS.to_string();
        }

        let Some(sheets) = &self.sheets else {
            error!("❌ No spreadsheet configured, row dropped: {:?}", row);
            return STATUS_SINK_FAILED.to_string();
        };

        match sheets.append_row(row).await {
            Ok(()) => STATUS_SUCCESS.to_string(),
            Err(e) => {
                error!("❌ Unable to append the row to the sheet: {}", e);
                STATUS_SINK_FAILED.to_string()
            }
        }
    }

    fn write_temp_pdf(&self, content: &[u8]) -> Result<NamedTempFile> {
        let mut temp_file = tempfile::Builder::new()
            .prefix("payslip-")
            .suffix(".pdf")
            .tempfile()
            .context("Unable to create a temporary file")?;

        temp_file
            .write_all(content)
            .context("Unable to write the PDF payload")?;
        temp_file.flush().context("Unable to flush the PDF payload")?;

        Ok(temp_file)
    }
}

use log::{debug, warn};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unable to read PDF: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to open PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("PDF is encrypted and no passphrase variant unlocked it")]
    Undecryptable,

    #[error("no extractable text in PDF")]
    NoText,
}

/// Extracts plain text from a payslip PDF, decrypting it first when the
/// document reports itself encrypted.
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn extract_text(path: &Path, passphrase: &str) -> Result<String, ExtractionError> {
        debug!("Opening PDF {:?}", path);
        let bytes = std::fs::read(path)?;
        Self::extract_text_from_bytes(&bytes, passphrase)
    }

    pub fn extract_text_from_bytes(
        bytes: &[u8],
        passphrase: &str,
    ) -> Result<String, ExtractionError> {
        let doc = lopdf::Document::load_mem(bytes)?;
        let doc = if doc.is_encrypted() {
            Self::decrypt(bytes, passphrase)?
        } else {
            doc
        };
        Self::extract_from_document(&doc)
    }

    fn extract_from_document(doc: &lopdf::Document) -> Result<String, ExtractionError> {
        let mut pages_text = Vec::new();
        for (page_num, _) in doc.get_pages() {
            match doc.extract_text(&[page_num]) {
                Ok(text) => {
                    if text.trim().is_empty() {
                        debug!("Page {} has no extractable text, skipping", page_num);
                    } else {
                        pages_text.push(text.trim_end().to_string());
                    }
                }
                Err(e) => {
                    debug!("Text extraction failed on page {}: {}", page_num, e);
                }
            }
        }

        if pages_text.is_empty() {
            return Err(ExtractionError::NoText);
        }

        Ok(pages_text.join("\n"))
    }

    /// A document loaded without its passphrase keeps its objects encrypted,
    /// so it has to be re-read with the passphrase supplied up front. Tries
    /// every known encoding, stopping at the first one the document accepts.
    fn decrypt(bytes: &[u8], passphrase: &str) -> Result<lopdf::Document, ExtractionError> {
        for candidate in Self::passphrase_candidates(passphrase) {
            match lopdf::Document::load_mem_with_password(bytes, &candidate) {
                Ok(doc) => {
                    debug!("PDF decrypted");
                    return Ok(doc);
                }
                Err(e) => {
                    debug!("Decryption attempt rejected: {}", e);
                }
            }
        }

        warn!("⚠️ PDF is encrypted and none of the passphrase variants unlocked it");
        Err(ExtractionError::Undecryptable)
    }

    /// Encodings tried against an encrypted document, in order: the
    /// passphrase as configured, its trimmed form, and the decimal rendering
    /// of its integer value when it parses as one.
    pub fn passphrase_candidates(passphrase: &str) -> Vec<String> {
        let mut candidates = vec![passphrase.to_string()];

        let trimmed = passphrase.trim();
        if trimmed != passphrase {
            candidates.push(trimmed.to_string());
        }

        if let Ok(numeric) = trimmed.parse::<u64>() {
            let rendered = numeric.to_string();
            if !candidates.contains(&rendered) {
                candidates.push(rendered);
            }
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{
        dictionary, Document, EncryptionState, EncryptionVersion, Object, Permissions, Stream,
        StringFormat,
    };

    fn payslip_document(text: &str) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();
        let resources_id = doc.new_object_id();
        let content_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        doc.objects.insert(
            font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Courier",
            }),
        );

        doc.objects.insert(
            resources_id,
            Object::Dictionary(dictionary! {
                "Font" => dictionary! {
                    "F1" => font_id,
                },
            }),
        );

        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
        doc.objects.insert(
            content_id,
            Object::Stream(Stream::new(dictionary! {}, content.into_bytes())),
        );

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }),
        );

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        doc
    }

    fn pdf_with_text(text: &str) -> Vec<u8> {
        let mut doc = payslip_document(text);

        let mut pdf_bytes = Vec::new();
        doc.save_to(&mut pdf_bytes).unwrap();
        pdf_bytes
    }

    fn encrypted_pdf_with_text(text: &str, passphrase: &str) -> Vec<u8> {
        let mut doc = payslip_document(text);

        // The standard security handler mixes the file ID into the key
        doc.trailer.set(
            "ID",
            Object::Array(vec![
                Object::String(b"payslipfixture01".to_vec(), StringFormat::Literal),
                Object::String(b"payslipfixture01".to_vec(), StringFormat::Literal),
            ]),
        );

        let state = EncryptionState::try_from(EncryptionVersion::V2 {
            document: &doc,
            owner_password: passphrase,
            user_password: passphrase,
            key_length: 128,
            permissions: Permissions::all(),
        })
        .unwrap();
        doc.encrypt(&state).unwrap();

        let mut pdf_bytes = Vec::new();
        doc.save_to(&mut pdf_bytes).unwrap();
        pdf_bytes
    }

    fn pdf_without_pages() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut pdf_bytes = Vec::new();
        doc.save_to(&mut pdf_bytes).unwrap();
        pdf_bytes
    }

    #[test]
    fn test_extract_text_from_plain_pdf() {
        let bytes = pdf_with_text("Gross Pay 2000.00");
        let text = PdfTextExtractor::extract_text_from_bytes(&bytes, "1146").unwrap();
        assert!(text.contains("Gross Pay 2000.00"), "got: {}", text);
    }

    #[test]
    fn test_encrypted_pdf_decrypts_with_the_exact_passphrase() {
        let bytes = encrypted_pdf_with_text("Gross Pay 2000.00", "1146");
        let text = PdfTextExtractor::extract_text_from_bytes(&bytes, "1146").unwrap();
        assert!(text.contains("Gross Pay 2000.00"), "got: {}", text);
    }

    #[test]
    fn test_encrypted_pdf_decrypts_with_a_padded_passphrase() {
        // The raw form is rejected, the trimmed candidate unlocks it
        let bytes = encrypted_pdf_with_text("Net Pay 1800.00", "1146");
        let text = PdfTextExtractor::extract_text_from_bytes(&bytes, " 1146\n").unwrap();
        assert!(text.contains("Net Pay 1800.00"), "got: {}", text);
    }

    #[test]
    fn test_encrypted_pdf_decrypts_with_the_integer_rendering() {
        // "01146" only matches once rendered as its integer value
        let bytes = encrypted_pdf_with_text("Tax Credit 150.00", "1146");
        let text = PdfTextExtractor::extract_text_from_bytes(&bytes, "01146").unwrap();
        assert!(text.contains("Tax Credit 150.00"), "got: {}", text);
    }

    #[test]
    fn test_encrypted_pdf_with_wrong_passphrase_is_undecryptable() {
        let bytes = encrypted_pdf_with_text("Gross Pay 2000.00", "1146");
        let result = PdfTextExtractor::extract_text_from_bytes(&bytes, "9999");
        assert!(matches!(result, Err(ExtractionError::Undecryptable)));
    }

    #[test]
    fn test_garbage_bytes_are_a_pdf_error() {
        let result = PdfTextExtractor::extract_text_from_bytes(b"not a pdf", "1146");
        assert!(matches!(result, Err(ExtractionError::Pdf(_))));
    }

    #[test]
    fn test_document_without_pages_has_no_text() {
        let bytes = pdf_without_pages();
        let result = PdfTextExtractor::extract_text_from_bytes(&bytes, "1146");
        assert!(matches!(result, Err(ExtractionError::NoText)));
    }

    #[test]
    fn test_passphrase_candidates_for_plain_number() {
        // "1146" as string, integer and bytes all collapse to one candidate
        let candidates = PdfTextExtractor::passphrase_candidates("1146");
        assert_eq!(candidates, vec!["1146"]);
    }

    #[test]
    fn test_passphrase_candidates_trim_whitespace() {
        let candidates = PdfTextExtractor::passphrase_candidates(" 1146\n");
        assert_eq!(candidates[0], " 1146\n");
        assert!(candidates.contains(&"1146".to_string()));
    }

    #[test]
    fn test_passphrase_candidates_integer_rendering() {
        // A leading zero disappears in the integer form, giving a second try
        let candidates = PdfTextExtractor::passphrase_candidates("01146");
        assert_eq!(candidates, vec!["01146", "1146"]);
    }

    #[test]
    fn test_passphrase_candidates_non_numeric() {
        let candidates = PdfTextExtractor::passphrase_candidates("hunter2");
        assert_eq!(candidates, vec!["hunter2"]);
    }
}

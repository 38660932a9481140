// Library exports for the payslip-finder crate
// This allows tests and other crates to use the modules

pub mod attachment_parser;
pub mod config;
pub mod email_processor;
pub mod imap_client;
pub mod ledger;
pub mod payslip_extractor;
pub mod pdf_extractor;
pub mod scheduler;
pub mod sheets_client;

use anyhow::{Context, Result};
use google_sheets4::{hyper, hyper_rustls, oauth2, Sheets};
use log::{debug, info};
use regex::Regex;

use crate::config::SheetsConfig;

pub struct SheetsClient {
    hub: Sheets<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>,
    spreadsheet_id: String,
    worksheet: String,
}

impl SheetsClient {
    pub async fn new(config: &SheetsConfig) -> Result<Self> {
        info!("Connecting to Google Sheets API via service account");

        let spreadsheet_id = Self::spreadsheet_id_from_url(&config.spreadsheet_url)?;

        let key = oauth2::read_service_account_key(&config.credentials_path)
            .await
            .context("Unable to read the service account key file")?;

        let auth = oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .context("Unable to create the service account authenticator")?;

        // Create HTTP client
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();

        let client = hyper::Client::builder().build(connector);

        let hub = Sheets::new(client, auth);

        info!("✅ Google Sheets API connection established successfully");

        Ok(SheetsClient {
            hub,
            spreadsheet_id,
            worksheet: config.worksheet.clone(),
        })
    }

    /// Appends one row after the last non-empty row of the worksheet.
    pub async fn append_row(&self, row: &[String]) -> Result<()> {
        debug!(
            "Appending a row of {} value(s) to worksheet '{}'",
            row.len(),
            self.worksheet
        );

        let mut value_range = google_sheets4::api::ValueRange::default();
        value_range.values = Some(vec![row
            .iter()
            .map(|cell| serde_json::Value::String(cell.clone()))
            .collect()]);

        let range = format!("'{}'!A1", self.worksheet);

        self.hub
            .spreadsheets()
            .values_append(value_range, &self.spreadsheet_id, &range)
            .value_input_option("USER_ENTERED")
            .insert_data_option("INSERT_ROWS")
            .add_scope(google_sheets4::api::Scope::Spreadsheet)
            .doit()
            .await
            .context("Unable to append the row to the sheet")?;

        info!("📊 Row appended to worksheet '{}'", self.worksheet);

        Ok(())
    }

    /// Pulls the document id out of a sharing URL such as
    /// `https://docs.google.com/spreadsheets/d/<id>/edit#gid=0`.
    pub fn spreadsheet_id_from_url(url: &str) -> Result<String> {
        let re = Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)")?;
        let id = re
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .with_context(|| format!("'{}' is not a spreadsheet URL", url))?;

        Ok(id)
    }
}

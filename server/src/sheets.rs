//! Spreadsheet sync adapter: translates orders to and from the rectangular
//! row representation and talks to the Google Sheets v4 values endpoints.
//!
//! Row updates are positionally addressed; the caller supplies the row
//! index and rows drift if the sheet is reordered out-of-band. Rows are
//! never deleted here: a primary delete leaves its mirrored row behind.

use std::{fs, io, path::Path};

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use orders::{
    model::{JobOrder, OrderKind, RepairOrder},
    rows,
};

pub const BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const CONFIG_FILE: &str = "sheets-config.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub api_key: String,
    pub repair_range: String,
    pub job_range: String,
}

impl SheetsConfig {
    /// A complete, non-empty config is what makes the adapter configured.
    pub fn is_complete(&self) -> bool {
        ![
            &self.spreadsheet_id,
            &self.api_key,
            &self.repair_range,
            &self.job_range,
        ]
        .iter()
        .any(|value| value.trim().is_empty())
    }

    fn range(&self, kind: OrderKind) -> &str {
        match kind {
            OrderKind::Repair => &self.repair_range,
            OrderKind::Job => &self.job_range,
        }
    }
}

#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("sheets request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sheets api error ({status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Clone)]
pub struct SheetsClient {
    http: Client,
    base_url: String,
    config: SheetsConfig,
}

impl SheetsClient {
    pub fn new(config: SheetsConfig) -> Self {
        Self::with_base_url(config, BASE_URL.to_string())
    }

    pub fn with_base_url(config: SheetsConfig, base_url: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            config,
        }
    }

    pub fn config(&self) -> &SheetsConfig {
        &self.config
    }

    pub async fn read_rows(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = format!(
            "{}/{}/values/{range}?key={}",
            self.base_url, self.config.spreadsheet_id, self.config.api_key
        );

        let response = check(self.http.get(&url).send().await?).await?;
        Ok(response.json::<ValueRange>().await?.values)
    }

    async fn append_row(&self, range: &str, row: Vec<String>) -> Result<(), SheetsError> {
        let url = format!(
            "{}/{}/values/{range}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS&key={}",
            self.base_url, self.config.spreadsheet_id, self.config.api_key
        );

        check(
            self.http
                .post(&url)
                .json(&serde_json::json!({ "values": [row] }))
                .send()
                .await?,
        )
        .await?;

        Ok(())
    }

    async fn update_row(&self, range: &str, row: Vec<String>) -> Result<(), SheetsError> {
        let url = format!(
            "{}/{}/values/{range}?valueInputOption=RAW&key={}",
            self.base_url, self.config.spreadsheet_id, self.config.api_key
        );

        check(
            self.http
                .put(&url)
                .json(&serde_json::json!({ "values": [row] }))
                .send()
                .await?,
        )
        .await?;

        Ok(())
    }

    pub async fn load_repairs(&self) -> Result<Vec<RepairOrder>, SheetsError> {
        let rows = self.read_rows(self.config.range(OrderKind::Repair)).await?;
        Ok(rows::parse_repairs(&rows))
    }

    pub async fn load_jobs(&self) -> Result<Vec<JobOrder>, SheetsError> {
        let rows = self.read_rows(self.config.range(OrderKind::Job)).await?;
        Ok(rows::parse_jobs(&rows))
    }

    pub async fn append_repair(&self, order: &RepairOrder) -> Result<(), SheetsError> {
        self.append_row(self.config.range(OrderKind::Repair), rows::repair_to_row(order))
            .await
    }

    pub async fn append_job(&self, order: &JobOrder) -> Result<(), SheetsError> {
        self.append_row(self.config.range(OrderKind::Job), rows::job_to_row(order))
            .await
    }

    pub async fn update_repair(
        &self,
        order: &RepairOrder,
        row_index: usize,
    ) -> Result<(), SheetsError> {
        let range = row_range(
            self.config.range(OrderKind::Repair),
            row_index,
            rows::REPAIR_COLUMNS,
        );
        self.update_row(&range, rows::repair_to_row(order)).await
    }

    pub async fn update_job(&self, order: &JobOrder, row_index: usize) -> Result<(), SheetsError> {
        let range = row_range(
            self.config.range(OrderKind::Job),
            row_index,
            rows::JOB_COLUMNS,
        );
        self.update_row(&range, rows::job_to_row(order)).await
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let message = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .and_then(|error| error.message)
        .unwrap_or_else(|| "Unknown error".to_string());

    Err(SheetsError::Api { status, message })
}

/// Exact range for one data row: row 0 lives on sheet row 2 because row 1
/// holds the header and sheet rows are 1-based.
fn row_range(range: &str, row_index: usize, columns: usize) -> String {
    let sheet = range.split('!').next().unwrap_or(range);
    let row = row_index + 2;
    let last_column = (b'A' + columns as u8 - 1) as char;

    format!("{sheet}!A{row}:{last_column}{row}")
}

pub fn load_persisted(data_dir: &Path) -> Option<SheetsConfig> {
    let raw = fs::read_to_string(data_dir.join(CONFIG_FILE)).ok()?;

    match serde_json::from_str::<SheetsConfig>(&raw) {
        Ok(config) if config.is_complete() => Some(config),
        Ok(_) => {
            warn!("Ignoring incomplete persisted spreadsheet config");
            None
        }
        Err(e) => {
            warn!("Ignoring unreadable spreadsheet config: {e}");
            None
        }
    }
}

pub fn persist(data_dir: &Path, config: &SheetsConfig) -> io::Result<()> {
    fs::create_dir_all(data_dir)?;
    let raw = serde_json::to_string_pretty(config).map_err(io::Error::other)?;
    fs::write(data_dir.join(CONFIG_FILE), raw)
}

pub fn clear_persisted(data_dir: &Path) -> io::Result<()> {
    match fs::remove_file(data_dir.join(CONFIG_FILE)) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Pulls the spreadsheet id out of a pasted Google Sheets URL.
pub fn extract_spreadsheet_id(url: &str) -> Option<String> {
    let pattern = Regex::new(r"/spreadsheets/d/([a-zA-Z0-9-_]+)").unwrap();

    pattern.captures(url).map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use orders::model::next_order_id;

    use super::{SheetsConfig, clear_persisted, extract_spreadsheet_id, load_persisted, persist,
        row_range};

    fn config() -> SheetsConfig {
        SheetsConfig {
            spreadsheet_id: "sheet-123".to_string(),
            api_key: "key-456".to_string(),
            repair_range: "Repairs!A:H".to_string(),
            job_range: "Jobs!A:I".to_string(),
        }
    }

    #[test]
    fn row_ranges_skip_the_header() {
        assert_eq!(row_range("Repairs!A:H", 0, 8), "Repairs!A2:H2");
        assert_eq!(row_range("Jobs!A:I", 3, 9), "Jobs!A5:I5");
    }

    #[test]
    fn blank_fields_make_a_config_incomplete() {
        assert!(config().is_complete());

        let mut incomplete = config();
        incomplete.api_key = "   ".to_string();
        assert!(!incomplete.is_complete());
    }

    #[test]
    fn spreadsheet_ids_are_extracted_from_urls() {
        let url = "https://docs.google.com/spreadsheets/d/1AbC-d_9/edit#gid=0";

        assert_eq!(extract_spreadsheet_id(url), Some("1AbC-d_9".to_string()));
        assert_eq!(extract_spreadsheet_id("https://example.com"), None);
    }

    #[test]
    fn persisted_config_round_trips() {
        let dir = std::env::temp_dir().join(next_order_id("bagcraft-sheets-test"));

        assert!(load_persisted(&dir).is_none());
        persist(&dir, &config()).unwrap();
        assert_eq!(load_persisted(&dir), Some(config()));

        clear_persisted(&dir).unwrap();
        clear_persisted(&dir).unwrap();
        assert!(load_persisted(&dir).is_none());
    }
}

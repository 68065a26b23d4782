//! [`SheetSource`] implementation over the Sheets REST API.

use super::client::GoogleSheetsClient;
use super::types::{BatchUpdateValuesRequest, Spreadsheet, ValueRange, ValueRangeBody};
use crate::a1::{CellRef, RangeRef};
use crate::SheetSource;
use async_trait::async_trait;
use reqwest::Method;
use sheetstock_core::{CellEdit, Grid, StockResult, TabInfo, TableUpdate};

const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

/// Request body for a batch of single-cell edits.
pub fn cell_edits_body(tab: &str, edits: &[CellEdit]) -> BatchUpdateValuesRequest {
    BatchUpdateValuesRequest {
        value_input_option: VALUE_INPUT_OPTION.to_string(),
        data: edits
            .iter()
            .map(|edit| ValueRangeBody {
                range: RangeRef::cell(tab, edit.row, edit.col).to_string(),
                values: vec![vec![edit.value.clone()]],
            })
            .collect(),
    }
}

#[async_trait]
impl SheetSource for GoogleSheetsClient {
    async fn fetch_range(&self, table: &str, range: &str) -> StockResult<Grid> {
        let url = self.url(&[table, "values", range])?;
        let response: ValueRange = self.get(url).await?;
        Ok(response.into_grid())
    }

    async fn write_cells(&self, table: &str, tab: &str, update: &TableUpdate) -> StockResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        match update {
            TableUpdate::CellEdits(edits) => {
                let url = self.url(&[table, "values:batchUpdate"])?;
                let body = cell_edits_body(tab, edits);
                let _: serde_json::Value = self.send(Method::POST, url, &body).await?;
            }
            TableUpdate::FullTableReplace { values, start_row } => {
                let start = start_row.unwrap_or(0);

                let clear_range = RangeRef::from_row(tab, start).to_string();
                let url = self.url(&[table, "values", &format!("{clear_range}:clear")])?;
                let _: serde_json::Value =
                    self.send(Method::POST, url, &serde_json::json!({})).await?;

                let anchor = RangeRef {
                    tab: tab.to_string(),
                    start: Some(CellRef::at(start, 0)),
                    end: None,
                }
                .to_string();
                let mut url = self.url(&[table, "values", &anchor])?;
                url.query_pairs_mut()
                    .append_pair("valueInputOption", VALUE_INPUT_OPTION);
                let body = ValueRangeBody {
                    range: anchor,
                    values: values.clone(),
                };
                let _: serde_json::Value = self.send(Method::PUT, url, &body).await?;
            }
        }

        tracing::info!(table, tab, cells = update.cell_count(), "Wrote cells");
        Ok(())
    }

    async fn list_tabs(&self, table: &str) -> StockResult<Vec<TabInfo>> {
        let mut url = self.url(&[table])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let spreadsheet: Spreadsheet = self.get(url).await?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|sheet| TabInfo::new(sheet.properties.title, sheet.properties.sheet_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::google::types::cell_to_string;
    use serde_json::json;

    #[test]
    fn test_cell_edits_body() {
        let body = cell_edits_body(
            "Pack List",
            &[CellEdit::new(0, 0, "CASE-1"), CellEdit::new(4, 27, "3")],
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["valueInputOption"], "USER_ENTERED");
        assert_eq!(json["data"][0]["range"], "'Pack List'!A1");
        assert_eq!(json["data"][1]["range"], "'Pack List'!AB5");
        assert_eq!(json["data"][1]["values"], json!([["3"]]));
    }

    #[test]
    fn test_value_range_into_grid() {
        let response: ValueRange = serde_json::from_value(json!({
            "range": "CASE!A1:C2",
            "majorDimension": "ROWS",
            "values": [["ITEM#", "QTY", "OK"], ["CASE-1", 4, true]]
        }))
        .unwrap();
        assert_eq!(
            response.into_grid(),
            vec![
                vec!["ITEM#".to_string(), "QTY".to_string(), "OK".to_string()],
                vec!["CASE-1".to_string(), "4".to_string(), "TRUE".to_string()],
            ]
        );
    }

    #[test]
    fn test_empty_value_range() {
        let response: ValueRange = serde_json::from_value(json!({"range": "CASE!A1:C2"})).unwrap();
        assert!(response.into_grid().is_empty());
        assert_eq!(cell_to_string(json!(null)), "");
    }

    #[test]
    fn test_spreadsheet_properties_parse() {
        let sheet: Spreadsheet = serde_json::from_value(json!({
            "sheets": [{"properties": {"sheetId": 0, "title": "CASE", "index": 0}},
                       {"properties": {"sheetId": 981, "title": "LIGHT", "index": 1}}]
        }))
        .unwrap();
        assert_eq!(sheet.sheets[1].properties.sheet_id, 981);
        assert_eq!(sheet.sheets[0].properties.title, "CASE");
    }
}

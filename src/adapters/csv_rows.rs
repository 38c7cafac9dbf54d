use crate::domain::model::ContactRow;
use crate::utils::error::{EtlError, Result};

/// 由第一行判斷分隔符號：法文匯出常用 `;`
pub fn sniff_delimiter(content: &[u8]) -> u8 {
    let first_line = content.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// 讀取聯絡人 CSV，每筆資料依標題順序保存欄位
pub fn read_contact_rows(content: &[u8]) -> Result<Vec<ContactRow>> {
    let content = content.strip_prefix("\u{feff}".as_bytes()).unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        // 短少的欄位視為不存在
        let row = ContactRow::from_pairs(
            headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.to_string(), value.to_string())),
        );
        rows.push(row);
    }

    tracing::debug!("Read {} rows with {} columns", rows.len(), headers.len());
    Ok(rows)
}

/// 寫出 CSV；標題為所有資料欄位的有序聯集
pub fn write_contact_rows(rows: &[ContactRow], delimiter: u8) -> Result<Vec<u8>> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for field in row.field_names() {
            if !headers.iter().any(|h| h == field) {
                headers.push(field.to_string());
            }
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(&headers)?;
    for row in rows {
        let values: Vec<String> = headers
            .iter()
            .map(|header| match row.data.get(header) {
                None | Some(serde_json::Value::Null) => String::new(),
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&values)?;
    }

    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

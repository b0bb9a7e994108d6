use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gsmux_frame::dump::to_hex;
use gsmux_frame::{Corruption, Frame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One entry of a decode listing.
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    /// Byte offset of the entry in the input.
    pub offset: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlci: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_final: Option<bool>,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FrameRecord {
    pub fn frame(offset: usize, frame: &Frame) -> Self {
        Self {
            offset,
            status: "ok",
            dlci: Some(frame.dlci),
            frame_type: Some(
                frame
                    .frame_type()
                    .map_or_else(|| format!("0x{:02x}", frame.control), |t| t.to_string()),
            ),
            poll_final: Some(frame.poll_final()),
            length: frame.payload.len(),
            payload_hex: Some(to_hex(&frame.payload)),
            payload: Some(payload_preview(&frame.payload)),
            reason: None,
        }
    }

    pub fn corrupt(offset: usize, length: usize, reason: Corruption) -> Self {
        Self {
            offset,
            status: "corrupt",
            dlci: None,
            frame_type: None,
            poll_final: None,
            length,
            payload_hex: None,
            payload: None,
            reason: Some(reason.to_string()),
        }
    }

    pub fn incomplete(offset: usize, length: usize) -> Self {
        Self {
            offset,
            status: "incomplete",
            dlci: None,
            frame_type: None,
            poll_final: None,
            length,
            payload_hex: None,
            payload: None,
            reason: None,
        }
    }
}

pub fn print_records(records: &[FrameRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for record in records {
                println!(
                    "{}",
                    serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OFFSET", "STATUS", "DLCI", "TYPE", "P/F", "LEN", "PAYLOAD"]);
            for record in records {
                table.add_row(vec![
                    record.offset.to_string(),
                    record.status.to_string(),
                    record.dlci.map(|d| d.to_string()).unwrap_or_default(),
                    record.frame_type.clone().unwrap_or_default(),
                    record
                        .poll_final
                        .map(|pf| if pf { "1" } else { "0" }.to_string())
                        .unwrap_or_default(),
                    record.length.to_string(),
                    record
                        .payload
                        .clone()
                        .or_else(|| record.reason.clone())
                        .unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for record in records {
                match (&record.frame_type, &record.reason) {
                    (Some(frame_type), _) => println!(
                        "@{} dlci={} {}{} len={} payload={}",
                        record.offset,
                        record.dlci.unwrap_or_default(),
                        frame_type,
                        if record.poll_final == Some(true) { "|PF" } else { "" },
                        record.length,
                        record.payload.as_deref().unwrap_or_default()
                    ),
                    (None, Some(reason)) => {
                        println!("@{} corrupt ({}) {} bytes", record.offset, reason, record.length)
                    }
                    (None, None) => {
                        println!("@{} incomplete {} bytes", record.offset, record.length)
                    }
                }
            }
        }
        OutputFormat::Raw => {
            for record in records {
                if let Some(hex) = &record.payload_hex {
                    print_raw(format!("{hex}\n").as_bytes());
                }
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Printable text, with anything else escaped.
pub fn payload_preview(payload: &[u8]) -> String {
    payload.escape_ascii().to_string()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use gsmux_frame::FrameType;

    use super::*;

    #[test]
    fn frame_record_json() {
        let frame = Frame::new(1, FrameType::Uih.control(), Bytes::from_static(b"OK\r\n"));
        let json = serde_json::to_value(FrameRecord::frame(7, &frame)).unwrap();
        assert_eq!(json["offset"], 7);
        assert_eq!(json["frame_type"], "UIH");
        assert_eq!(json["payload_hex"], "4f4b0d0a");
        assert_eq!(json["payload"], "OK\\r\\n");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn corrupt_record_json() {
        let json = serde_json::to_value(FrameRecord::corrupt(0, 1, Corruption::BadFcs)).unwrap();
        assert_eq!(json["status"], "corrupt");
        assert_eq!(json["reason"], "FCS mismatch");
        assert!(json.get("dlci").is_none());
    }
}

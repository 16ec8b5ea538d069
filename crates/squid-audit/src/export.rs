//! Audit trail export

use crate::error::AuditError;
use crate::service::AuditService;
use csv::Writer;
use serde::{Deserialize, Serialize};
use squid_core::{AuditEntry, IdentityId};

/// Export encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON array of entries
    Json,
    /// One row per entry, metadata as a JSON column
    Csv,
}

/// CSV header row.
pub const CSV_COLUMNS: [&str; 8] = [
    "id",
    "identity_id",
    "sequence",
    "action",
    "outcome",
    "timestamp_ms",
    "correlation_id",
    "metadata",
];

/// Encode entries in `format`.
pub fn export_entries(entries: &[AuditEntry], format: ExportFormat) -> Result<String, AuditError> {
    match format {
        ExportFormat::Json => {
            serde_json::to_string_pretty(entries).map_err(AuditError::serialization)
        }
        ExportFormat::Csv => export_csv(entries),
    }
}

fn export_csv(entries: &[AuditEntry]) -> Result<String, AuditError> {
    let mut wtr = Writer::from_writer(vec![]);
    wtr.write_record(CSV_COLUMNS)
        .map_err(AuditError::serialization)?;

    for entry in entries {
        let metadata = serde_json::to_string(&entry.metadata).map_err(AuditError::serialization)?;
        wtr.write_record([
            entry.id.to_string(),
            entry.identity_id.to_string(),
            entry.sequence.to_string(),
            entry.action.clone(),
            entry.outcome.to_string(),
            entry.timestamp.ts_ms.to_string(),
            entry
                .correlation_id
                .map(|c| c.to_string())
                .unwrap_or_default(),
            metadata,
        ])
        .map_err(AuditError::serialization)?;
    }

    let data = wtr
        .into_inner()
        .map_err(|e| AuditError::serialization(format!("CSV writer error: {e}")))?;
    String::from_utf8(data).map_err(|e| AuditError::serialization(format!("UTF-8 conversion error: {e}")))
}

impl AuditService {
    /// Export every retained entry of `identity_id`.
    pub async fn export_audit_trail(
        &self,
        identity_id: &IdentityId,
        format: ExportFormat,
    ) -> Result<String, AuditError> {
        let entries = self.entries(identity_id).await?;
        export_entries(&entries, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squid_core::{AuditEntryId, AuditOutcome, CorrelationId, PhysicalTime};

    fn entry(action: &str) -> AuditEntry {
        let mut metadata = serde_json::Map::new();
        metadata.insert("reason".into(), "has, comma".into());
        AuditEntry {
            id: AuditEntryId::new(),
            identity_id: IdentityId::new("did:squid:a"),
            sequence: 0,
            action: action.into(),
            timestamp: PhysicalTime::from_millis(42),
            outcome: AuditOutcome::Denied,
            metadata,
            correlation_id: Some(CorrelationId::new()),
            signature: None,
        }
    }

    #[test]
    fn csv_export_empty_has_header_only() {
        let out = export_entries(&[], ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("id,identity_id,sequence"));
    }

    #[test]
    fn csv_export_quotes_metadata() {
        let out = export_entries(&[entry("financial.transfer")], ExportFormat::Csv).unwrap();
        let mut reader = csv::Reader::from_reader(out.as_bytes());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[3], "financial.transfer");
        assert_eq!(&row[4], "DENIED");
        assert_eq!(&row[5], "42");
        let metadata: serde_json::Value = serde_json::from_str(&row[7]).unwrap();
        assert_eq!(metadata["reason"], "has, comma");
    }

    #[test]
    fn json_export_is_an_array() {
        let out = export_entries(&[entry("a.b"), entry("c.d")], ExportFormat::Json).unwrap();
        let parsed: Vec<AuditEntry> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].action, "c.d");
    }
}

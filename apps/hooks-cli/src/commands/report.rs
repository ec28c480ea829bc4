// report.rs — Render the status report of a stored event record.

use std::path::Path;

use hooks_event::{decode_record, summarize, InsightReport};

pub fn execute(record: &Path, ui_url: &str) -> anyhow::Result<()> {
    let report = load_report(record, ui_url)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_report(record: &Path, ui_url: &str) -> anyhow::Result<InsightReport> {
    let bytes = std::fs::read(record)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", record.display(), e))?;
    let event = decode_record(&bytes)?;
    tracing::debug!(event = %event.full_name(), stage = %event.stage(), "record loaded");
    Ok(summarize(&event, ui_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooks_event::{Classification, InsightKind, RepositoryEvent};
    use tempfile::tempdir;

    #[test]
    fn report_of_a_fresh_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("event.json");
        let event = RepositoryEvent::new(
            "github",
            "org/repo",
            Classification::parse("push", "").unwrap(),
            b"{}".to_vec(),
        );
        std::fs::write(&path, serde_json::to_vec(&event).unwrap()).unwrap();

        let report = load_report(&path, "https://ui.example.com").unwrap();
        assert_eq!(report.title, "CDS");
        assert!(report.detail.contains("Scheduled"));
        assert_eq!(report.items[0].kind, InsightKind::Text);
    }

    #[test]
    fn missing_record_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_report(&dir.path().join("nope.json"), "http://ui").is_err());
    }
}

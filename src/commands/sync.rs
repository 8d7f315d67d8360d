use crate::backfill::BackfillOutcome;
use crate::commands::Out;
use crate::ingest::{IngestOutcome, IngestReport};
use crate::library::Library;
use crate::Result;

/// Downloads the statements that are new since the last run, or all of them with `reload`.
pub async fn sync(library: &Library, reload: bool) -> Result<Out<IngestReport>> {
    let report = match library.sync(reload).await? {
        IngestOutcome::Completed(report) => report,
        IngestOutcome::Skipped => return Ok("A synchronization is already running".into()),
    };
    let mut message = format!(
        "Synchronized {} months: {} statements stored",
        report.periods, report.inserted
    );
    if report.failed_rows > 0 {
        message.push_str(&format!(", {} lines could not be read", report.failed_rows));
    }
    if let Some(BackfillOutcome::Completed(currency)) = &report.backfill {
        message.push_str(&format!(", amounts converted to {currency}"));
    }
    Ok(Out::new(message, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_sync_command() {
        let env = TestEnv::new().await;
        let out = sync(env.library().as_ref(), false).await.unwrap();
        let report = out.structure().unwrap();
        assert_eq!(report.inserted, 8);
        assert!(out.message().contains("8 statements"));
        assert!(report.backfill.is_none());
    }
}

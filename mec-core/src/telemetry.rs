use std::path::Path;
use std::time::Instant;

/// Records the elapsed time (milliseconds since the recorder was created) of
/// each phase a run passes through and writes them out as a two-column
/// `step,timestamp` CSV, with a final `service_id,<id>` row appended once the
/// run has one.
///
/// Timestamps are relative, not wall-clock: a `Instant`-based clock so that
/// step ordering within a run is immune to system clock adjustments.
///
/// This is in-memory only; nothing is written to disk until [`Self::write`]
/// is called, so a run that crashes mid-way leaves no partial file.
#[derive(Debug, Clone)]
pub struct PhaseRecorder {
    run_start: Instant,
    steps: Vec<(String, i64)>,
    service_id: Option<String>,
}

impl Default for PhaseRecorder {
    fn default() -> Self {
        Self {
            run_start: Instant::now(),
            steps: Vec::new(),
            service_id: None,
        }
    }
}

impl PhaseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `step` against the milliseconds elapsed since this recorder
    /// was created.
    pub fn mark(&mut self, step: impl Into<String>) {
        let elapsed_ms = self.run_start.elapsed().as_millis() as i64;
        self.steps.push((step.into(), elapsed_ms));
    }

    /// Record `step` against an explicit timestamp, for tests and for
    /// replaying a run from logged data.
    pub fn mark_at(&mut self, step: impl Into<String>, timestamp: i64) {
        self.steps.push((step.into(), timestamp));
    }

    pub fn set_service_id(&mut self, service_id: impl Into<String>) {
        self.service_id = Some(service_id.into());
    }

    pub fn steps(&self) -> &[(String, i64)] {
        &self.steps
    }

    /// Write the recorded steps to `path` as CSV: a header row, one row per
    /// recorded step, then a trailing `service_id,<id>` row if one was set.
    pub fn write(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(["step", "timestamp"])?;
        for (step, timestamp) in &self.steps {
            writer.write_record([step.as_str(), &timestamp.to_string()])?;
        }
        if let Some(service_id) = &self.service_id {
            writer.write_record(["service_id", service_id.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_steps_and_trailing_service_id() {
        let mut recorder = PhaseRecorder::new();
        recorder.mark_at("announce", 1_000);
        recorder.mark_at("bid", 1_010);
        recorder.set_service_id("service1000-n1");

        let file = tempfile::NamedTempFile::new().unwrap();
        recorder.write(file.path()).unwrap();

        let contents = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("step,timestamp"));
        assert_eq!(lines.next(), Some("announce,1000"));
        assert_eq!(lines.next(), Some("bid,1010"));
        assert_eq!(lines.next(), Some("service_id,service1000-n1"));
    }

    #[test]
    fn omits_service_id_row_when_unset() {
        let mut recorder = PhaseRecorder::new();
        recorder.mark_at("announce", 1_000);
        let file = tempfile::NamedTempFile::new().unwrap();
        recorder.write(file.path()).unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}

use std::time::Instant;

/// Failure-indicating keywords that promote a trace step to a user-visible
/// warning without halting the pipeline.
const WARNING_KEYWORDS: [&str; 4] = ["error", "failed", "missing", "unavailable"];

/// Timestamped diagnostic trace shared by all pipeline stages.
///
/// Every stage appends human-readable steps here; messages containing
/// failure keywords are additionally collected as soft warnings for the
/// caller to display. Each step is mirrored to `tracing` at debug level.
#[derive(Debug)]
pub struct DebugTrace {
    start: Instant,
    capture: bool,
    steps: Vec<String>,
    errors: Vec<String>,
}

impl DebugTrace {
    pub fn new(capture: bool) -> Self {
        DebugTrace {
            start: Instant::now(),
            capture,
            steps: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Record a diagnostic step with the elapsed time since trace creation.
    pub fn log(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        let elapsed = self.start.elapsed().as_secs_f64();
        let formatted = format!("[{elapsed:0.2}s] {message}");
        tracing::debug!(target: "promptlist", "{formatted}");
        let lowered = message.to_lowercase();
        if WARNING_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            self.errors.push(message.to_string());
        }
        if self.capture {
            self.steps.push(formatted);
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Consume the trace, yielding (steps, warnings) for payload assembly.
    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (self.steps, self.errors)
    }
}

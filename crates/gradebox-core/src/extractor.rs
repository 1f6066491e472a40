//! Streaming extraction of job telemetry from raw log lines.
//!
//! Each line is stripped of color sequences and run through a fixed list of
//! matchers, in this order:
//!
//! 1. new-inference marker (`New Inference`): starts a new inference
//! 2. operator time (`Op Time: <secs>`): accumulates into the current inference
//! 3. program output (`Correctness: <score> Model: <name>`)
//! 4. aggregate time (`<u>user <s>system <e>elapsed`): overwrites the three runtimes
//! 5. project URL (`✱ The build folder has been uploaded to <url>. ...`)
//!
//! The job record is created on the first line any matcher accepts. Metric
//! lines seen before any marker write into an implicitly started first
//! inference. A numeric field that fails to parse is left untouched while
//! the rest of the line still applies.

use std::borrow::Cow;
use std::sync::LazyLock;
use std::time::Duration;

use gradebox_state::Job;
use regex::Regex;
use tracing::debug;
use url::Url;

static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:[0-9]{1,4}(?:;[0-9]{0,4})*)?[0-9A-ORZcf-nqry=><]").unwrap()
});
static TIME_OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]*\.?[0-9]+)user\s+([0-9]*\.?[0-9]+)system\s+([0-9]*\.?[0-9]+)elapsed.*")
        .unwrap()
});
static PROGRAM_OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Correctness: ([-+]?[0-9]*\.?[0-9]+)\s+Model: (.*)").unwrap()
});
static OP_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Op Time: ([-+]?[0-9]*\.?[0-9]+)").unwrap());
static PROJECT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"✱ The build folder has been uploaded to (\s*\[+?\s*(!?)\s*([a-z]*)\s*\|?\s*([a-z0-9\.\-_]*)\s*\]+?)?\s*([^\s]+)\s*\..*",
    )
    .unwrap()
});
static NEW_INFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"New Inference").unwrap());

/// Remove escape bytes and color sequences.
///
/// Repeats until nothing changes, so removing one sequence cannot splice
/// together a new one that survives.
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') && !s.contains('[') {
        return Cow::Borrowed(s);
    }
    let mut current = s.replace('\x1b', "");
    loop {
        let next = COLOR_RE.replace_all(&current, "").into_owned();
        if next == current {
            return Cow::Owned(current);
        }
        current = next;
    }
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Accumulates a [`Job`] from the log lines of one session.
///
/// Not internally synchronized: exactly one consumer feeds it lines.
#[derive(Debug, Clone)]
pub struct TelemetryExtractor {
    job_id: String,
    job: Option<Job>,
}

impl TelemetryExtractor {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            job: None,
        }
    }

    /// The job accumulated so far, if any line has matched.
    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn into_job(self) -> Option<Job> {
        self.job
    }

    /// Apply one raw line.
    pub fn parse_line(&mut self, line: &str) {
        let line = strip_ansi(line);
        let line = line.as_ref();

        self.parse_new_inference(line);
        self.parse_op_time(line);
        self.parse_program_output(line);
        self.parse_time_output(line);
        self.parse_project_url(line);
    }

    fn job_mut(&mut self) -> &mut Job {
        let id = &self.job_id;
        self.job.get_or_insert_with(|| Job::new(id.clone()))
    }

    fn parse_new_inference(&mut self, line: &str) {
        if NEW_INFERENCE_RE.is_match(line) {
            self.job_mut().start_new_inference();
        }
    }

    fn parse_op_time(&mut self, line: &str) {
        let Some(caps) = OP_TIME_RE.captures(line) else {
            return;
        };
        let job = self.job_mut();
        match parse_seconds(&caps[1]) {
            Some(elapsed) => job.record_op_runtime(elapsed),
            None => {
                job.current_or_first_inference();
                debug!(value = &caps[1], "unparseable op time");
            }
        }
    }

    fn parse_program_output(&mut self, line: &str) {
        let Some(caps) = PROGRAM_OUTPUT_RE.captures(line) else {
            return;
        };
        let inference = self.job_mut().current_or_first_inference();
        match caps[1].parse::<f64>() {
            Ok(correctness) if correctness.is_finite() => inference.correctness = correctness,
            _ => debug!(value = &caps[1], "unparseable correctness"),
        }
        inference.model = caps[2].to_string();
    }

    fn parse_time_output(&mut self, line: &str) {
        let Some(caps) = TIME_OUTPUT_RE.captures(line) else {
            return;
        };
        let inference = self.job_mut().current_or_first_inference();
        if let Some(user) = parse_seconds(&caps[1]) {
            inference.user_full_runtime = user;
        }
        if let Some(system) = parse_seconds(&caps[2]) {
            inference.system_full_runtime = system;
        }
        if let Some(elapsed) = parse_seconds(&caps[3]) {
            inference.elapsed_full_runtime = elapsed;
        }
    }

    fn parse_project_url(&mut self, line: &str) {
        let Some(raw) = PROJECT_URL_RE
            .captures(line)
            .and_then(|caps| caps.get(caps.len() - 1))
            .map(|m| m.as_str().to_string())
        else {
            return;
        };
        let job = self.job_mut();
        match Url::parse(&raw) {
            Ok(_) => job.project_url = Some(raw),
            Err(e) => debug!(value = %raw, error = %e, "invalid project url"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(lines: &[&str]) -> Option<Job> {
        let mut extractor = TelemetryExtractor::new("session-1");
        for line in lines {
            extractor.parse_line(line);
        }
        extractor.into_job()
    }

    #[test]
    fn strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[32mOp Time: 1.5\x1b[0m"), "Op Time: 1.5");
        assert_eq!(strip_ansi("\x1b[1;31mred\x1b[0m"), "red");
        assert!(matches!(strip_ansi("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn irrelevant_lines_create_nothing() {
        assert!(extract(&["make: Nothing to be done", "", "Loading data..."]).is_none());
    }

    #[test]
    fn program_output_scenario() {
        let job = extract(&["New Inference", "Correctness: 0.92 Model: resnet50"]).unwrap();
        assert_eq!(job.id, "session-1");
        assert_eq!(job.inferences.len(), 1);
        assert_eq!(job.inferences[0].correctness, 0.92);
        assert_eq!(job.inferences[0].model, "resnet50");
    }

    #[test]
    fn time_output_scenario() {
        let job = extract(&["4.85user 2.97system 5.25elapsed 148%CPU (0avgtext+0avgdata 0maxresident)k"])
            .unwrap();
        let inf = &job.inferences[0];
        assert_eq!(inf.user_full_runtime, Duration::from_secs_f64(4.85));
        assert_eq!(inf.system_full_runtime, Duration::from_secs_f64(2.97));
        assert_eq!(inf.elapsed_full_runtime, Duration::from_secs_f64(5.25));
    }

    #[test]
    fn project_url_scenario() {
        let job = extract(&[
            "✱ The build folder has been uploaded to http://example.com/x.tar.gz. The data will be present for only a short duration of time.",
        ])
        .unwrap();
        assert_eq!(job.project_url.as_deref(), Some("http://example.com/x.tar.gz"));
        assert!(job.inferences.is_empty());
    }

    #[test]
    fn project_url_with_decoration() {
        let job = extract(&[
            "✱ The build folder has been uploaded to [ ! warn | build.tar ] https://files.example.com/userdata/build-1.tar.gz. The data will be present for only a short duration of time.",
        ])
        .unwrap();
        assert_eq!(
            job.project_url.as_deref(),
            Some("https://files.example.com/userdata/build-1.tar.gz")
        );
    }

    #[test]
    fn invalid_project_url_is_ignored() {
        let job = extract(&["✱ The build folder has been uploaded to not-a-url. Later."]).unwrap();
        assert!(job.project_url.is_none());
    }

    #[test]
    fn op_times_accumulate() {
        let job = extract(&["Op Time: 0.25", "Op Time: 0.75"]).unwrap();
        assert_eq!(job.inferences.len(), 1);
        assert_eq!(job.inferences[0].op_runtime, Duration::from_secs(1));
    }

    #[test]
    fn aggregate_time_overwrites() {
        let job = extract(&["1.0user 1.0system 1.0elapsed", "2.0user 3.0system 4.0elapsed"]).unwrap();
        assert_eq!(job.inferences[0].elapsed_full_runtime, Duration::from_secs(4));
        assert_eq!(job.inferences[0].user_full_runtime, Duration::from_secs(2));
    }

    #[test]
    fn markers_partition_metrics() {
        let job = extract(&[
            "Correctness: 0.5 Model: ece408-low",
            "Op Time: 1.0",
            "New Inference",
            "Correctness: 0.8 Model: ece408-high",
            "Op Time: 2.0",
        ])
        .unwrap();
        // implicit first inference plus one started by the marker
        assert_eq!(job.inferences.len(), 2);
        assert_eq!(job.inferences[0].model, "ece408-low");
        assert_eq!(job.inferences[0].op_runtime, Duration::from_secs(1));
        assert_eq!(job.inferences[1].model, "ece408-high");
        assert_eq!(job.inferences[1].op_runtime, Duration::from_secs(2));
    }

    #[test]
    fn huge_op_times_saturate() {
        let job = extract(&["Op Time: 18000000000000000000", "Op Time: 18000000000000000000"])
            .unwrap();
        assert_eq!(job.inferences[0].op_runtime, Duration::MAX);
    }

    #[test]
    fn malformed_runtime_leaves_only_that_field_unset() {
        let job = extract(&["99999999999999999999user 2.0system 3.0elapsed 99%CPU"]).unwrap();
        let inf = &job.inferences[0];
        assert_eq!(inf.user_full_runtime, Duration::ZERO);
        assert_eq!(inf.system_full_runtime, Duration::from_secs(2));
        assert_eq!(inf.elapsed_full_runtime, Duration::from_secs(3));
    }

    #[test]
    fn malformed_score_still_records_model() {
        let line = format!("Correctness: 1{} Model: vgg16", "0".repeat(400));
        let job = extract(&[line.as_str()]).unwrap();
        assert_eq!(job.inferences[0].correctness, 0.0);
        assert_eq!(job.inferences[0].model, "vgg16");
    }

    #[test]
    fn spliced_color_sequences_are_fully_removed() {
        assert_eq!(strip_ansi("Model: x[[1mAnet"), "Model: xnet");
    }

    #[test]
    fn negative_op_time_is_skipped() {
        let job = extract(&["Op Time: -3.0"]).unwrap();
        assert_eq!(job.inferences[0].op_runtime, Duration::ZERO);
    }

    #[test]
    fn signed_fraction_scores() {
        // "." alone is not a score
        assert!(extract(&["Correctness: . Model: vgg"]).is_none());

        let job = extract(&["Correctness: +.5 Model: vgg"]).unwrap();
        assert_eq!(job.inferences[0].correctness, 0.5);
        assert_eq!(job.inferences[0].model, "vgg");
    }
}

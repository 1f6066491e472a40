//! Behavior of the telemetry extractor over realistic log streams.

use std::time::Duration;

use gradebox_core::{strip_ansi, TelemetryExtractor};

fn feed(lines: &[&str]) -> TelemetryExtractor {
    let mut extractor = TelemetryExtractor::new("job-42");
    for line in lines {
        extractor.parse_line(line);
    }
    extractor
}

#[test]
fn stripping_is_idempotent() {
    let samples = [
        "\x1b[1;32m✱ Folder uploaded.\x1b[0m",
        "\x1b[33mOp Time: 0.125\x1b[0m",
        "plain text",
        "Correctness: 0.5 Model: x[[1mAnet",
        "\x1b[[\x1b[1m31mred",
        "",
    ];
    for sample in samples {
        let once = strip_ansi(sample).into_owned();
        let twice = strip_ansi(&once).into_owned();
        assert_eq!(once, twice, "sample {:?}", sample);
        assert!(!once.contains('\x1b'));
    }
}

#[test]
fn raw_and_prestripped_lines_extract_the_same() {
    let samples = [
        "\x1b[1mCorrectness: 0.5 Model: x[[1mAnet\x1b[0m",
        "\x1b[32m2.0user 1.0system 3.0elapsed\x1b[0m",
        "Op Time: [[0m0.5",
    ];
    for sample in samples {
        let raw = feed(&[sample]).into_job().unwrap();
        let stripped = feed(&[strip_ansi(sample).as_ref()]).into_job().unwrap();
        assert_eq!(raw.inferences, stripped.inferences, "sample {:?}", sample);
        assert_eq!(raw.project_url, stripped.project_url);
    }
}

#[test]
fn each_marker_starts_one_inference() {
    for n in 1..=5 {
        let mut lines = Vec::new();
        for i in 0..n {
            lines.push("* New Inference *".to_string());
            lines.push(format!("Correctness: 0.{} Model: m{}", i + 1, i));
        }
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let job = feed(&refs).into_job().unwrap();
        assert_eq!(job.inferences.len(), n);
        assert_eq!(job.inferences[n - 1].model, format!("m{}", n - 1));
    }
}

#[test]
fn unrelated_lines_change_nothing() {
    let mut extractor = feed(&["New Inference", "Correctness: 0.5 Model: base"]);
    let before = extractor.job().cloned();
    for noise in [
        "Scanning dependencies of target ece408",
        "[ 50%] Building CUDA object",
        "   ",
        "Loading fashion-mnist data...done",
    ] {
        extractor.parse_line(noise);
    }
    assert_eq!(extractor.job().cloned(), before);
}

#[test]
fn full_evaluation_log() {
    let log = [
        "\x1b[1;33m✱\x1b[0m Running make",
        "New Inference",
        "Op Time: 0.010",
        "Op Time: 0.020",
        "Correctness: 0.7653 Model: ece408-low",
        "1.50user 0.50system 2.00elapsed 100%CPU",
        "New Inference",
        "Op Time: 0.100",
        "Correctness: 0.8171 Model: ece408-high",
        "3.00user 1.00system 4.50elapsed 88%CPU",
        "✱ The build folder has been uploaded to https://files.gradebox.dev/build/abc.tar.gz. The data will be present for only a short duration of time.",
    ];
    let job = feed(&log).into_job().unwrap();

    assert_eq!(job.id, "job-42");
    assert_eq!(job.inferences.len(), 2);
    let low = &job.inferences[0];
    assert_eq!(low.model, "ece408-low");
    assert_eq!(low.op_runtime, Duration::from_secs_f64(0.010) + Duration::from_secs_f64(0.020));
    assert_eq!(low.elapsed_full_runtime, Duration::from_secs(2));
    let high = &job.inferences[1];
    assert_eq!(high.correctness, 0.8171);
    assert_eq!(high.system_full_runtime, Duration::from_secs(1));
    assert_eq!(
        job.project_url.as_deref(),
        Some("https://files.gradebox.dev/build/abc.tar.gz")
    );
}

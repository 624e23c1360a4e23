//! Stand-in processor that paces progress on a timer and copies the input
//! to the output directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use wmpro_core::job::{JobType, STAGE_PROCESSING};
use wmpro_core::watermark::JobPayload;

use crate::processor::{ProcessOutput, Processor, ProcessorError, ProgressReporter};

/// Suffix appended to the input stem for output files.
const OUTPUT_SUFFIX: &str = "_watermarked";

pub struct SimulatedProcessor {
    output_dir: PathBuf,
    step: u8,
    interval: Duration,
}

impl SimulatedProcessor {
    /// Progress in `step` percent increments, one every `interval`.
    pub fn new(output_dir: impl Into<PathBuf>, step: u8, interval: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            step: step.clamp(1, 100),
            interval,
        }
    }

    /// Default pacing for a job type: video advances 5% every 200 ms, images
    /// and PDFs 10% every 100 ms.
    pub fn for_type(job_type: JobType, output_dir: impl Into<PathBuf>) -> Self {
        match job_type {
            JobType::Video => Self::new(output_dir, 5, Duration::from_millis(200)),
            JobType::Image | JobType::Pdf => Self::new(output_dir, 10, Duration::from_millis(100)),
        }
    }

    /// `<output_dir>/<stem>_watermarked.<ext>`
    fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let name = match input.extension() {
            Some(ext) => format!("{stem}{OUTPUT_SUFFIX}.{}", ext.to_string_lossy()),
            None => format!("{stem}{OUTPUT_SUFFIX}"),
        };
        self.output_dir.join(name)
    }
}

#[async_trait]
impl Processor for SimulatedProcessor {
    async fn process(
        &self,
        input: &Path,
        payload: &JobPayload,
        progress: ProgressReporter,
    ) -> Result<ProcessOutput, ProcessorError> {
        let started = Instant::now();

        tokio::fs::metadata(input).await?;

        let label = format!("Applying {} watermark", payload.job_type());
        let mut percent = 0u8;
        while percent < 100 {
            progress.report_stage(percent, STAGE_PROCESSING, label.as_str());
            tokio::time::sleep(self.interval).await;
            percent = percent.saturating_add(self.step).min(100);
        }
        progress.report_stage(100, STAGE_PROCESSING, "Writing output");

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output_path = self.output_path(input);
        tokio::fs::copy(input, &output_path).await?;

        Ok(ProcessOutput {
            output_path,
            processing_time_seconds: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use wmpro_core::watermark::TextWatermark;

    use super::*;

    fn pdf_payload() -> JobPayload {
        JobPayload::Pdf {
            watermark: TextWatermark::new("Draft"),
        }
    }

    #[tokio::test]
    async fn writes_watermarked_copy_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.pdf");
        std::fs::write(&input, b"%PDF-1.7").unwrap();

        let processor =
            SimulatedProcessor::new(dir.path().join("out"), 50, Duration::from_millis(1));
        let (reporter, mut rx) = ProgressReporter::channel();
        let output = processor
            .process(&input, &pdf_payload(), reporter)
            .await
            .unwrap();

        assert_eq!(output.output_path, dir.path().join("out/report_watermarked.pdf"));
        assert_eq!(std::fs::read(&output.output_path).unwrap(), b"%PDF-1.7");

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update.percent);
        }
        assert_eq!(seen, [0, 50, 100]);
    }

    #[tokio::test]
    async fn missing_input_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let processor = SimulatedProcessor::for_type(JobType::Image, dir.path());
        let result = processor
            .process(&dir.path().join("nope.png"), &pdf_payload(), ProgressReporter::noop())
            .await;
        assert!(matches!(result, Err(ProcessorError::Resource(_))));
    }
}

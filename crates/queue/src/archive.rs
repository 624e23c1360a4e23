//! ZIP batch submissions.
//!
//! An archive is unpacked into the upload directory and every supported
//! entry becomes one job in a shared upload group. Entries the queue cannot
//! process are reported back by name; system clutter (`__MACOSX`,
//! `.DS_Store`, hidden files, directories) is dropped silently.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use wmpro_core::error::CoreError;
use wmpro_core::job::JobType;
use wmpro_core::types::{JobId, UploadGroupId};
use wmpro_core::watermark::{JobPayload, WatermarkSpec};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv"];
const PDF_EXTENSIONS: &[&str] = &["pdf"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A batch submission: one archive, one watermark, one upload group.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub upload_group_id: UploadGroupId,
    pub archive_path: PathBuf,
    /// Directory the supported entries are extracted into.
    pub extract_dir: PathBuf,
    pub watermark: WatermarkSpec,
    pub priority: Option<i32>,
}

/// Outcome of a batch submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub job_ids: Vec<JobId>,
    /// `"<entry name>: <reason>"` for every entry that did not become a job.
    pub skipped: Vec<String>,
}

/// How an archive entry is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory, hidden file or OS metadata.
    Ignored,
    Unsupported,
    Media(JobType),
}

/// One supported entry written to disk.
#[derive(Debug, Clone)]
pub struct ExtractedEntry {
    /// Base name inside the archive.
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub job_type: JobType,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub entries: Vec<ExtractedEntry>,
    pub skipped: Vec<String>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

pub fn classify_entry(name: &str) -> EntryKind {
    if name.ends_with('/')
        || name.starts_with('.')
        || name.contains("__MACOSX")
        || name.contains(".DS_Store")
    {
        return EntryKind::Ignored;
    }

    let base = base_name(name);
    if base.is_empty() || base.starts_with('.') {
        return EntryKind::Ignored;
    }

    let extension = Path::new(base)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => EntryKind::Media(JobType::Image),
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => EntryKind::Media(JobType::Video),
        Some(ext) if PDF_EXTENSIONS.contains(&ext) => EntryKind::Media(JobType::Pdf),
        _ => EntryKind::Unsupported,
    }
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// The payload for one entry, or why the watermark does not fit its type.
pub fn payload_for(job_type: JobType, watermark: &WatermarkSpec) -> Result<JobPayload, String> {
    match (job_type, watermark) {
        (JobType::Video, spec) => Ok(JobPayload::Video {
            watermark: spec.clone(),
        }),
        (JobType::Image, spec) => Ok(JobPayload::Image {
            watermark: spec.clone(),
        }),
        (JobType::Pdf, WatermarkSpec::Text(text)) => Ok(JobPayload::Pdf {
            watermark: text.clone(),
        }),
        (JobType::Pdf, WatermarkSpec::Image(_)) => {
            Err("PDF files only take text watermarks".to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Unpack every supported entry of `archive_path` into `dest_dir`.
///
/// Blocking; run it on the blocking pool. Each file is stored under an
/// index prefix so equal base names from different folders do not collide.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<Extraction, CoreError> {
    let file = File::open(archive_path).map_err(|e| {
        CoreError::Validation(format!(
            "Archive {} could not be opened: {e}",
            archive_path.display()
        ))
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| CoreError::Validation(format!("Invalid ZIP archive: {e}")))?;
    std::fs::create_dir_all(dest_dir)
        .map_err(|e| CoreError::Internal(format!("Failed to create {}: {e}", dest_dir.display())))?;

    let mut extraction = Extraction::default();
    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                extraction.skipped.push(format!("#{index}: {e}"));
                continue;
            }
        };
        let name = entry.name().to_string();
        if entry.is_dir() {
            continue;
        }

        let job_type = match classify_entry(&name) {
            EntryKind::Ignored => continue,
            EntryKind::Unsupported => {
                extraction.skipped.push(format!("{name}: unsupported file type"));
                continue;
            }
            EntryKind::Media(job_type) => job_type,
        };

        let filename = base_name(&name).to_string();
        let path = dest_dir.join(format!("{index:04}_{filename}"));
        match write_entry(&mut entry, &path) {
            Ok(size_bytes) => extraction.entries.push(ExtractedEntry {
                filename,
                path,
                size_bytes,
                job_type,
            }),
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "Failed to extract archive entry");
                let _ = std::fs::remove_file(&path);
                extraction.skipped.push(format!("{name}: {e}"));
            }
        }
    }

    Ok(extraction)
}

fn write_entry(entry: &mut impl io::Read, path: &Path) -> io::Result<u64> {
    let mut out = File::create(path)?;
    io::copy(entry, &mut out)
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mockup_contracts::artifacts::{receipt_path_for, write_receipt, InputImageRecord, MockupReceipt};
use mockup_contracts::generation::GeneratedImage;

use crate::encoder::ImageFile;

pub const DEFAULT_EXPORT_STEM: &str = "sticker-mockup";

#[derive(Debug, Clone)]
pub struct ExportContext<'a> {
    pub sequence: u64,
    pub model: &'a str,
    pub prompt: &'a str,
    pub input: Option<&'a ImageFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedMockup {
    pub image_path: PathBuf,
    pub receipt_path: PathBuf,
    pub receipt: MockupReceipt,
}

// Directories, existing or spelled with a trailing separator, get
// `sticker-mockup.<ext>`.
pub fn export_target(target: &Path, image: &GeneratedImage) -> PathBuf {
    let names_dir = target.is_dir()
        || target
            .to_string_lossy()
            .ends_with(std::path::MAIN_SEPARATOR)
        || target.to_string_lossy().ends_with('/');
    if names_dir {
        target.join(format!("{DEFAULT_EXPORT_STEM}.{}", image.extension()))
    } else {
        target.to_path_buf()
    }
}

pub fn export_mockup(
    image: &GeneratedImage,
    target: &Path,
    context: &ExportContext<'_>,
) -> Result<ExportedMockup> {
    let bytes = image.bytes()?;
    let image_path = export_target(target, image);
    if let Some(parent) = image_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(&image_path, &bytes)
        .with_context(|| format!("failed to write {}", image_path.display()))?;

    let dimensions = image::load_from_memory(&bytes)
        .ok()
        .map(|decoded| (decoded.width(), decoded.height()));
    let input = context.input.map(|file| InputImageRecord {
        path: file.path().to_string_lossy().to_string(),
        media_type: file
            .declared_media_type()
            .unwrap_or("unknown")
            .to_string(),
    });
    let receipt = MockupReceipt::new(
        context.sequence,
        context.model,
        context.prompt,
        input,
        &image_path,
        image.media_type.clone(),
        &bytes,
        dimensions,
    );
    let receipt_path = receipt_path_for(&image_path);
    write_receipt(&receipt_path, &receipt)?;

    Ok(ExportedMockup {
        image_path,
        receipt_path,
        receipt,
    })
}

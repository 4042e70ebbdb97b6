use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::events::now_utc_iso;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputImageRecord {
    pub path: String,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputImageRecord {
    pub path: String,
    pub media_type: String,
    pub bytes: u64,
    pub sha256: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockupReceipt {
    pub schema_version: u64,
    pub sequence: u64,
    pub created_at: String,
    pub model: String,
    pub prompt: String,
    pub input: Option<InputImageRecord>,
    pub output: OutputImageRecord,
}

impl MockupReceipt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        model: impl Into<String>,
        prompt: impl Into<String>,
        input: Option<InputImageRecord>,
        output_path: &Path,
        output_media_type: impl Into<String>,
        output_bytes: &[u8],
        dimensions: Option<(u32, u32)>,
    ) -> Self {
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            sequence,
            created_at: now_utc_iso(),
            model: model.into(),
            prompt: prompt.into(),
            input,
            output: OutputImageRecord {
                path: output_path.to_string_lossy().to_string(),
                media_type: output_media_type.into(),
                bytes: output_bytes.len() as u64,
                sha256: hex::encode(Sha256::digest(output_bytes)),
                width: dimensions.map(|(width, _)| width),
                height: dimensions.map(|(_, height)| height),
            },
        }
    }
}

pub fn receipt_path_for(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| "mockup".to_string());
    image_path.with_file_name(format!("{stem}.receipt.json"))
}

pub fn write_receipt(path: &Path, receipt: &MockupReceipt) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(receipt)?)
        .with_context(|| format!("failed to write receipt {}", path.display()))?;
    Ok(())
}

pub fn read_receipt(path: &Path) -> anyhow::Result<MockupReceipt> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid receipt {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn receipt_path_replaces_extension() {
        assert_eq!(
            receipt_path_for(Path::new("/tmp/out/sticker-mockup.png")),
            Path::new("/tmp/out/sticker-mockup.receipt.json")
        );
    }

    #[test]
    fn receipt_records_output_digest_and_dimensions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image_path = temp.path().join("sticker-mockup.png");
        let receipt = MockupReceipt::new(
            3,
            "gemini-2.0-flash-preview-image-generation",
            "sticker on a laptop",
            Some(InputImageRecord {
                path: "sticker.png".to_string(),
                media_type: "image/png".to_string(),
            }),
            &image_path,
            "image/png",
            b"abc",
            Some((64, 32)),
        );
        assert_eq!(receipt.schema_version, RECEIPT_SCHEMA_VERSION);
        assert_eq!(receipt.output.bytes, 3);
        assert_eq!(
            receipt.output.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(receipt.output.width, Some(64));
        assert_eq!(receipt.output.height, Some(32));

        let path = receipt_path_for(&image_path);
        write_receipt(&path, &receipt)?;
        assert_eq!(read_receipt(&path)?, receipt);
        Ok(())
    }
}

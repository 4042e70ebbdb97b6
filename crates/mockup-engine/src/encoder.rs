use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use mockup_contracts::generation::{EncodedImage, GenerationFailure, DEFAULT_IMAGE_MEDIA_TYPE};

const SNIFF_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    path: PathBuf,
    declared_media_type: Option<String>,
}

impl ImageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let declared_media_type = mime_for_path(&path).map(str::to_string);
        Self {
            path,
            declared_media_type,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        let media_type = media_type.into().trim().to_ascii_lowercase();
        if !media_type.is_empty() {
            self.declared_media_type = Some(media_type);
        }
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn declared_media_type(&self) -> Option<&str> {
        self.declared_media_type.as_deref()
    }

    // Undeclared files pass here and are sniffed once read.
    pub fn is_image(&self) -> bool {
        self.declared_media_type
            .as_deref()
            .map(|media_type| media_type.starts_with("image/"))
            .unwrap_or(true)
    }

    pub fn detect_media_type(&self) -> std::io::Result<Option<String>> {
        if let Some(declared) = self.declared_media_type() {
            return Ok(self.is_image().then(|| declared.to_string()));
        }
        let mut header = [0u8; SNIFF_BYTES];
        let read = fs::File::open(&self.path)?.read(&mut header)?;
        Ok(sniff_media_type(&header[..read]).map(str::to_string))
    }
}

pub fn encode_image(file: &ImageFile) -> Result<EncodedImage, GenerationFailure> {
    let bytes = fs::read(file.path()).map_err(|err| {
        GenerationFailure::file_read(format!("failed reading {}: {err}", file.path().display()))
    })?;
    let media_type = match file.declared_media_type() {
        Some(declared) => declared.to_string(),
        None => sniff_media_type(&bytes)
            .ok_or_else(|| {
                GenerationFailure::validation(format!(
                    "{} is not a recognised image",
                    file.path().display()
                ))
            })?
            .to_string(),
    };
    Ok(EncodedImage::from_bytes(media_type, &bytes))
}

// Formats `image` knows but has no image/* MIME for are sent as png.
fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    let media_type = format.to_mime_type();
    if media_type.starts_with("image/") {
        Some(media_type)
    } else {
        Some(DEFAULT_IMAGE_MEDIA_TYPE)
    }
}

pub(crate) fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use image::{ImageFormat, RgbImage};
    use mockup_contracts::generation::ErrorKind;

    use super::*;

    fn png_bytes() -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::new();
        RgbImage::new(2, 2).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }

    #[test]
    fn encodes_bytes_with_extension_media_type() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("sticker.JPG");
        fs::write(&path, b"jpeg-ish")?;

        let encoded = encode_image(&ImageFile::new(&path))?;
        assert_eq!(encoded.media_type, "image/jpeg");
        assert_eq!(encoded.data, BASE64.encode(b"jpeg-ish"));
        Ok(())
    }

    #[test]
    fn explicit_media_type_wins_over_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("sticker.png");
        fs::write(&path, b"bytes")?;

        let encoded = encode_image(&ImageFile::new(&path).with_media_type("image/webp"))?;
        assert_eq!(encoded.media_type, "image/webp");
        Ok(())
    }

    #[test]
    fn undeclared_file_is_sniffed() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("upload");
        fs::write(&path, png_bytes()?)?;

        let file = ImageFile::new(&path);
        assert_eq!(file.declared_media_type(), None);
        assert_eq!(encode_image(&file)?.media_type, "image/png");
        Ok(())
    }

    #[test]
    fn unrecognised_content_is_rejected_not_relabelled() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"shopping list: milk, eggs")?;

        let file = ImageFile::new(&path);
        assert!(file.is_image());
        assert_eq!(file.detect_media_type()?, None);
        let failure = encode_image(&file).err().map(|failure| failure.kind);
        assert_eq!(failure, Some(ErrorKind::Validation));
        Ok(())
    }

    #[test]
    fn detect_media_type_sniffs_undeclared_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("upload");
        fs::write(&path, png_bytes()?)?;

        assert_eq!(
            ImageFile::new(&path).detect_media_type()?.as_deref(),
            Some("image/png")
        );
        assert_eq!(
            ImageFile::new(&path)
                .with_media_type("text/plain")
                .detect_media_type()?,
            None
        );
        Ok(())
    }

    #[test]
    fn missing_file_is_file_read_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let failure = encode_image(&ImageFile::new(temp.path().join("missing.png")))
            .err()
            .map(|failure| failure.kind);
        assert_eq!(failure, Some(ErrorKind::FileRead));
        Ok(())
    }

    #[test]
    fn non_image_declared_type_is_not_an_image() {
        assert!(ImageFile::new("notes.txt").is_image());
        assert!(!ImageFile::new("notes.txt")
            .with_media_type("text/plain")
            .is_image());
        assert!(ImageFile::new("a.gif").is_image());
    }
}

use image::{ImageFormat, ImageReader};
use oxipng::Options;
use std::fs;
use std::io::Cursor;
use std::path::Path;

pub const PNG_MIME: &str = "image/png";
pub const GENERATED_FILENAME: &str = "generated-nft.png";

/// アップロード対象のバイナリ（中身 + MIME + 論理ファイル名）
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
    bytes: Vec<u8>,
    mime: String,
    filename: String,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset")
            .field("filename", &self.filename)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Asset {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            filename: filename.into(),
        }
    }

    /// 生成画像から作る asset。ファイル名と MIME は固定
    pub fn generated(bytes: Vec<u8>) -> Self {
        Self::new(bytes, PNG_MIME, GENERATED_FILENAME)
    }

    /// ローカルファイルを読み込む。MIME は拡張子から決める
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        let mime = ImageFormat::from_path(path)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(Self::new(bytes, mime, filename))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// 衝突回避用に `<timestamp>-<filename>` の形にする
    pub fn unique_name(&self, timestamp_ms: i64) -> String {
        format!("{}-{}", timestamp_ms, self.filename)
    }

    /// ヘッダだけ読んで画像サイズを返す
    pub fn dimensions(&self) -> image::ImageResult<(u32, u32)> {
        ImageReader::new(Cursor::new(&self.bytes))
            .with_guessed_format()?
            .into_dimensions()
    }

    /// PNG を可逆圧縮し直す。PNG 以外はそのまま返す
    pub fn optimized_png(&self, level: u8) -> Result<Asset, oxipng::PngError> {
        if self.mime != PNG_MIME {
            return Ok(self.clone());
        }
        let mut options = Options::from_preset(level.min(6));
        options.fix_errors = true;
        let bytes = oxipng::optimize_from_memory(&self.bytes, &options)?;
        Ok(Self::new(bytes, self.mime.clone(), self.filename.clone()))
    }
}

#[cfg(test)]
pub(crate) fn tiny_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([200, 40, 90, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

//! 入力中のメタデータと、送信時に切り出すスナップショット

use crate::asset::Asset;
use crate::error::PreconditionError;
use crate::metadata::{Attribute, Royalty};
use crate::resolver::SelectedImage;

#[derive(Debug, Clone, Default)]
pub struct MetadataForm {
    name: String,
    symbol: String,
    description: String,
    royalty_percent: f64,
    attributes: Vec<Attribute>,
    image: Option<SelectedImage>,
}

impl MetadataForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_symbol(&mut self, symbol: impl Into<String>) {
        self.symbol = symbol.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// 0〜100 に丸めて保持し、保持した値を返す。有限でない値は 0
    pub fn set_royalty_percent(&mut self, percent: f64) -> f64 {
        self.royalty_percent = if !percent.is_finite() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        self.royalty_percent
    }

    pub fn royalty_percent(&self) -> f64 {
        self.royalty_percent
    }

    /// trait_type と value が両方あるときだけ末尾に追加する。重複は許す
    pub fn add_attribute(&mut self, trait_type: &str, value: &str) -> bool {
        if trait_type.is_empty() || value.is_empty() {
            return false;
        }
        self.attributes.push(Attribute::new(trait_type, value));
        true
    }

    pub fn remove_attribute(&mut self, index: usize) -> Option<Attribute> {
        (index < self.attributes.len()).then(|| self.attributes.remove(index))
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// 画像は後勝ち。直前の画像を返す
    pub fn set_image(&mut self, image: SelectedImage) -> Option<SelectedImage> {
        self.image.replace(image)
    }

    pub fn clear_image(&mut self) -> Option<SelectedImage> {
        self.image.take()
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        self.image.as_ref()
    }

    pub fn can_submit(&self) -> bool {
        self.snapshot().is_ok()
    }

    /// 送信時点の内容を不変のスナップショットとして切り出す
    pub fn snapshot(&self) -> Result<MetadataSnapshot, PreconditionError> {
        if self.name.trim().is_empty() {
            return Err(PreconditionError::MissingField("name"));
        }
        if self.symbol.trim().is_empty() {
            return Err(PreconditionError::MissingField("symbol"));
        }
        if self.description.trim().is_empty() {
            return Err(PreconditionError::MissingField("description"));
        }
        let image = self.image.as_ref().ok_or(PreconditionError::NoAsset)?;

        Ok(MetadataSnapshot {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            description: self.description.clone(),
            attributes: self.attributes.clone(),
            royalty: Royalty::from_percent(self.royalty_percent),
            image: image.asset.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataSnapshot {
    name: String,
    symbol: String,
    description: String,
    attributes: Vec<Attribute>,
    royalty: Royalty,
    image: Asset,
}

impl MetadataSnapshot {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn royalty(&self) -> Royalty {
        self.royalty
    }

    pub fn image(&self) -> &Asset {
        &self.image
    }
}

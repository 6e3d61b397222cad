use serde::{Deserialize, Serialize};

/// マーケットプレイス互換のトークンメタデータ JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub image: String,
    pub attributes: Vec<Attribute>,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

impl Attribute {
    pub fn new(trait_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(rename = "type")]
    pub mime: String,
    pub uri: String,
}

/// ロイヤリティ（ベーシスポイント、1% = 100）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Royalty(u16);

impl Royalty {
    pub const MAX_BASIS_POINTS: u16 = 10_000;

    /// パーセント入力をベーシスポイントに変換する（四捨五入、上限 10000）。
    /// 有限でない値は 0 扱い
    pub fn from_percent(percent: f64) -> Self {
        if !percent.is_finite() || percent <= 0.0 {
            return Royalty(0);
        }
        let bps = (percent * 100.0).round().min(f64::from(Self::MAX_BASIS_POINTS));
        Royalty(bps as u16)
    }

    pub fn basis_points(self) -> u16 {
        self.0
    }
}

impl MetadataDocument {
    /// 画像 URI を埋め込んでメタデータ文書を組み立てる
    pub fn build(
        name: &str,
        symbol: &str,
        description: &str,
        attributes: &[Attribute],
        image_mime: &str,
        image_uri: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            description: description.to_string(),
            image: image_uri.to_string(),
            attributes: attributes.to_vec(),
            properties: Properties {
                files: vec![FileEntry {
                    mime: image_mime.to_string(),
                    uri: image_uri.to_string(),
                }],
            },
        }
    }

    /// 標準スキーマに反する箇所を列挙する
    pub fn shape_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("name is empty".to_string());
        }
        if self.symbol.trim().is_empty() {
            problems.push("symbol is empty".to_string());
        }
        if self.image.trim().is_empty() {
            problems.push("image is empty".to_string());
        }
        if self.properties.files.is_empty() {
            problems.push("properties.files is empty".to_string());
        } else if !self.properties.files.iter().any(|f| f.uri == self.image) {
            problems.push("properties.files does not reference image".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn royalty_rounds_half_up() {
        assert_eq!(Royalty::from_percent(2.5).basis_points(), 250);
        assert_eq!(Royalty::from_percent(0.005).basis_points(), 1);
        assert_eq!(Royalty::from_percent(12.344).basis_points(), 1234);
        assert_eq!(Royalty::from_percent(100.0).basis_points(), 10_000);
    }

    #[test]
    fn royalty_never_exceeds_max() {
        assert_eq!(Royalty::from_percent(250.0).basis_points(), 10_000);
        assert_eq!(Royalty::from_percent(-3.0).basis_points(), 0);
        for tenth in 0..=1000 {
            let percent = f64::from(tenth) / 10.0;
            let bps = Royalty::from_percent(percent).basis_points();
            assert_eq!(f64::from(bps), (percent * 100.0).round());
            assert!(bps <= Royalty::MAX_BASIS_POINTS);
        }
    }

    #[test]
    fn non_finite_royalty_is_zero() {
        assert_eq!(Royalty::from_percent(f64::INFINITY).basis_points(), 0);
        assert_eq!(Royalty::from_percent(f64::NEG_INFINITY).basis_points(), 0);
        assert_eq!(Royalty::from_percent(f64::NAN).basis_points(), 0);
    }

    #[test]
    fn document_serializes_standard_shape() {
        let doc = MetadataDocument::build(
            "Cosmic Cat",
            "CAT",
            "A cat in space",
            &[Attribute::new("Background", "Nebula")],
            "image/png",
            "ipfs://img1",
        );
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains(r#""attributes":[{"trait_type":"Background","value":"Nebula"}]"#));
        assert!(json.contains(r#""properties":{"files":[{"type":"image/png","uri":"ipfs://img1"}]}"#));
        assert!(doc.shape_violations().is_empty());
    }

    #[test]
    fn shape_violations_catch_dangling_files() {
        let mut doc =
            MetadataDocument::build("A", "B", "", &[], "image/png", "file:///tmp/a.png");
        doc.properties.files[0].uri = "file:///tmp/other.png".into();
        doc.symbol.clear();
        let problems = doc.shape_violations();
        assert_eq!(problems.len(), 2);
    }
}

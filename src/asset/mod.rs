//! Assets: a route, its ordered sources and its transform chain.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::{PipelineError, Result};
use crate::fingerprint::{Fingerprint, RequestContext, derive_key};
use crate::provider::FileProvider;
use crate::transform::{CssMinifier, CssSettings, JsMinifier, JsSettings, SharedTransform};
use crate::utils::path::normalized_key;

/// Separator placed between concatenated sources.
pub const SOURCE_SEPARATOR: char = '\n';

/// A named group of source files plus an ordered transform chain.
///
/// The source list is fixed at construction. Transforms may be appended
/// until the asset first executes; after that the chain is sealed.
#[derive(Debug)]
pub struct Asset {
    route: String,
    key: String,
    sources: Vec<PathBuf>,
    transforms: RwLock<Vec<SharedTransform>>,
    sealed: AtomicBool,
}

impl Asset {
    pub(crate) fn new(route: String, sources: Vec<PathBuf>, transforms: Vec<SharedTransform>) -> Self {
        Self {
            key: normalized_key(&route),
            route,
            sources,
            transforms: RwLock::new(transforms),
            sealed: AtomicBool::new(false),
        }
    }

    /// Normalized route, case kept as registered.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Case-folded route used for lookup and fingerprinting.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Snapshot of the transform chain.
    pub fn transforms(&self) -> Vec<SharedTransform> {
        self.transforms.read().clone()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Append a transform. Fails once the asset has executed.
    pub fn add_transform(&self, transform: SharedTransform) -> Result<&Self> {
        let mut transforms = self.transforms.write();
        if self.is_sealed() {
            return Err(PipelineError::invalid(
                &self.route,
                "transforms can't be added after the asset has executed",
            ));
        }
        transforms.push(transform);
        Ok(self)
    }

    pub fn minify_css(&self) -> Result<&Self> {
        self.minify_css_with(CssSettings::default())
    }

    pub fn minify_css_with(&self, settings: CssSettings) -> Result<&Self> {
        self.add_transform(Arc::new(CssMinifier::new(settings)))
    }

    pub fn minify_js(&self) -> Result<&Self> {
        self.minify_js_with(JsSettings::default())
    }

    pub fn minify_js_with(&self, settings: JsSettings) -> Result<&Self> {
        self.add_transform(Arc::new(JsMinifier::new(settings)))
    }

    /// Seal the chain and return it.
    pub(crate) fn seal(&self) -> Vec<SharedTransform> {
        if self.is_sealed() {
            return self.transforms();
        }
        let transforms = self.transforms.write();
        self.sealed.store(true, Ordering::Release);
        transforms.clone()
    }

    /// Cache key of this asset for `context`. Seals the chain.
    pub fn fingerprint(&self, context: &RequestContext) -> Fingerprint {
        derive_key(&self.key, &self.seal(), context)
    }

    /// Read, concatenate and transform the sources.
    ///
    /// A transform that fails leaves the content as it was and the chain
    /// carries on with the next one.
    pub fn run(&self, provider: &dyn FileProvider) -> Result<String> {
        let transforms = self.seal();
        let mut content = self.read_sources(provider)?;

        for transform in &transforms {
            match transform.apply(&content) {
                Ok(output) => content = output,
                Err(e) => {
                    crate::debug!("transform"; "{}: {}, content left unchanged", self.route, e);
                }
            }
        }
        Ok(content)
    }

    fn read_sources(&self, provider: &dyn FileProvider) -> Result<String> {
        let mut content = String::new();
        for (i, path) in self.sources.iter().enumerate() {
            if i > 0 {
                content.push(SOURCE_SEPARATOR);
            }
            content.push_str(&read_text(provider, path)?);
        }
        Ok(content)
    }
}

/// Read a source as UTF-8 text.
pub(crate) fn read_text(provider: &dyn FileProvider, path: &Path) -> Result<String> {
    let bytes = provider
        .read_file(path)
        .map_err(|e| PipelineError::source_read(path, e))?;
    decode_text(path, bytes)
}

/// Decode file bytes as UTF-8, dropping a leading byte-order mark.
pub(crate) fn decode_text(path: &Path, bytes: Vec<u8>) -> Result<String> {
    let text = String::from_utf8(bytes).map_err(|e| {
        PipelineError::source_read(path, io::Error::new(io::ErrorKind::InvalidData, e))
    })?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Append a CSS minifier to every asset.
pub fn minify_css_all(assets: &[Arc<Asset>]) -> Result<()> {
    assets.iter().try_for_each(|asset| asset.minify_css().map(|_| ()))
}

/// Append a JavaScript minifier to every asset.
pub fn minify_js_all(assets: &[Arc<Asset>]) -> Result<()> {
    assets.iter().try_for_each(|asset| asset.minify_js().map(|_| ()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryFileProvider;
    use crate::transform::{ContentTransform, TransformError};

    #[derive(Debug)]
    struct Append(&'static str);

    impl ContentTransform for Append {
        fn identity(&self) -> String {
            format!("append:{}", self.0)
        }

        fn apply(&self, input: &str) -> Result<String, TransformError> {
            Ok(format!("{input}{}", self.0))
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl ContentTransform for Broken {
        fn identity(&self) -> String {
            "broken".into()
        }

        fn apply(&self, _input: &str) -> Result<String, TransformError> {
            Err(TransformError::Parse {
                transform: "broken",
                message: "unexpected token".into(),
            })
        }
    }

    fn asset(sources: &[&str], transforms: Vec<SharedTransform>) -> Asset {
        Asset::new(
            "/bundle.css".into(),
            sources.iter().map(PathBuf::from).collect(),
            transforms,
        )
    }

    fn provider() -> MemoryFileProvider {
        let provider = MemoryFileProvider::new();
        provider.write("a.css", "body { display: block; }");
        provider.write("b.css", "h1 { display: none; }");
        provider
    }

    #[test]
    fn test_pass_through_concatenation() {
        let provider = provider();
        let out = asset(&["a.css", "b.css"], vec![]).run(&provider).unwrap();
        assert_eq!(out, "body { display: block; }\nh1 { display: none; }");
    }

    #[test]
    fn test_single_source_has_no_separator() {
        let provider = provider();
        let out = asset(&["b.css"], vec![]).run(&provider).unwrap();
        assert_eq!(out, "h1 { display: none; }");
    }

    #[test]
    fn test_transforms_run_in_order() {
        let provider = provider();
        let chain: Vec<SharedTransform> = vec![Arc::new(Append("1")), Arc::new(Append("2"))];
        let out = asset(&["b.css"], chain).run(&provider).unwrap();
        assert!(out.ends_with("}12"));
    }

    #[test]
    fn test_failing_transform_passes_content_through() {
        let provider = provider();
        let chain: Vec<SharedTransform> =
            vec![Arc::new(Append("<")), Arc::new(Broken), Arc::new(Append(">"))];
        let out = asset(&["b.css"], chain).run(&provider).unwrap();
        assert_eq!(out, "h1 { display: none; }<>");
    }

    #[test]
    fn test_minify_concatenation() {
        let provider = provider();
        let asset = asset(&["a.css", "b.css"], vec![]);
        asset.minify_css().unwrap();
        assert_eq!(
            asset.run(&provider).unwrap(),
            "body{display:block}h1{display:none}"
        );
    }

    #[test]
    fn test_malformed_js_left_unchanged() {
        let provider = MemoryFileProvider::new();
        provider.write("broken.js", "if (");
        let asset = asset(&["broken.js"], vec![]);
        asset.minify_js().unwrap();
        assert_eq!(asset.run(&provider).unwrap(), "if (");
    }

    #[test]
    fn test_missing_source_names_path() {
        let provider = provider();
        let err = asset(&["a.css", "gone.css"], vec![])
            .run(&provider)
            .unwrap_err();
        match err {
            PipelineError::SourceRead { path, source } => {
                assert_eq!(path, PathBuf::from("gone.css"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bom_stripped() {
        let provider = MemoryFileProvider::new();
        provider.write("a.css", "\u{feff}a{}");
        provider.write("b.css", "\u{feff}b{}");
        let out = asset(&["a.css", "b.css"], vec![]).run(&provider).unwrap();
        assert_eq!(out, "a{}\nb{}");
    }

    #[test]
    fn test_invalid_utf8_is_read_error() {
        let provider = MemoryFileProvider::new();
        provider.write("bin.css", vec![0xff, 0xfe, 0x00]);
        let err = asset(&["bin.css"], vec![]).run(&provider).unwrap_err();
        assert!(matches!(err, PipelineError::SourceRead { .. }));
    }

    #[test]
    fn test_chain_sealed_after_run() {
        let provider = provider();
        let asset = asset(&["a.css"], vec![]);
        asset.minify_css().unwrap().minify_css().unwrap();
        assert_eq!(asset.transforms().len(), 2);

        asset.run(&provider).unwrap();
        assert!(asset.is_sealed());
        let err = asset.minify_js().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));
        assert_eq!(asset.transforms().len(), 2);
    }

    #[test]
    fn test_fingerprint_tracks_chain() {
        let plain = asset(&["a.css"], vec![]);
        let minified = asset(&["a.css"], vec![]);
        minified.minify_css().unwrap();
        let ctx = RequestContext::new();
        assert_ne!(plain.fingerprint(&ctx), minified.fingerprint(&ctx));
        assert_eq!(minified.fingerprint(&ctx), minified.fingerprint(&ctx));
    }

    #[test]
    fn test_minify_all() {
        let assets = vec![
            Arc::new(asset(&["a.css"], vec![])),
            Arc::new(asset(&["b.css"], vec![])),
        ];
        minify_css_all(&assets).unwrap();
        minify_js_all(&assets).unwrap();
        assert!(assets.iter().all(|a| a.transforms().len() == 2));
    }
}

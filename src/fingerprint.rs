//! Cache-key derivation.
//!
//! A fingerprint is a blake3 digest over the route, the ordered transform
//! identities and each transform's request-context contribution. Every field
//! is length-prefixed, so `("ab", "c")` and `("a", "bc")` never collide.

use std::collections::BTreeMap;
use std::fmt;

use crate::transform::SharedTransform;

/// Bumped whenever the key layout changes.
const KEY_VERSION: &[u8] = b"tola-bundle/1";

const TAG_ASSET: u8 = 0;
const TAG_RAW: u8 = 1;

/// A 256-bit cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 16 hex chars are plenty for logs
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Request-scoped values a transform may key its output on.
///
/// Opaque to the pipeline; ordered so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    values: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Derive the fingerprint of one asset invocation.
///
/// `route` must already be normalized (see [`crate::utils::path::route_key`]).
pub fn derive_key(
    route: &str,
    transforms: &[SharedTransform],
    context: &RequestContext,
) -> Fingerprint {
    let mut hasher = KeyHasher::new(TAG_ASSET);
    hasher.field(route.as_bytes());
    hasher.count(transforms.len());
    for transform in transforms {
        hasher.field(transform.identity().as_bytes());
        hasher.field(transform.cache_key(context).as_bytes());
    }
    hasher.finish()
}

/// Fingerprint of a raw file served without an asset.
pub fn raw_key(route: &str) -> Fingerprint {
    let mut hasher = KeyHasher::new(TAG_RAW);
    hasher.field(route.as_bytes());
    hasher.finish()
}

struct KeyHasher(blake3::Hasher);

impl KeyHasher {
    fn new(tag: u8) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(KEY_VERSION);
        hasher.update(&[tag]);
        Self(hasher)
    }

    fn count(&mut self, n: usize) {
        self.0.update(&(n as u64).to_le_bytes());
    }

    fn field(&mut self, bytes: &[u8]) {
        self.count(bytes.len());
        self.0.update(bytes);
    }

    fn finish(self) -> Fingerprint {
        Fingerprint::new(*self.0.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{
        ContentTransform, CssMinifier, CssSettings, JsMinifier, TransformError,
    };
    use std::sync::Arc;

    /// Keys on the negotiated encoding.
    #[derive(Debug)]
    struct EncodingAware;

    impl ContentTransform for EncodingAware {
        fn identity(&self) -> String {
            "encoding-aware".into()
        }

        fn cache_key(&self, context: &RequestContext) -> String {
            context.get("accept-encoding").unwrap_or_default().to_string()
        }

        fn apply(&self, input: &str) -> Result<String, TransformError> {
            Ok(input.to_string())
        }
    }

    fn css() -> SharedTransform {
        Arc::new(CssMinifier::default())
    }

    fn js() -> SharedTransform {
        Arc::new(JsMinifier::default())
    }

    #[test]
    fn test_deterministic() {
        let ctx = RequestContext::new();
        let chain = vec![css(), js()];
        assert_eq!(
            derive_key("/site.css", &chain, &ctx),
            derive_key("/site.css", &[css(), js()], &ctx)
        );
    }

    #[test]
    fn test_route_changes_key() {
        let ctx = RequestContext::new();
        assert_ne!(
            derive_key("/a.css", &[css()], &ctx),
            derive_key("/b.css", &[css()], &ctx)
        );
    }

    #[test]
    fn test_chain_order_and_membership_change_key() {
        let ctx = RequestContext::new();
        let base = derive_key("/x", &[css(), js()], &ctx);
        assert_ne!(base, derive_key("/x", &[js(), css()], &ctx));
        assert_ne!(base, derive_key("/x", &[css()], &ctx));
        assert_ne!(base, derive_key("/x", &[css(), js(), js()], &ctx));
        assert_ne!(base, derive_key("/x", &[], &ctx));
    }

    #[test]
    fn test_settings_change_key() {
        let ctx = RequestContext::new();
        let tolerant: SharedTransform = Arc::new(CssMinifier::new(CssSettings {
            error_recovery: true,
            ..CssSettings::default()
        }));
        assert_ne!(
            derive_key("/x", &[css()], &ctx),
            derive_key("/x", &[tolerant], &ctx)
        );
    }

    #[test]
    fn test_context_ignored_by_default() {
        let plain = RequestContext::new();
        let br = RequestContext::new().with("accept-encoding", "br");
        assert_eq!(
            derive_key("/x", &[css()], &plain),
            derive_key("/x", &[css()], &br)
        );
    }

    #[test]
    fn test_context_used_when_transform_opts_in() {
        let chain: Vec<SharedTransform> = vec![Arc::new(EncodingAware)];
        let gzip = RequestContext::new().with("accept-encoding", "gzip");
        let br = RequestContext::new().with("accept-encoding", "br");
        assert_ne!(derive_key("/x", &chain, &gzip), derive_key("/x", &chain, &br));
        assert_eq!(
            derive_key("/x", &chain, &br),
            derive_key("/x", &chain, &br.clone())
        );
    }

    #[test]
    fn test_raw_key_distinct_from_empty_chain() {
        let ctx = RequestContext::new();
        assert_ne!(raw_key("/x"), derive_key("/x", &[], &ctx));
        assert_eq!(raw_key("/x"), raw_key("/x"));
    }

    #[test]
    fn test_hex_roundtrip_and_display() {
        let fp = raw_key("/site.css");
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()), Some(fp));
        assert_eq!(fp.to_string().len(), 16);
        assert_eq!(Fingerprint::from_hex("abcd"), None);
    }
}

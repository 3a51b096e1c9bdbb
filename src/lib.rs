//! An in-process asset pipeline.
//!
//! Routes such as `/site.css` resolve to an ordered list of source files. The
//! sources are concatenated, run through a chain of content transforms
//! (minification out of the box) and cached under a fingerprint of the route,
//! the chain and the request context. Every cached result watches the files
//! it was built from and is evicted as soon as one of them changes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tola_bundle::{AssetPipeline, FileChangeWatcher, PhysicalFileProvider, RequestContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = PhysicalFileProvider::new("wwwroot", FileChangeWatcher::native()?);
//! let pipeline = AssetPipeline::new(Arc::new(provider));
//! pipeline
//!     .register("/site.css", ["css/a.css", "css/b.css"], vec![])?
//!     .minify_css()?;
//!
//! let output = pipeline.execute("/site.css?v=3", &RequestContext::new())?;
//! println!("{}", output.content);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Structure
//!
//! ```text
//! ├── pipeline     # AssetPipeline: registry, execution, single-flight
//! ├── asset        # Asset: sources + transform chain
//! ├── transform    # ContentTransform, CSS/JS minifiers
//! ├── fingerprint  # Cache key derivation
//! ├── cache        # ResultCache with watch-token invalidation
//! ├── watch        # FileChangeWatcher (notify)
//! ├── provider     # FileProvider: disk and memory
//! ├── config       # bundle.toml
//! ├── logger       # log!/debug! macros
//! └── utils        # Path and route helpers
//! ```

pub mod logger;

pub mod asset;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod provider;
pub mod transform;
pub mod utils;
pub mod watch;

pub use asset::{Asset, minify_css_all, minify_js_all};
pub use cache::{CacheStats, Cached, Reservation, ResultCache};
pub use config::{BundleConfig, ConfigError};
pub use error::{PipelineError, Result};
pub use fingerprint::{Fingerprint, RequestContext, derive_key, raw_key};
pub use pipeline::{AssetPipeline, Lookup, Output};
pub use provider::{FileProvider, MemoryFileProvider, PhysicalFileProvider};
pub use transform::{
    ContentTransform, CssMinifier, CssSettings, JsMinifier, JsSettings, MinifyKind,
    SharedTransform, TransformError,
};
pub use watch::{FileChangeWatcher, OnChange, WatchError, WatchToken};

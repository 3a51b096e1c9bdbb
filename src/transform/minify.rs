//! JS and CSS minification transforms.
//!
//! Uses oxc for JavaScript and lightningcss for CSS.

use std::path::Path;
use std::sync::Arc;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use serde::{Deserialize, Serialize};

use super::{ContentTransform, SharedTransform, TransformError, identity_of};

// ============================================================================
// CSS
// ============================================================================

/// lightningcss settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CssSettings {
    /// Merge and shorten rules before printing.
    pub optimize: bool,
    /// Drop invalid rules instead of failing the whole stylesheet.
    pub error_recovery: bool,
}

impl Default for CssSettings {
    fn default() -> Self {
        Self {
            optimize: true,
            error_recovery: false,
        }
    }
}

/// Minifies CSS.
#[derive(Debug, Clone, Default)]
pub struct CssMinifier {
    pub settings: CssSettings,
}

impl CssMinifier {
    pub fn new(settings: CssSettings) -> Self {
        Self { settings }
    }
}

impl ContentTransform for CssMinifier {
    fn identity(&self) -> String {
        identity_of("minify-css", &self.settings)
    }

    fn apply(&self, input: &str) -> Result<String, TransformError> {
        let options = ParserOptions {
            error_recovery: self.settings.error_recovery,
            ..ParserOptions::default()
        };
        let mut stylesheet =
            StyleSheet::parse(input, options).map_err(|e| TransformError::Parse {
                transform: "minify-css",
                message: e.to_string(),
            })?;

        if self.settings.optimize {
            stylesheet
                .minify(MinifyOptions::default())
                .map_err(|e| TransformError::Output {
                    transform: "minify-css",
                    message: e.to_string(),
                })?;
        }

        let result = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..PrinterOptions::default()
            })
            .map_err(|e| TransformError::Output {
                transform: "minify-css",
                message: e.to_string(),
            })?;
        Ok(result.code)
    }
}

// ============================================================================
// JavaScript
// ============================================================================

/// oxc settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsSettings {
    /// Rename local bindings.
    pub mangle: bool,
    /// Apply compression passes.
    pub compress: bool,
    /// Parse as an ES module rather than a classic script.
    pub module: bool,
}

impl Default for JsSettings {
    fn default() -> Self {
        Self {
            mangle: true,
            compress: true,
            module: true,
        }
    }
}

/// Minifies JavaScript.
#[derive(Debug, Clone, Default)]
pub struct JsMinifier {
    pub settings: JsSettings,
}

impl JsMinifier {
    pub fn new(settings: JsSettings) -> Self {
        Self { settings }
    }
}

impl ContentTransform for JsMinifier {
    fn identity(&self) -> String {
        identity_of("minify-js", &self.settings)
    }

    fn apply(&self, input: &str) -> Result<String, TransformError> {
        let allocator = Allocator::default();
        let source_type = if self.settings.module {
            SourceType::mjs()
        } else {
            SourceType::cjs()
        };
        let ret = Parser::new(&allocator, input, source_type).parse();
        if let Some(error) = ret.errors.first() {
            return Err(TransformError::Parse {
                transform: "minify-js",
                message: error.to_string(),
            });
        }

        let mut program = ret.program;
        let options = MinifierOptions {
            mangle: self.settings.mangle.then(MangleOptions::default),
            compress: self.settings.compress.then(CompressOptions::smallest),
        };
        let ret = Minifier::new(options).minify(&allocator, &mut program);
        let code = Codegen::new()
            .with_options(CodegenOptions {
                minify: true,
                comments: CommentOptions::disabled(),
                ..CodegenOptions::default()
            })
            .with_scoping(ret.scoping)
            .build(&program)
            .code;
        Ok(code)
    }
}

// ============================================================================
// Selection by extension
// ============================================================================

/// Which minifier a file extension calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinifyKind {
    Css,
    Js,
}

impl MinifyKind {
    /// Pick the minifier for a path or route (`.css`, `.js`, `.mjs`).
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "css" => Some(Self::Css),
            "js" | "mjs" => Some(Self::Js),
            _ => None,
        }
    }

    /// Default-configured transform for this kind.
    pub fn transform(self) -> SharedTransform {
        match self {
            Self::Css => Arc::new(CssMinifier::default()),
            Self::Js => Arc::new(JsMinifier::default()),
        }
    }
}

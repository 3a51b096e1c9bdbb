//! `list` command.

use std::io::Write;

use anyhow::Result;
use owo_colors::OwoColorize;
use tola_bundle::AssetPipeline;

/// Print one block per bundle: route, sources, transform chain.
pub fn run_list(pipeline: &AssetPipeline, out: &mut impl Write) -> Result<()> {
    let assets = pipeline.assets();
    if assets.is_empty() {
        writeln!(out, "{}", "no bundles configured".dimmed())?;
        return Ok(());
    }

    for asset in assets {
        writeln!(out, "{}", asset.route().bold())?;
        for source in asset.sources() {
            writeln!(out, "  {} {}", "+".green(), source.display())?;
        }
        for transform in asset.transforms() {
            writeln!(out, "  {} {}", "~".cyan(), transform.identity())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tola_bundle::MemoryFileProvider;

    #[test]
    fn test_list() {
        owo_colors::set_override(false);
        let pipeline = AssetPipeline::new(Arc::new(MemoryFileProvider::new()));
        let mut out = Vec::new();
        run_list(&pipeline, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "no bundles configured\n");

        pipeline
            .register("/site.css", ["a.css", "b.css"], vec![])
            .unwrap()
            .minify_css()
            .unwrap();
        let mut out = Vec::new();
        run_list(&pipeline, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("/site.css\n  + a.css\n  + b.css\n  ~ minify-css"));
    }
}

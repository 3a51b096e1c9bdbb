//! `get` command.

use std::io::Write;

use anyhow::{Context, Result};
use serde_json::json;
use tola_bundle::{AssetPipeline, RequestContext};

use super::GetArgs;

/// Execute a route and print what a front end would serve.
pub fn run_get(pipeline: &AssetPipeline, args: &GetArgs, out: &mut impl Write) -> Result<()> {
    let context = args
        .context
        .iter()
        .fold(RequestContext::new(), |ctx, (k, v)| ctx.with(k, v));

    let output = pipeline
        .execute(&args.route, &context)
        .with_context(|| format!("failed to execute `{}`", args.route))?;

    if args.json {
        let value = json!({
            "route": args.route,
            "fingerprint": output.fingerprint.to_hex(),
            "files": output.files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "content": output.content.as_ref(),
        });
        serde_json::to_writer_pretty(&mut *out, &value)?;
        writeln!(out)?;
    } else {
        out.write_all(output.content.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tola_bundle::MemoryFileProvider;

    fn pipeline() -> AssetPipeline {
        let provider = Arc::new(MemoryFileProvider::new());
        provider.write("a.css", "a { display: none; }");
        let pipeline = AssetPipeline::new(provider);
        pipeline
            .register("/site.css", ["a.css"], vec![])
            .unwrap()
            .minify_css()
            .unwrap();
        pipeline
    }

    fn args(route: &str, json: bool) -> GetArgs {
        GetArgs {
            route: route.to_string(),
            context: vec![("encoding".into(), "br".into())],
            json,
        }
    }

    #[test]
    fn test_get_plain() {
        let mut out = Vec::new();
        run_get(&pipeline(), &args("/site.css", false), &mut out).unwrap();
        assert_eq!(out, b"a{display:none}");
    }

    #[test]
    fn test_get_json() {
        let mut out = Vec::new();
        run_get(&pipeline(), &args("/site.css?v=1", true), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["content"], "a{display:none}");
        assert_eq!(value["files"], json!(["a.css"]));
        assert_eq!(value["fingerprint"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_get_missing() {
        let mut out = Vec::new();
        let err = run_get(&pipeline(), &args("/nope.css", false), &mut out).unwrap_err();
        assert!(format!("{err:#}").contains("doesn't exist"));
    }
}

//! Recursive fibonacci, traced into a SQLite log and dumped with tabs
//!
//! ```text
//! cargo run --example fib -- [LOG_PATH]
//! calltrace dump --tab "    " log.sqlite
//! ```

use std::io;

use anyhow::{Context, Result};
use calltrace::{Reader, RenderConfig, SqliteContainer, TextRenderer, Tracer};

fn fib(tracer: &Tracer<'_>, n: i64) -> Result<Option<i64>> {
    let call = format!("fib({n})");
    let w = tracer.writer(Some(call.as_str()))?;
    if n < 0 {
        w.write("n < 0 => return None")?;
        return Ok(None);
    }
    if n == 0 {
        w.write("n = 0 => return 0")?;
        return Ok(Some(0));
    }
    if n == 1 || n == 2 {
        w.write("n = (1|2) => return 1")?;
        return Ok(Some(1));
    }

    w.write(format!("Calculate fib({n}-1) + fib({n}-2)"))?;
    let left = fib(tracer, n - 1)?.unwrap_or(0);
    let right = fib(tracer, n - 2)?.unwrap_or(0);
    let r = left + right;
    w.write(format!("fib({n}-1) + fib({n}-2) = {r}"))?;
    Ok(Some(r))
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "log.sqlite".to_string());
    let container =
        SqliteContainer::create(&path).with_context(|| format!("creating log '{path}'"))?;

    {
        let tracer = Tracer::new(&container)?;
        let x = 6;
        let w = tracer.scope("Start the script")?;
        w.dump(Some("x"), &x)?;
        let r = fib(&tracer, x)?;
        w.write_list([("input", x.to_string()), ("result", format!("{r:?}"))])?;
        w.write("End of the script")?;
    }

    let reader = Reader::new(&container)?;
    let renderer = TextRenderer::new(RenderConfig {
        indent: "\t".to_string(),
        timestamps: false,
    });
    let stats = renderer.dump(&reader, &mut io::stdout().lock())?;
    eprintln!("{} lines written, log stored in {}", stats.lines, path);
    Ok(())
}

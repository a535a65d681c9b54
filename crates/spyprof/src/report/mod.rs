//! HTML heat-map reports.
//!
//! One self-contained document per clock: every sampled source file that
//! still exists (and is not an installed library) is printed in full, each
//! line prefixed with its weight and tinted from white to red by intensity.

mod filter;
mod heat;
mod highlight;

pub use filter::LibraryRoots;
pub use heat::{Rgb, Scale, Weighting, heat, saturation};
pub use highlight::{Highlighter, PlainHighlighter, RustHighlighter, escape};

use crate::config::Config;
use crate::symbols::SourceLocation;
use crate::table::ClockSamples;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const PAGE_STYLE: &str = "h1, pre { margin: 0.2em; }";

/// Renders location tables as HTML
pub struct Reporter {
    weighting: Weighting,
    samples_per_second: u32,
    roots: LibraryRoots,
    highlighter: Box<dyn Highlighter>,
}

impl Reporter {
    pub fn new(weighting: Weighting, samples_per_second: u32, roots: LibraryRoots) -> Self {
        Reporter {
            weighting,
            samples_per_second,
            roots,
            highlighter: Box::new(RustHighlighter),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.weighting,
            config.samples_per_second,
            config.library_roots.clone(),
        )
    }

    pub fn with_highlighter(mut self, highlighter: Box<dyn Highlighter>) -> Self {
        self.highlighter = highlighter;
        self
    }

    /// Render one clock's samples as a complete HTML document.
    ///
    /// Files are emitted in path order, so the output depends only on the
    /// table and the files on disk.
    pub fn render(&self, samples: &ClockSamples<SourceLocation>) -> String {
        let mut out = String::new();
        out.push_str("<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n");
        let stylesheet = self.highlighter.stylesheet();
        if !stylesheet.is_empty() {
            out.push_str(&stylesheet);
            out.push('\n');
        }
        out.push_str(PAGE_STYLE);
        out.push_str("\n</style>\n</head>\n<body>\n");

        for file in samples.table.files() {
            let path = Path::new(file);
            if !self.roots.is_renderable(path) {
                tracing::debug!("Skipping {}", file);
                continue;
            }

            let lines = samples.table.lines_of(file);
            if let Err(e) = self.render_file(&mut out, path, &lines, samples.total) {
                tracing::debug!("Skipping {}: {}", file, e);
            }
        }

        out.push_str("</body>\n</html>\n");
        out
    }

    fn render_file(
        &self,
        out: &mut String,
        path: &Path,
        lines: &HashMap<u32, u64>,
        total: u64,
    ) -> std::io::Result<()> {
        let bytes = fs::read(path)?;
        let source = String::from_utf8_lossy(&bytes);

        let scale = Scale {
            weighting: self.weighting,
            total,
            file_max: lines.values().copied().max().unwrap_or(0),
            samples_per_second: self.samples_per_second,
        };

        let labels: HashMap<u32, String> = lines
            .iter()
            .map(|(&line, &count)| (line, scale.label(count)))
            .collect();
        let width = labels
            .values()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(self.weighting.label_width());

        out.push_str(&format!("<h1>{}</h1>\n", escape(&path.to_string_lossy())));

        for (idx, text) in source.lines().enumerate() {
            let line = idx as u32 + 1;
            let body = if text.trim().is_empty() {
                "&nbsp;".to_string()
            } else {
                self.highlighter.highlight(text)
            };

            match (lines.get(&line), labels.get(&line)) {
                (Some(&count), Some(label)) => {
                    out.push_str(&format!(
                        "<pre style=\"background: {}\">{:>width$} {}</pre>\n",
                        heat(scale.intensity(count)),
                        label,
                        body,
                    ));
                }
                _ => {
                    out.push_str(&format!("<pre>{:width$} {}</pre>\n", "", body));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::HitTable;
    use tempfile::TempDir;

    fn reporter(weighting: Weighting) -> Reporter {
        Reporter::new(weighting, 100, LibraryRoots::none())
            .with_highlighter(Box::new(PlainHighlighter))
    }

    fn write_source(dir: &TempDir, name: &str, text: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn samples(entries: &[(&str, u32, u64)], total: u64) -> ClockSamples<SourceLocation> {
        let table: HitTable<SourceLocation> = entries
            .iter()
            .map(|&(file, line, count)| (SourceLocation::new(file, line), count))
            .collect();
        ClockSamples { table, total }
    }

    fn pre_lines(html: &str) -> Vec<&str> {
        html.lines().filter(|l| l.starts_with("<pre")).collect()
    }

    #[test]
    fn test_percentage_report() {
        let dir = TempDir::new().unwrap();
        let file = write_source(&dir, "main.rs", "fn a() {}\n\nfn b() {}\n");
        let html = reporter(Weighting::Percentage).render(&samples(&[(&file, 1, 3), (&file, 3, 1)], 4));

        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains(PAGE_STYLE));
        assert_eq!(html.matches("<h1>").count(), 1);
        assert_eq!(
            pre_lines(&html),
            [
                "<pre style=\"background: #ff4040\"> 75.0% fn a() {}</pre>",
                "<pre>       &nbsp;</pre>",
                "<pre style=\"background: #ffbfbf\"> 25.0% fn b() {}</pre>",
            ]
        );
    }

    #[test]
    fn test_columns_stay_aligned() {
        let dir = TempDir::new().unwrap();
        let file = write_source(&dir, "lib.rs", "a\nb\nc\nd\n");
        let html = reporter(Weighting::Duration).render(&samples(&[(&file, 2, 123_456)], 200_000));

        let offsets: Vec<usize> = pre_lines(&html)
            .iter()
            .map(|l| {
                let content = &l[l.find('>').unwrap() + 1..];
                content.rfind(' ').unwrap()
            })
            .collect();
        assert_eq!(offsets.len(), 4);
        // "1234.56s" is wider than the default label width
        assert!(offsets.iter().all(|&o| o == 8));
    }

    #[test]
    fn test_duration_saturates_each_files_hottest_line() {
        let dir = TempDir::new().unwrap();
        let a = write_source(&dir, "a.rs", "x\ny\n");
        let b = write_source(&dir, "b.rs", "z\n");
        let html = reporter(Weighting::Duration)
            .render(&samples(&[(&a, 1, 40), (&a, 2, 10), (&b, 1, 2)], 1000));

        assert_eq!(html.matches("#ff0000").count(), 2);
        assert!(html.contains("  0.40s x"));
        assert!(html.contains("  0.02s z"));
    }

    #[test]
    fn test_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let vendored = dir.path().join("registry");
        fs::create_dir_all(&vendored).unwrap();
        let dep = vendored.join("dep.rs");
        fs::write(&dep, "dep\n").unwrap();
        let dep = dep.to_string_lossy().into_owned();

        let b = write_source(&dir, "b.rs", "b\n");
        let a = write_source(&dir, "a & c.rs", "a\n");
        let gone = dir.path().join("gone.rs").to_string_lossy().into_owned();

        let table = samples(&[(&b, 1, 1), (&a, 1, 1), (&dep, 1, 1), (&gone, 1, 1)], 4);
        let html = Reporter::new(Weighting::Percentage, 100, LibraryRoots::new([vendored]))
            .render(&table);

        let headings: Vec<&str> = html.lines().filter(|l| l.starts_with("<h1>")).collect();
        assert_eq!(headings.len(), 2);
        assert!(headings[0].ends_with("a &amp; c.rs</h1>"));
        assert!(headings[1].ends_with("b.rs</h1>"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let files: Vec<String> = (0..8)
            .map(|i| write_source(&dir, &format!("f{}.rs", i), "let x = 1;\n"))
            .collect();
        let entries: Vec<(&str, u32, u64)> =
            files.iter().map(|f| (f.as_str(), 1, 1)).collect();
        let table = samples(&entries, 8);

        let reporter = Reporter::new(Weighting::Percentage, 100, LibraryRoots::none());
        assert_eq!(reporter.render(&table), reporter.render(&table));
        assert!(reporter.render(&table).contains("<span class=\"k\">let</span>"));
    }

    #[test]
    fn test_invalid_utf8_is_rendered_lossily() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bin.rs");
        fs::write(&path, b"ok\n\xff\xfe\n").unwrap();
        let file = path.to_string_lossy().into_owned();

        let html = reporter(Weighting::Percentage).render(&samples(&[(&file, 2, 1)], 1));
        assert_eq!(pre_lines(&html).len(), 2);
        assert!(html.contains("100.0% \u{fffd}\u{fffd}"));
    }
}

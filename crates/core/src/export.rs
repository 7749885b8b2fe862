use crate::cover::CoverImage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export: no chapters have been generated yet")]
    NothingToExport,
    #[error("failed to write export file `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes the manuscript as plain Markdown, exactly as generated.
pub fn export_markdown(title: &str, manuscript: &str, path: &Path) -> Result<(), ExportError> {
    if manuscript.trim().is_empty() {
        return Err(ExportError::NothingToExport);
    }
    let document = format!("# {title}\n\n{manuscript}\n");
    fs::write(path, document).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a Word-compatible HTML document (the `.doc` trick: Word opens HTML
/// carrying its Office namespaces as a native document).
pub fn export_word(
    title: &str,
    manuscript: &str,
    cover: Option<&CoverImage>,
    path: &Path,
) -> Result<(), ExportError> {
    if manuscript.trim().is_empty() {
        return Err(ExportError::NothingToExport);
    }
    let html = render_word_html(title, manuscript, cover);
    fs::write(path, html).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn render_word_html(title: &str, manuscript: &str, cover: Option<&CoverImage>) -> String {
    let mut body = String::new();
    if let Some(cover) = cover {
        body.push_str(&format!(
            "<img src=\"{}\" style=\"width:100%;max-width:640px\"><br clear=\"all\">\n",
            cover.data_uri()
        ));
    }
    body.push_str(&format!(
        "<h1>{}</h1>\n",
        html_escape::encode_text(title)
    ));
    body.push_str(&markdown_to_html(manuscript));

    format!(
        concat!(
            "<html xmlns:o='urn:schemas-microsoft-com:office:office' ",
            "xmlns:w='urn:schemas-microsoft-com:office:word' ",
            "xmlns='http://www.w3.org/TR/REC-html40'>\n",
            "<head><meta charset='utf-8'><title>{title}</title>\n",
            "<style>body{{font-family:Calibri,sans-serif;line-height:1.5}} ",
            "pre{{background:#f4f4f4;padding:8pt;font-family:Consolas,monospace}}</style>\n",
            "</head>\n<body>\n{body}</body>\n</html>\n"
        ),
        title = html_escape::encode_text(title),
        body = body,
    )
}

/// Minimal Markdown rendering: headings, fenced code blocks, horizontal
/// rules and paragraphs. Inline markup is left verbatim; Word renders it as
/// plain text, which matches the original export.
fn markdown_to_html(markdown: &str) -> String {
    let mut html = String::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut code: Option<Vec<&str>> = None;

    let flush_paragraph = |html: &mut String, paragraph: &mut Vec<&str>| {
        if !paragraph.is_empty() {
            html.push_str("<p>");
            html.push_str(&html_escape::encode_text(&paragraph.join(" ")));
            html.push_str("</p>\n");
            paragraph.clear();
        }
    };

    for line in markdown.lines() {
        if let Some(block) = code.as_mut() {
            if line.trim_start().starts_with("```") {
                html.push_str("<pre><code>");
                html.push_str(&html_escape::encode_text(&block.join("\n")));
                html.push_str("</code></pre>\n");
                code = None;
            } else {
                block.push(line);
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            flush_paragraph(&mut html, &mut paragraph);
            code = Some(Vec::new());
        } else if trimmed == "---" {
            flush_paragraph(&mut html, &mut paragraph);
            html.push_str("<hr>\n");
        } else if let Some(heading) = parse_heading(trimmed) {
            flush_paragraph(&mut html, &mut paragraph);
            html.push_str(&heading);
        } else if trimmed.is_empty() {
            flush_paragraph(&mut html, &mut paragraph);
        } else {
            paragraph.push(trimmed);
        }
    }

    // An unterminated fence is rendered as code rather than dropped.
    if let Some(block) = code {
        html.push_str("<pre><code>");
        html.push_str(&html_escape::encode_text(&block.join("\n")));
        html.push_str("</code></pre>\n");
    }
    flush_paragraph(&mut html, &mut paragraph);
    html
}

fn parse_heading(line: &str) -> Option<String> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = line[hashes..].strip_prefix(' ')?;
    Some(format!(
        "<h{hashes}>{}</h{hashes}>\n",
        html_escape::encode_text(rest.trim())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn markdown_export_prepends_the_title() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.md");
        export_markdown("My Book", "## Chapter 1\n\nText.", &path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# My Book\n\n## Chapter 1"));
    }

    #[test]
    fn empty_manuscript_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            export_markdown("T", "  \n", &dir.path().join("x.md")),
            Err(ExportError::NothingToExport)
        ));
    }

    #[test]
    fn word_html_carries_office_namespaces() {
        let html = render_word_html("A < B", "## Heading\n\nBody text.", None);
        assert!(html.contains("urn:schemas-microsoft-com:office:word"));
        assert!(html.contains("<h1>A &lt; B</h1>"));
        assert!(html.contains("<h2>Heading</h2>"));
        assert!(html.contains("<p>Body text.</p>"));
    }

    #[test]
    fn code_fences_become_pre_blocks() {
        let html = render_word_html("T", "```rust\nlet x = 1 < 2;\n```", None);
        assert!(html.contains("<pre><code>let x = 1 &lt; 2;</code></pre>"));
    }

    #[test]
    fn cover_is_embedded_as_data_uri() {
        let cover = CoverImage::generated(&[1, 2, 3]);
        let html = render_word_html("T", "text", Some(&cover));
        assert!(html.contains("data:image/png;base64,AQID"));
    }

    #[test]
    fn separators_render_as_rules() {
        let html = render_word_html("T", "one\n\n---\n\ntwo", None);
        assert!(html.contains("<hr>"));
    }
}

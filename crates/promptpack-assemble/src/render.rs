//! Markup serialization of assembled files.

use quick_xml::escape::escape;

use promptpack_core::ContextFile;

/// Render included files as a `<context>` document.
///
/// Names, paths and contents are escaped for `<`, `>`, `&`, `'` and `"`.
pub fn render_document(files: &[ContextFile]) -> String {
    let mut lines = Vec::with_capacity(files.len() * 3 + 2);
    lines.push("<context>".to_string());
    for file in files {
        let name = file.name();
        let path = file.path.to_string_lossy();
        lines.push(format!(
            "    <file name='{}' path='{}' status='{}' tokens='{}'>",
            escape(name.as_str()),
            escape(path.as_ref()),
            file.status,
            file.token_count
        ));
        lines.push(escape(file.content.as_str()).into_owned());
        lines.push("    </file>".to_string());
    }
    lines.push("</context>".to_string());
    lines.join("\n")
}

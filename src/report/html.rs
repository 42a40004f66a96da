use comrak::{markdown_to_html, ComrakOptions};

const PAGE_STYLE: &str = "body { font-family: -apple-system, 'Segoe UI', sans-serif; \
max-width: 960px; margin: 2rem auto; padding: 0 1rem; color: #1f2328; } \
table { border-collapse: collapse; } \
th, td { border: 1px solid #d0d7de; padding: 4px 10px; } \
code { background: #f6f8fa; padding: 1px 4px; border-radius: 4px; } \
pre code { display: block; padding: 12px; overflow-x: auto; }";

/// Convert the rendered Markdown report into a standalone HTML page.
pub fn render(markdown: &str) -> String {
    let mut options = ComrakOptions::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.autolink = true;

    let body = markdown_to_html(markdown, &options);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Connectivity Analysis Report</title>\n<style>{}</style>\n</head>\n\
         <body>\n{}</body>\n</html>\n",
        PAGE_STYLE, body
    )
}

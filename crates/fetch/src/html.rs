/// Default directory listing page. Kept deliberately plain; callers
/// that want their own chrome install a renderer via
/// [`crate::config::Config::with_render_index`].
pub(crate) fn render_listing(url: &str, files: &[String]) -> String {
    let base = if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    };
    let mut items = String::new();
    for name in files {
        items.push_str(&format!(
            "      <li><a href=\"{base}{name}\">{name}</a></li>\n",
            base = base,
            name = name
        ));
    }
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Index of {url}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; max-width: 800px; margin: 40px auto; padding: 0 20px; }}
        li {{ line-height: 1.8; }}
    </style>
</head>
<body>
    <h1>Index of {url}</h1>
    <ul>
{items}    </ul>
</body>
</html>"#,
        url = url,
        items = items
    )
}

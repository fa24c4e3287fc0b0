//! Documentation rendering for registered commands.

/// Collapse a multi-line doc block into a single space-separated line.
pub(crate) fn collapse_doc(doc: &str) -> String {
    doc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fixed head of the markdown reference page.
const MARKDOWN_HEAD: &str = r#"# API Reference

## General structure
The API endpoint is `http://ip:port/api/v2?apikey=$apikey&cmd=$command`

Response example (default `json`)
```
{
    "response": {
        "data": [
            {
                "loglevel": "INFO",
                "msg": "Signal 2 caught, saving and exiting...",
                "thread": "main",
                "time": "2015-09-22 01:42:56"
            }
        ],
        "message": null,
        "result": "success"
    }
}
```
```
General optional parameters:

    out_type:   "json" or "xml"
    callback:   "pong"
    debug:      1
```

## API methods"#;

/// Render the full reference page from `(name, doc)` pairs, already sorted
/// by name. The page is wrapped in `<pre>` tags so it can be served as HTML
/// without further processing.
pub(crate) fn render_markdown_reference(entries: &[(String, Option<String>)]) -> String {
    let mut body = String::new();
    for (name, doc) in entries {
        body.push_str("### ");
        body.push_str(name);
        body.push('\n');
        if let Some(doc) = doc {
            body.push_str(doc);
            body.push('\n');
        }
        body.push_str("\n\n");
    }
    format!("<pre>{MARKDOWN_HEAD}\n\n{body}</pre>")
}

//! Server-rendered HTML pages.

/// Stream ids are lowercase alphanumerics.
pub fn is_valid_stream_id(stream_id: &str) -> bool {
    !stream_id.is_empty()
        && stream_id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Generate the HTML shell shared by every page.
fn html_shell(title: &str, content: &str, scripts: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - shout</title>
    <link rel="stylesheet" href="/static/app.css">
    {scripts}
</head>
<body>
    <header class="site-header">
        <a href="/" class="brand">shout</a>
    </header>
    <main id="app">
        {content}
    </main>
</body>
</html>"#
    )
}

/// Home page with usage instructions.
pub fn home() -> String {
    html_shell(
        "Home",
        r#"
        <h1>Pipe stdout to the webs</h1>
        <p>Run a command through the producer:</p>
        <pre class="code-line">shout run -- tail -f /var/log/syslog</pre>
        <p>It prints a page address like <code>/abcd</code>. Open it to watch the output live,
        or follow it from a terminal:</p>
        <pre class="code-line">shout watch abcd</pre>
        "#,
        "",
    )
}

/// Watch page for `stream_id`; the caller validates the id.
pub fn watch(stream_id: &str) -> String {
    let content = format!(
        r#"
        <input type="hidden" id="stream-id" value="{stream_id}">
        <div class="stream-header">
            <code id="source-command"></code>
            <div id="auto-scroll" class="auto-scroll" title="Toggle autoscroll">
                <span id="auto-scroll-on">autoscroll: on</span>
                <span id="auto-scroll-off" class="hidden">autoscroll: off</span>
            </div>
        </div>
        <div id="stream-data-table" class="stream-data-table"></div>
        <div id="stream-message" class="stream-message">Waiting for stream {stream_id}...</div>
        "#
    );
    html_shell(
        stream_id,
        &content,
        r#"<script src="/static/js/stream.js"></script>"#,
    )
}

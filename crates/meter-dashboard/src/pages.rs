//! Page rendering.

use askama::Template;
use axum::response::Html;
use meter_state::Snapshot;
use tracing::error;

use crate::views::MetricsView;

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(tmpl.render().unwrap_or_else(|e| {
        error!(error = %e, "template render failed");
        format!("<pre>Template error: {e}</pre>")
    }))
}

#[derive(Template)]
#[template(
    ext = "html",
    source = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Metrics</title></head>
<body>
<h1>Metrics</h1>
<p>{{ view.total() }} stored</p>
<h2>Gauges</h2>
<ul>
{% for row in view.gauges %}<li>{{ row.name }}: {{ row.value }}</li>
{% endfor %}</ul>
<h2>Counters</h2>
<ul>
{% for row in view.counters %}<li>{{ row.name }}: {{ row.value }}</li>
{% endfor %}</ul>
</body>
</html>
"#
)]
struct MetricsTemplate {
    view: MetricsView,
}

/// Render the full listing as HTML.
pub fn metrics_page(snapshot: &Snapshot) -> Html<String> {
    render(MetricsTemplate {
        view: MetricsView::from_snapshot(snapshot),
    })
}

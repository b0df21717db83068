//! Document rendering.
//!
//! [`DocumentRenderer`] turns a report record into self-contained HTML, the
//! input of the PDF exporter. [`render_markdown`] produces the plain-text
//! variant.

pub mod html;
pub mod markdown;

pub use html::{
    render_html, DocumentRenderer, MarkupDocument, CHARTS_SETTLED_FLAG, CHART_JS_URL,
    DEFAULT_PALETTE,
};
pub use markdown::render_markdown;

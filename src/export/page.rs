//! Physical page setup for pagination.

use serde_json::{json, Value};

/// Footer with page-number and total-page placeholders filled in by the engine.
pub const PAGE_NUMBER_FOOTER: &str =
    r#"<span class="pageNumber"></span> of <span class="totalPages"></span>"#;

/// Header and footer share this inline style; engines render them tiny otherwise.
const MARGIN_BOX_STYLE: &str =
    "font-size:9px;color:#7f8c8d;width:100%;text-align:center;padding:0 0.75in;";

/// Page size, margins and running header/footer. All lengths in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub print_background: bool,
    /// Emit the running header (title) and footer (page numbers).
    pub header_footer: bool,
}

impl PageSetup {
    /// A4 with 1in top/bottom and 0.75in side margins.
    pub fn a4() -> Self {
        Self {
            paper_width: 8.27,
            paper_height: 11.69,
            margin_top: 1.0,
            margin_bottom: 1.0,
            margin_left: 0.75,
            margin_right: 0.75,
            print_background: true,
            header_footer: true,
        }
    }

    pub fn without_header_footer(mut self) -> Self {
        self.header_footer = false;
        self
    }

    /// Running header carrying the document title, escaped.
    pub fn header_template(title: &str) -> String {
        format!(
            r#"<div style="{}">{}</div>"#,
            MARGIN_BOX_STYLE,
            tera::escape_html(title)
        )
    }

    pub fn footer_template() -> String {
        format!(r#"<div style="{}">{}</div>"#, MARGIN_BOX_STYLE, PAGE_NUMBER_FOOTER)
    }

    /// Parameters for the DevTools `Page.printToPDF` command.
    pub fn print_params(&self, title: &str) -> Value {
        let mut params = json!({
            "paperWidth": self.paper_width,
            "paperHeight": self.paper_height,
            "marginTop": self.margin_top,
            "marginBottom": self.margin_bottom,
            "marginLeft": self.margin_left,
            "marginRight": self.margin_right,
            "printBackground": self.print_background,
            "preferCSSPageSize": false,
            "displayHeaderFooter": self.header_footer,
        });
        if self.header_footer {
            params["headerTemplate"] = Value::String(Self::header_template(title));
            params["footerTemplate"] = Value::String(Self::footer_template());
        }
        params
    }
}

impl Default for PageSetup {
    fn default() -> Self {
        Self::a4()
    }
}

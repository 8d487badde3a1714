//! HTML templates for browser bindings.
//!
//! Templates use positional placeholders:
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{0}` | target URL |
//! | `{1}` | message parameter name (`SAMLRequest`/`SAMLResponse`) |
//! | `{2}` | base64 message |
//! | `{3}` | relay state |
//!
//! Values are HTML-escaped; a missing value renders as an empty string.

use std::path::Path;

use kc_core::SamlConfig;
use tracing::debug;

use crate::error::{SamlError, SamlResult};

const SUBMIT_FORM: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{0}">
        <input type="hidden" name="{1}" value="{2}"/>
        <input type="hidden" name="RelayState" value="{3}"/>
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#;

const REDIRECT_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="0;URL='{0}'">
    <title>Redirecting</title>
</head>
<body>
    <p>If you are not redirected, <a href="{0}">click here to continue</a>.</p>
</body>
</html>"#;

/// An HTML page with positional placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTemplate {
    source: String,
}

impl HtmlTemplate {
    /// Wraps template text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The built-in auto-submitting POST form.
    #[must_use]
    pub fn submit_form() -> Self {
        Self::new(SUBMIT_FORM)
    }

    /// The built-in redirect page.
    #[must_use]
    pub fn redirect_page() -> Self {
        Self::new(REDIRECT_PAGE)
    }

    /// Loads a template from a file.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] if the file cannot be read.
    pub fn from_file(path: &Path) -> SamlResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            SamlError::Configuration(format!("cannot read template {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded HTML template");
        Ok(Self::new(source))
    }

    /// Substitutes the placeholders.
    #[must_use]
    pub fn render(
        &self,
        url: Option<&str>,
        key: Option<&str>,
        value: Option<&str>,
        relay_state: Option<&str>,
    ) -> String {
        let values = [url, key, value, relay_state];
        let mut out = String::with_capacity(self.source.len() + 256);
        let mut rest = self.source.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let candidate = &rest[open..];
            let index = candidate
                .get(1..3)
                .filter(|s| s.ends_with('}'))
                .and_then(|s| s[..1].parse::<usize>().ok())
                .filter(|i| *i < values.len());
            match index {
                Some(i) => {
                    out.push_str(&html_escape(values[i].unwrap_or_default()));
                    rest = &candidate[3..];
                }
                None => {
                    out.push('{');
                    rest = &candidate[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// The pair of templates a deployment renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTemplates {
    /// Auto-submit POST form.
    pub submit_form: HtmlTemplate,
    /// Redirect page.
    pub redirect_page: HtmlTemplate,
}

impl Default for HtmlTemplates {
    fn default() -> Self {
        Self {
            submit_form: HtmlTemplate::submit_form(),
            redirect_page: HtmlTemplate::redirect_page(),
        }
    }
}

impl HtmlTemplates {
    /// Loads configured overrides, falling back to the built-in pages.
    ///
    /// ## Errors
    ///
    /// Returns [`SamlError::Configuration`] if a configured file is unreadable.
    pub fn from_config(config: &SamlConfig) -> SamlResult<Self> {
        Ok(Self {
            submit_form: config
                .submit_form_template
                .as_deref()
                .map_or_else(|| Ok(HtmlTemplate::submit_form()), HtmlTemplate::from_file)?,
            redirect_page: config
                .redirect_page_template
                .as_deref()
                .map_or_else(|| Ok(HtmlTemplate::redirect_page()), HtmlTemplate::from_file)?,
        })
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

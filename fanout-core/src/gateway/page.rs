//! Server-rendered form page.

use crate::geo::FanOutResult;
use handlebars::Handlebars;
use serde::Serialize;

pub(crate) const PAGE_TEMPLATE_NAME: &str = "index";

pub(crate) const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Fan-Out GEO Generator</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; }
    textarea, input[type=text] { width: 100%; }
    .error { color: #a40000; border: 1px solid #a40000; padding: .5rem; }
    .block { border-top: 1px solid #ccc; padding: .5rem 0; }
    .meta { color: #555; font-size: .9rem; }
  </style>
</head>
<body>
  <h1>Fan-Out GEO Generator</h1>
  <form method="post" action="/" enctype="multipart/form-data">
    <label for="keyword">Target keyword</label>
    <input type="text" id="keyword" name="keyword" value="{{submitted_keyword}}" required>
    <label for="content_text">Content (optional; leave empty to research the keyword)</label>
    <textarea id="content_text" name="content_text" rows="12">{{submitted_text}}</textarea>
    <label for="upload">Or upload a UTF-8 text file</label>
    <input type="file" id="upload" name="upload" accept=".txt,.md,text/plain">
    <button type="submit">Generate</button>
  </form>
  {{#if error}}
  <p class="error">{{error}}</p>
  {{/if}}
  {{#if result}}
  <h2>{{result.main_keyword}}</h2>
  <p>{{result.analysis_summary}}</p>
  {{#each result.blocks}}
  <div class="block">
    <h3>{{this.heading}}</h3>
    <p class="meta">{{this.intent_category}} &middot; {{this.target_query}} &middot; relevance {{this.relevance_score}}{{#if this.source_quality_score includeZero=true}} &middot; source quality {{this.source_quality_score}}{{/if}}</p>
    <p>{{this.content}}</p>
  </div>
  {{/each}}
  {{/if}}
</body>
</html>
"#;

/// Data bound into the page template.
#[derive(Debug, Default, Serialize)]
pub struct PageContext {
    pub submitted_text: String,
    pub submitted_keyword: String,
    pub result: Option<FanOutResult>,
    pub error: Option<String>,
}

/// Build the template registry. Escaping stays on for every `{{value}}`.
pub(crate) fn templates() -> Result<Handlebars<'static>, handlebars::TemplateError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);
    handlebars.register_template_string(PAGE_TEMPLATE_NAME, PAGE_TEMPLATE)?;
    Ok(handlebars)
}

pub fn render_page(
    handlebars: &Handlebars<'_>,
    context: &PageContext,
) -> Result<String, handlebars::RenderError> {
    handlebars.render(PAGE_TEMPLATE_NAME, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{AnswerBlock, IntentCategory};

    #[test]
    fn test_empty_page_renders_form() {
        let hb = templates().unwrap();
        let html = render_page(&hb, &PageContext::default()).unwrap();
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(!html.contains("class=\"error\""));
        assert!(!html.contains("class=\"block\""));
    }

    #[test]
    fn test_submitted_values_are_escaped() {
        let hb = templates().unwrap();
        let context = PageContext {
            submitted_keyword: "<script>alert(1)</script>".into(),
            error: Some("A target keyword is required to run the fan-out analysis.".into()),
            ..PageContext::default()
        };
        let html = render_page(&hb, &context).unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("A target keyword is required"));
    }

    #[test]
    fn test_result_blocks_rendered() {
        let hb = templates().unwrap();
        let context = PageContext {
            result: Some(FanOutResult {
                main_keyword: "crm".into(),
                analysis_summary: "Buyers compare pricing.".into(),
                blocks: vec![AnswerBlock {
                    intent_category: IntentCategory::HowTo,
                    target_query: "how to pick a crm".into(),
                    heading: "How to pick a CRM".into(),
                    content: "HubSpot ...".into(),
                    relevance_score: 88,
                    source_quality_score: Some(0),
                }],
            }),
            ..PageContext::default()
        };
        let html = render_page(&hb, &context).unwrap();
        assert!(html.contains("<h3>How to pick a CRM</h3>"));
        assert!(html.contains("How-to"));
        assert!(html.contains("source quality 0"));
    }
}

//! HTML pages for the login gate and the planner

use html_escape::{encode_double_quoted_attribute, encode_text};
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};
use url::Url;

use crate::generation::Generation;
use crate::planner::{BindingStatus, TripRequest};

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:46rem;margin:2rem auto;padding:0 1rem;line-height:1.5}\
label{display:block;margin-top:1rem;font-weight:600}\
input,textarea{width:100%;padding:.5rem;box-sizing:border-box}\
button{margin-top:1rem;padding:.5rem 1.25rem}\
.caption{color:#666}.error{background:#fde8e8;color:#9b1c1c;padding:.75rem;border-radius:4px}\
.itinerary{border-top:1px solid #ddd;margin-top:2rem;padding-top:1rem}";

/// Absolute destinations must be web or mail links; relative ones stay on this site.
fn is_safe_destination(dest: &str) -> bool {
    match Url::parse(dest.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https" | "mailto"),
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}

fn neutralise(dest: CowStr<'_>) -> CowStr<'_> {
    if is_safe_destination(&dest) {
        dest
    } else {
        CowStr::Borrowed("#")
    }
}

/// Render model markdown to HTML. Raw HTML in the input is escaped and
/// link or image destinations outside http, https and mailto are dropped.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: neutralise(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: neutralise(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, events);
    output
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        title = encode_text(title),
    )
}

fn error_block(message: &str) -> String {
    format!("<p class=\"error\" role=\"alert\">{}</p>\n", encode_text(message))
}

/// License entry form, optionally with the reason the last attempt failed
pub fn login_page(error: Option<&str>) -> String {
    let mut body = String::from("<h1>🔒 VIP Travel Agent Login</h1>\n");
    if let Some(error) = error {
        body.push_str(&error_block(error));
    }
    body.push_str(
        "<form method=\"post\" action=\"/login\">\n\
<label for=\"license_key\">Enter License Key</label>\n\
<input id=\"license_key\" name=\"license_key\" type=\"password\" autocomplete=\"off\" required>\n\
<button type=\"submit\">Log In</button>\n</form>\n",
    );
    page("VIP Travel Agent Login", &body)
}

/// Outcome of the last plan request shown under the form
pub enum PlanResult<'a> {
    None,
    Itinerary(&'a Generation),
    Error(String),
}

/// Planner form with the discovery status and any plan result
pub fn planner_page(status: &BindingStatus, request: &TripRequest, result: PlanResult<'_>) -> String {
    let mut body = String::from("<h1>✈️ Live AI Travel Planner</h1>\n");

    match status {
        BindingStatus::Bound { search_tool, .. } => {
            if let Some(caption) = status.caption() {
                body.push_str(&format!(
                    "<p class=\"caption\">{} with {}</p>\n",
                    encode_text(&caption),
                    encode_text(&search_tool.to_string())
                ));
            }
        }
        BindingStatus::Pending => {
            body.push_str("<p class=\"caption\">Model discovery has not run yet.</p>\n");
        }
        BindingStatus::Unresolved { attempts } => {
            if attempts.is_empty() {
                body.push_str(&error_block(
                    "No AI model is available right now. No regions or models are configured.",
                ));
            } else {
                body.push_str(&error_block(
                    "No AI model is available right now. Every region and model combination failed.",
                ));
            }
            if !attempts.is_empty() {
                body.push_str("<details>\n<summary>Discovery attempts</summary>\n<ul>\n");
                for attempt in attempts {
                    let model = attempt
                        .model
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    body.push_str(&format!(
                        "<li><code>{}</code> / <code>{}</code>: {}</li>\n",
                        encode_text(attempt.region.as_str()),
                        encode_text(&model),
                        encode_text(&attempt.reason)
                    ));
                }
                body.push_str("</ul>\n</details>\n");
            }
            body.push_str(
                "<form method=\"post\" action=\"/resolve\">\n\
<button type=\"submit\">Retry discovery</button>\n</form>\n",
            );
        }
    }

    body.push_str(&format!(
        "<form method=\"post\" action=\"/plan\">\n\
<label for=\"destination\">Where to?</label>\n\
<input id=\"destination\" name=\"destination\" value=\"{destination}\">\n\
<label for=\"when\">When?</label>\n\
<input id=\"when\" name=\"when\" value=\"{when}\">\n\
<label for=\"preferences\">Interests?</label>\n\
<textarea id=\"preferences\" name=\"preferences\" rows=\"3\">{preferences}</textarea>\n\
<button type=\"submit\">Plan Trip</button>\n</form>\n",
        destination = encode_double_quoted_attribute(&request.destination),
        when = encode_double_quoted_attribute(&request.when),
        preferences = encode_text(&request.preferences),
    ));

    match result {
        PlanResult::None => {}
        PlanResult::Error(message) => body.push_str(&error_block(&message)),
        PlanResult::Itinerary(generation) => {
            body.push_str("<section class=\"itinerary\">\n");
            body.push_str(&markdown_to_html(&generation.text));
            if !generation.search_queries.is_empty() {
                let queries: Vec<String> = generation
                    .search_queries
                    .iter()
                    .map(|q| format!("<q>{}</q>", encode_text(q)))
                    .collect();
                body.push_str(&format!(
                    "<p class=\"caption\">Checked with web searches for {}</p>\n",
                    queries.join(", ")
                ));
            }
            if let Some(grounding) = &generation.grounding_html {
                // Search suggestions must be shown verbatim under the service's
                // grounding terms.
                body.push_str("<aside class=\"grounding\">\n");
                body.push_str(grounding);
                body.push_str("\n</aside>\n");
            }
            body.push_str("</section>\n");
        }
    }

    page("Live Travel Planner", &body)
}

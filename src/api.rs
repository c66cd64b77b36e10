use crate::config::{TargetLanguage, WidgetConfig};
use crate::fragments::{FragmentError, parse_fragment};
use crate::page::{Page, ids, replace_children};
use crate::sdk::{globals_script, widget_globals};
use crate::server::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use kuchiki::NodeRef;
use tracing::warn;
use url::Url;

pub async fn ping() -> &'static str {
    "PONG"
}

pub async fn get_widget_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(widget_globals(&state.config))
}

pub async fn serve_globals(State(state): State<AppState>) -> impl IntoResponse {
    let mut resp = Response::new(globals_script(&state.config));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/javascript"),
    );
    resp
}

pub async fn serve_page(State(state): State<AppState>) -> Response {
    let template = match tokio::fs::read_to_string(&state.config.page_template).await {
        Ok(template) => template,
        Err(err) => {
            warn!(path = %state.config.page_template.display(), ?err, "page template unreadable");
            return (StatusCode::INTERNAL_SERVER_ERROR, "page template unavailable")
                .into_response();
        }
    };
    match render_page(&template, &state.config) {
        Ok(html) => Html(html).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// Inject the widget globals ahead of the page scripts and fill the answer
/// language selector.
pub fn render_page(template: &str, config: &WidgetConfig) -> Result<String, FragmentError> {
    let location = Url::parse(&format!("http://{}/", config.chatbot_hostname))
        .map_err(|err| FragmentError::Html(format!("bad chatbot hostname: {err}")))?;
    let page = Page::parse(template, location);
    page.inject_inline_script(&globals_script(config))?;
    if let Some(select) = page.element(ids::CHATBOT_TARGET_LANGUAGE) {
        let options = language_options(&config.target_languages)?;
        replace_children(select.as_node(), &options);
    }
    Ok(page.to_html())
}

fn language_options(languages: &[TargetLanguage]) -> Result<NodeRef, FragmentError> {
    let wrapper = parse_fragment("")?;
    for lang in languages {
        let option = parse_fragment("<option></option>")?
            .first_child()
            .ok_or_else(|| FragmentError::Html("option element missing".to_string()))?;
        if let Some(el) = option.as_element() {
            let mut attrs = el.attributes.borrow_mut();
            attrs.insert("value", lang.code.clone());
            if lang.selected {
                attrs.insert("selected", "selected".to_string());
            }
        }
        option.append(NodeRef::new_text(lang.label.as_str()));
        wrapper.append(option);
    }
    Ok(wrapper)
}

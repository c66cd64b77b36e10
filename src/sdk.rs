use crate::config::WidgetConfig;
use serde_json::{Map, Value, json};

/// Globals the widget scripts read from `window`.
pub fn widget_globals(config: &WidgetConfig) -> Map<String, Value> {
    let globals = json!({
        "leoObserverCdnDomain": config.cdn_domain.clone().unwrap_or_default(),
        "CHATBOT_HOSTNAME": config.chatbot_hostname,
        "CDP_TRACKING": config.tracking_ready(),
        "BASE_URL_API": config.base_url_api.as_str(),
        "BASE_URL_GET_VISITOR_INFO": config.base_url_get_visitor_info.as_str(),
        "CHATBOT_NAME": config.chatbot_name,
    });
    match globals {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `window.NAME = value;` lines for every global, JSON-escaped and safe to
/// inline inside a `<script>` element.
pub fn globals_script(config: &WidgetConfig) -> String {
    let mut script = String::from("// resynap widget globals\n");
    for (name, value) in widget_globals(config) {
        let literal = value.to_string().replace("</", "<\\/");
        script.push_str(&format!("window.{name} = {literal};\n"));
    }
    script
}

//! Minimal `{{var}}` / `{{#if flag}}...{{/if}}` substitution for the two
//! weather-site pages.
//!
//! No templating crate appears anywhere in the corpus this workspace was
//! grown from; the only static-content precedent (`rt-ui-http`) serves
//! pre-built files verbatim. Rather than pull in an unrelated templating
//! dependency for two small pages, the substitution is hand-rolled here,
//! limited to the two placeholder forms the pages actually use.

use crate::state::AppState;

const INDEX_TEMPLATE: &str = include_str!("../../../web/index.html.tmpl");
const DASHBOARD_TEMPLATE: &str = include_str!("../../../web/dashboard.html.tmpl");

fn render_if_block(template: &str, flag_name: &str, enabled: bool) -> String {
    let open = format!("{{{{#if {flag_name}}}}}");
    let close = "{{/if}}";
    let Some(start) = template.find(&open) else {
        return template.to_string();
    };
    let Some(close_pos) = template[start..].find(close) else {
        return template.to_string();
    };
    let block_start = start + open.len();
    let block_end = start + close_pos;
    let inner = &template[block_start..block_end];

    let mut out = String::with_capacity(template.len());
    out.push_str(&template[..start]);
    if enabled {
        out.push_str(inner);
    }
    out.push_str(&template[block_end + close.len()..]);
    out
}

fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

pub fn render_index(state: &AppState) -> String {
    let vars = [
        ("title", state.weather_site.title.as_str()),
        ("pull_from_device", state.weather_site.pull_from_device.as_str()),
    ];
    substitute(INDEX_TEMPLATE, &vars)
}

pub fn render_dashboard(state: &AppState) -> String {
    let snow_enabled = state.weather_site.snow_enabled.unwrap_or(false);
    let snow_device = state.weather_site.snow_device.as_deref().unwrap_or("");

    let rendered = render_if_block(DASHBOARD_TEMPLATE, "snow_enabled", snow_enabled);
    let vars = [
        ("title", state.weather_site.title.as_str()),
        ("pull_from_device", state.weather_site.pull_from_device.as_str()),
        ("snow_device", snow_device),
    ];
    substitute(&rendered, &vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_block_is_dropped_when_flag_is_false() {
        let tmpl = "a{{#if x}}middle{{/if}}b";
        assert_eq!(render_if_block(tmpl, "x", false), "ab");
    }

    #[test]
    fn if_block_keeps_inner_content_when_flag_is_true() {
        let tmpl = "a{{#if x}}middle{{/if}}b";
        assert_eq!(render_if_block(tmpl, "x", true), "amiddleb");
    }

    #[test]
    fn substitute_replaces_every_occurrence() {
        let tmpl = "{{title}} / {{title}}";
        assert_eq!(substitute(tmpl, &[("title", "Station")]), "Station / Station");
    }

    #[test]
    fn render_dashboard_includes_snow_block_when_enabled() {
        let state = AppState {
            storage: test_storage_handle(),
            devices: Vec::new(),
            weather_site: rw_config::WeatherSiteConfig {
                title: "Test Site".to_string(),
                pull_from_device: "vantage-1".to_string(),
                snow_enabled: Some(true),
                snow_device: Some("snow-1".to_string()),
            },
            metrics: crate::metrics::ApiMetrics::new(),
        };
        let rendered = render_dashboard(&state);
        assert!(rendered.contains("snow-1"));
    }

    #[test]
    fn render_dashboard_omits_snow_block_when_disabled() {
        let state = AppState {
            storage: test_storage_handle(),
            devices: Vec::new(),
            weather_site: rw_config::WeatherSiteConfig {
                title: "Test Site".to_string(),
                pull_from_device: "vantage-1".to_string(),
                snow_enabled: Some(false),
                snow_device: None,
            },
            metrics: crate::metrics::ApiMetrics::new(),
        };
        let rendered = render_dashboard(&state);
        assert!(!rendered.contains("/snow?station="));
    }

    fn test_storage_handle() -> std::sync::Arc<rw_storage::TimescaleEngine> {
        // `TimescaleEngine` holds only a `PgPool`, which is cheap to build
        // lazily without connecting; used here purely so `AppState` can be
        // constructed in tests that never touch the database.
        rw_storage::TimescaleEngine::lazy_for_tests()
    }
}

use crate::error::Result;
use crate::gviz::DataTable;
use handlebars::Handlebars;
use serde_json::json;

const MAP_TEMPLATE: &str = include_str!("../templates/map.html");
const SPARKLINE_TEMPLATE: &str = include_str!("../templates/sparkline.html");

const MAP: &str = "map";
const SPARKLINE: &str = "sparkline";

pub const BW_URL: &str = "/xhr_bw/";
pub const TRAFFIC_URL: &str = "/xhr_traffic/";
pub const SPARKLINE_URL: &str = "/sparkline/";

/// Handlebars registry holding the dashboard templates.
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_template_string(MAP, MAP_TEMPLATE)?;
        registry.register_template_string(SPARKLINE, SPARKLINE_TEMPLATE)?;
        Ok(Self { registry })
    }

    /// Dashboard page; endpoint prefixes and the refresh period are baked in.
    pub fn render_map(&self, bw_update_interval_secs: u64) -> Result<String> {
        let context = json!({
            "bw_url": BW_URL,
            "traffic_url": TRAFFIC_URL,
            "sparkline_url": SPARKLINE_URL,
            "bw_update_interval": bw_update_interval_secs.saturating_mul(1000),
        });
        Ok(self.registry.render(MAP, &context)?)
    }

    pub fn render_sparkline(&self, link: i64, table: &DataTable) -> Result<String> {
        let context = json!({
            "link": link,
            "json_data": table.to_json()?,
        });
        Ok(self.registry.render(SPARKLINE, &context)?)
    }
}

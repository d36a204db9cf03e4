//! Built-in chart definitions and locale.

use serde_json::json;

use super::{ChartConfig, ChartType, Curve, Fill, Stroke, Theme, Tooltip, YRange, YUnit};
use crate::loader::Locale;

pub const GROUP: &str = "mygrid";
pub const LOCALE: &str = "se";

fn base(id: &str, title: &str, height: u32, colors: &[&str], unit: YUnit) -> ChartConfig {
    ChartConfig {
        id: id.to_string(),
        group: GROUP.to_string(),
        title: title.to_string(),
        height,
        chart_type: ChartType::Line,
        colors: colors.iter().map(|c| c.to_string()).collect(),
        stroke: Stroke {
            curve: Curve::Smooth,
            width: vec![2.0],
        },
        fill: Fill { opacity: vec![1.0] },
        y_unit: unit,
        x_labels: true,
        tooltip: Tooltip {
            enabled: true,
            x_format: "HH:mm".to_string(),
        },
        theme: Theme::default(),
        no_data_text: "Loading...".to_string(),
        y_range: None,
        locale: Some(LOCALE.to_string()),
    }
}

pub fn production() -> ChartConfig {
    let mut c = base("prod", "Power Production", 200, &["#008FFB", "#00E396"], YUnit::Kilowatt);
    c.stroke.width = vec![2.0, 2.0];
    // actual production is drawn as a translucent area under the estimate
    c.fill.opacity = vec![0.35, 1.0];
    c.x_labels = false;
    c.tooltip.enabled = false;
    c
}

pub fn incidence() -> ChartConfig {
    let mut c = base("incidence", "Sun Incidence", 350, &["#008FFB", "#00E396"], YUnit::Degree);
    c.stroke.width = vec![2.0, 2.0];
    c.fill.opacity = vec![1.0, 1.0];
    // angle from zenith: overhead sun at the top
    c.y_range = Some(YRange {
        min: 0.0,
        max: 90.0,
        reversed: true,
    });
    c
}

pub fn temperature() -> ChartConfig {
    base("temp", "Temperature", 350, &["#FEB019", "#00E396", "#008FFB"], YUnit::Celsius)
}

pub fn air_mass_effect() -> ChartConfig {
    base("ame", "Air Mass Effect", 350, &["#FEB019"], YUnit::Percent)
}

pub fn all() -> Vec<ChartConfig> {
    vec![production(), incidence(), temperature(), air_mass_effect()]
}

pub fn swedish() -> Locale {
    Locale {
        name: LOCALE.to_string(),
        options: json!({
            "months": ["januari", "februari", "mars", "april", "maj", "juni", "juli",
                       "augusti", "september", "oktober", "november", "december"],
            "shortMonths": ["jan", "feb", "mar", "apr", "maj", "jun", "jul",
                            "aug", "sep", "okt", "nov", "dec"],
            "days": ["söndag", "måndag", "tisdag", "onsdag", "torsdag", "fredag", "lördag"],
            "shortDays": ["sön", "mån", "tis", "ons", "tor", "fre", "lör"],
            "toolbar": {
                "exportToSVG": "Ladda ner SVG",
                "exportToPNG": "Ladda ner PNG",
                "exportToCSV": "Ladda ner CSV",
                "menu": "Meny",
                "selection": "Val",
                "selectionZoom": "Val av zoom",
                "zoomIn": "Zooma in",
                "zoomOut": "Zooma ut",
                "pan": "Panorering",
                "reset": "Återställ zoom"
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_share_one_group() {
        let all = all();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|c| c.group == GROUP));
        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["prod", "incidence", "temp", "ame"]);
    }

    #[test]
    fn test_config_survives_json() {
        let c = production();
        let text = serde_json::to_string(&c).unwrap();
        let back: ChartConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, c);
    }
}

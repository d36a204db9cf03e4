//! ApexCharts option documents, and widgets that write them to disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{json, Value};

use super::{ChartConfig, ChartWidget, WidgetFactory, YUnit};
use crate::series::Series;

/// A single width/opacity is given as a scalar, several as a list.
fn scalar_or_list(values: &[f64]) -> Value {
    match values {
        [one] => json!(one),
        many => json!(many),
    }
}

/// Axis and tooltip text for every point, parallel to `series`.
/// Gaps stay `null` so indices line up with the data.
fn formatted_points(unit: YUnit, series: &[Series]) -> Value {
    let rendered: Vec<Value> = series
        .iter()
        .map(|s| {
            s.data
                .iter()
                .map(|p| match p.y {
                    Some(y) => json!({
                        "x": p.x,
                        "label": unit.format_axis(y),
                        "tooltip": unit.format_tooltip(y),
                    }),
                    None => Value::Null,
                })
                .collect::<Vec<_>>()
        })
        .map(Value::from)
        .collect();
    Value::Array(rendered)
}

/// Options document for the charting library. Formatter functions cannot
/// travel as JSON, so the unit, its label suffix and pre-rendered text for
/// each point go along instead.
pub fn apex_options(config: &ChartConfig, series: &[Series]) -> Value {
    let mut chart = json!({
        "id": config.id,
        "group": config.group,
        "height": config.height,
        "type": config.chart_type,
        "toolbar": {"show": false},
        "zoom": {"enabled": false},
    });
    if let Some(locale) = &config.locale {
        chart["defaultLocale"] = json!(locale);
    }
    let mut yaxis = json!({
        "axisBorder": {"show": false},
        "axisTicks": {"show": false},
        "labels": {
            "show": true,
            "minWidth": 30,
            "suffix": config.y_unit.suffix(),
            "scale": config.y_unit.scale(),
        },
    });
    if let Some(range) = &config.y_range {
        yaxis["min"] = json!(range.min);
        yaxis["max"] = json!(range.max);
        yaxis["reversed"] = json!(range.reversed);
    }
    json!({
        "series": series,
        "chart": chart,
        "colors": config.colors,
        "stroke": {"curve": config.stroke.curve, "width": scalar_or_list(&config.stroke.width)},
        "fill": {"type": "solid", "opacity": scalar_or_list(&config.fill.opacity)},
        "yaxis": yaxis,
        "xaxis": {
            "position": "bottom",
            "type": "datetime",
            "axisBorder": {"show": false},
            "axisTicks": {"show": true},
            "labels": {"show": config.x_labels},
        },
        "tooltip": {
            "enabled": config.tooltip.enabled,
            "x": {"show": true, "format": config.tooltip.x_format},
        },
        "title": {"text": config.title, "floating": true, "offsetY": 0, "align": "center"},
        "noData": {"text": config.no_data_text},
        "theme": {"mode": config.theme.mode, "palette": config.theme.palette},
        "unit": config.y_unit,
        "formatted": formatted_points(config.y_unit, series),
    })
}

/// Rewrites `<dir>/<id>.json` on every series update.
pub struct OptionsFileWidget {
    config: ChartConfig,
    series: Vec<Series>,
    path: PathBuf,
}

impl OptionsFileWidget {
    pub fn new(config: ChartConfig, dir: &Path) -> Result<Self> {
        let widget = Self {
            path: dir.join(format!("{}.json", config.id)),
            config,
            series: Vec::new(),
        };
        widget.flush()?;
        Ok(widget)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let doc = apex_options(&self.config, &self.series);
        fs::write(&self.path, serde_json::to_vec_pretty(&doc)?)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

impl ChartWidget for OptionsFileWidget {
    fn config(&self) -> &ChartConfig {
        &self.config
    }

    fn update_series(&mut self, series: Vec<Series>) -> Result<()> {
        self.series = series;
        self.flush()
    }

    fn series(&self) -> &[Series] {
        &self.series
    }
}

pub struct OptionsFileFactory {
    dir: PathBuf,
}

impl OptionsFileFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self { dir })
    }
}

impl WidgetFactory for OptionsFileFactory {
    fn create(&mut self, config: ChartConfig) -> Result<Box<dyn ChartWidget>> {
        Ok(Box::new(OptionsFileWidget::new(config, &self.dir)?))
    }
}

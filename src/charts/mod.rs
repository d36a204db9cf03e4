//! Chart widgets: static display configuration plus a replaceable series list.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::logging::{log, log_series_update, obj, v_str, Domain, Level};
use crate::series::{x_domain, Series};

pub mod options;
pub mod presets;

pub use options::{OptionsFileFactory, OptionsFileWidget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    #[default]
    Smooth,
    Straight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(default)]
    pub curve: Curve,
    /// One entry per series, or a single entry for all of them.
    pub width: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub opacity: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tooltip {
    pub enabled: bool,
    #[serde(default = "default_x_format")]
    pub x_format: String,
}

fn default_x_format() -> String {
    "HH:mm".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default)]
    pub mode: ThemeMode,
    pub palette: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            mode: ThemeMode::Dark,
            palette: "palette1".to_string(),
        }
    }
}

/// Unit of a chart's y values; decides label and tooltip text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YUnit {
    Kilowatt,
    Degree,
    Celsius,
    Percent,
}

impl YUnit {
    pub fn format_axis(&self, v: f64) -> String {
        match self {
            YUnit::Kilowatt => format!("{} kW", js_number(v)),
            YUnit::Degree => format!("{} deg", js_number(v)),
            YUnit::Celsius => format!("{} ℃", js_number(v)),
            YUnit::Percent => format!("{} %", js_number(v * 100.0)),
        }
    }

    /// Text appended to axis labels.
    pub fn suffix(&self) -> &'static str {
        match self {
            YUnit::Kilowatt => " kW",
            YUnit::Degree => " deg",
            YUnit::Celsius => " ℃",
            YUnit::Percent => " %",
        }
    }

    /// Factor applied to raw values before they are labelled.
    pub fn scale(&self) -> f64 {
        match self {
            YUnit::Percent => 100.0,
            _ => 1.0,
        }
    }

    pub fn format_tooltip(&self, v: f64) -> String {
        match self {
            YUnit::Kilowatt => format!("{} kW", js_number(round_half_up(v * 10.0) / 10.0)),
            YUnit::Degree => format!("{} deg", js_number(round_half_up(v * 10.0) / 10.0)),
            YUnit::Celsius => format!("{} C", js_number(round_half_up(v * 10.0) / 10.0)),
            YUnit::Percent => format!("{} %", js_number(round_half_up(v * 100.0))),
        }
    }
}

fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Number text as a script engine prints it: shortest round-trip digits,
/// no negative zero, exponent form below 1e-6 and from 1e21 up.
fn js_number(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let magnitude = v.abs();
    if magnitude.is_finite() && (magnitude < 1e-6 || magnitude >= 1e21) {
        let text = format!("{:e}", v);
        return match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => text,
        };
    }
    format!("{}", v)
}

/// Immutable display configuration of one widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub id: String,
    pub group: String,
    pub title: String,
    pub height: u32,
    #[serde(default)]
    pub chart_type: ChartType,
    pub colors: Vec<String>,
    pub stroke: Stroke,
    pub fill: Fill,
    pub y_unit: YUnit,
    #[serde(default = "default_true")]
    pub x_labels: bool,
    pub tooltip: Tooltip,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_no_data")]
    pub no_data_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_range: Option<YRange>,
    /// Locale that has to be registered before this chart can be created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Fixed y-axis bounds; `reversed` puts `min` at the top.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YRange {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub reversed: bool,
}

fn default_true() -> bool {
    true
}

fn default_no_data() -> String {
    "Loading...".to_string()
}

pub trait ChartWidget: Send {
    fn config(&self) -> &ChartConfig;
    /// Replace the displayed series wholesale.
    fn update_series(&mut self, series: Vec<Series>) -> Result<()>;
    fn series(&self) -> &[Series];
}

pub trait WidgetFactory: Send {
    fn create(&mut self, config: ChartConfig) -> Result<Box<dyn ChartWidget>>;
}

/// Pure in-memory rendering sink.
pub struct MemoryWidget {
    config: ChartConfig,
    series: Vec<Series>,
}

impl MemoryWidget {
    pub fn new(config: ChartConfig) -> Self {
        Self {
            config,
            series: Vec::new(),
        }
    }
}

impl ChartWidget for MemoryWidget {
    fn config(&self) -> &ChartConfig {
        &self.config
    }

    fn update_series(&mut self, series: Vec<Series>) -> Result<()> {
        self.series = series;
        Ok(())
    }

    fn series(&self) -> &[Series] {
        &self.series
    }
}

#[derive(Debug, Default)]
pub struct MemoryWidgetFactory;

impl WidgetFactory for MemoryWidgetFactory {
    fn create(&mut self, config: ChartConfig) -> Result<Box<dyn ChartWidget>> {
        Ok(Box::new(MemoryWidget::new(config)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetHandle(usize);

/// Registry of named widgets, in creation order.
pub struct ChartWidgetSet {
    factory: Box<dyn WidgetFactory>,
    widgets: Vec<Box<dyn ChartWidget>>,
    by_name: HashMap<String, WidgetHandle>,
}

impl ChartWidgetSet {
    pub fn new(factory: Box<dyn WidgetFactory>) -> Self {
        Self {
            factory,
            widgets: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryWidgetFactory))
    }

    pub fn create(&mut self, config: ChartConfig) -> Result<WidgetHandle> {
        if self.by_name.contains_key(&config.id) {
            bail!("chart {} already exists", config.id);
        }
        let name = config.id.clone();
        let group = config.group.clone();
        let widget = self.factory.create(config)?;
        let handle = WidgetHandle(self.widgets.len());
        self.widgets.push(widget);
        self.by_name.insert(name.clone(), handle);
        log(
            Level::Info,
            Domain::Charts,
            "widget_created",
            obj(&[("widget", v_str(&name)), ("group", v_str(&group))]),
        );
        Ok(handle)
    }

    pub fn update_series(&mut self, handle: WidgetHandle, series: Vec<Series>) -> Result<()> {
        let widget = self
            .widgets
            .get_mut(handle.0)
            .ok_or_else(|| anyhow!("no widget behind handle {}", handle.0))?;
        let points = series.iter().map(|s| s.data.len()).sum();
        log_series_update(&widget.config().id, series.len(), points);
        widget.update_series(series)
    }

    pub fn handle(&self, name: &str) -> Option<WidgetHandle> {
        self.by_name.get(name).copied()
    }

    pub fn series(&self, name: &str) -> Option<&[Series]> {
        self.handle(name).map(|h| self.widgets[h.0].series())
    }

    pub fn config(&self, name: &str) -> Option<&ChartConfig> {
        self.handle(name).map(|h| self.widgets[h.0].config())
    }

    pub fn names(&self) -> Vec<&str> {
        self.widgets.iter().map(|w| w.config().id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Apply every series list from one fetch, then check group domains.
    /// Series for a widget that was never created are dropped with a warning.
    pub fn apply(&mut self, assignments: Vec<(&str, Vec<Series>)>) -> Result<()> {
        for (name, series) in assignments {
            match self.handle(name) {
                Some(handle) => self.update_series(handle, series)?,
                None => log(
                    Level::Warn,
                    Domain::Charts,
                    "unknown_widget",
                    obj(&[("widget", v_str(name))]),
                ),
            }
        }
        for group in self.mismatched_groups() {
            log(
                Level::Warn,
                Domain::Charts,
                "group_domain_mismatch",
                obj(&[("group", v_str(&group))]),
            );
        }
        Ok(())
    }

    /// Groups whose non-empty widgets do not cover the same time range.
    pub fn mismatched_groups(&self) -> Vec<String> {
        let mut domains: BTreeMap<&str, Vec<(i64, i64)>> = BTreeMap::new();
        for w in &self.widgets {
            if let Some(d) = x_domain(w.series()) {
                domains.entry(w.config().group.as_str()).or_default().push(d);
            }
        }
        domains
            .into_iter()
            .filter(|(_, ds)| ds.windows(2).any(|pair| pair[0] != pair[1]))
            .map(|(g, _)| g.to_string())
            .collect()
    }
}

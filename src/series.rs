//! Chart series and the diagram payloads returned by the backend.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ContractVersion;
use crate::params::ParameterSet;

/// Widget names the backend diagrams are assigned to.
pub const PROD: &str = "prod";
pub const INCIDENCE: &str = "incidence";
pub const TEMP: &str = "temp";
pub const AME: &str = "ame";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPoint")]
pub struct Point {
    /// Milliseconds since the epoch.
    pub x: i64,
    /// `None` renders as a gap.
    pub y: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Pair(i64, Option<f64>),
    Object { x: i64, y: Option<f64> },
}

impl From<RawPoint> for Point {
    fn from(raw: RawPoint) -> Self {
        match raw {
            RawPoint::Pair(x, y) | RawPoint::Object { x, y } => Point { x, y },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub data: Vec<Point>,
}

impl Series {
    pub fn new(name: &str, data: Vec<Point>) -> Self {
        Self {
            name: name.to_string(),
            chart_type: None,
            data,
        }
    }

    /// Smallest and largest timestamp, if there is any data.
    pub fn x_domain(&self) -> Option<(i64, i64)> {
        let lo = self.data.iter().map(|p| p.x).min()?;
        let hi = self.data.iter().map(|p| p.x).max()?;
        Some((lo, hi))
    }
}

/// Combined x-domain of several series.
pub fn x_domain(series: &[Series]) -> Option<(i64, i64)> {
    series
        .iter()
        .filter_map(Series::x_domain)
        .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)))
}

/// All series from one backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagrams {
    pub prod: Vec<Series>,
    pub incidence: Vec<Series>,
    pub temp: Vec<Series>,
    pub ame: Option<Series>,
}

#[derive(Deserialize)]
struct RawDiagrams {
    prod_diagram: Vec<Series>,
    incidence_diagram: Vec<Series>,
    temp_diagram: Vec<Series>,
    #[serde(default)]
    ame_diagram: Option<Series>,
}

impl Diagrams {
    pub fn from_json(body: &Value, contract: ContractVersion) -> Result<Self> {
        let raw = RawDiagrams::deserialize(body).context("malformed diagram payload")?;
        let ame = match contract {
            ContractVersion::Extended => {
                Some(raw.ame_diagram.ok_or_else(|| anyhow!("response missing ame_diagram"))?)
            }
            ContractVersion::Legacy => None,
        };
        Ok(Self {
            prod: raw.prod_diagram,
            incidence: raw.incidence_diagram,
            temp: raw.temp_diagram,
            ame,
        })
    }

    /// (widget name, full series list) for every widget this payload feeds.
    /// The single air-mass-effect series becomes a one-element list.
    pub fn assignments(self) -> Vec<(&'static str, Vec<Series>)> {
        let mut out = vec![
            (PROD, self.prod),
            (INCIDENCE, self.incidence),
            (TEMP, self.temp),
        ];
        if let Some(ame) = self.ame {
            out.push((AME, vec![ame]));
        }
        out
    }
}

/// `/get_start`: the stored parameters plus the series computed from them.
#[derive(Debug, Clone, PartialEq)]
pub struct StartState {
    pub params: ParameterSet,
    pub diagrams: Diagrams,
}

impl StartState {
    pub fn from_json(body: &Value, contract: ContractVersion) -> Result<Self> {
        let Some(params) = body.get("params") else {
            bail!("response missing params");
        };
        Ok(Self {
            params: ParameterSet::from_json(params, contract)?,
            diagrams: Diagrams::from_json(body, contract)?,
        })
    }
}

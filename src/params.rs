//! Panel parameters: the simulation inputs shown and edited on the dashboard.
//!
//! Values stay untyped text end to end. Nothing here validates them; a
//! non-numeric slope goes to the backend exactly as typed.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::ContractVersion;
use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamField {
    Year,
    Month,
    Day,
    PanelPower,
    PanelSlope,
    PanelEastAzm,
    PanelTempRed,
    Tau,
    TauDown,
    KGain,
    IamFactor,
    StartAzm,
    StartElv,
    StopAzm,
    StopElv,
}

impl ParamField {
    pub const ALL: [ParamField; 15] = [
        ParamField::Year,
        ParamField::Month,
        ParamField::Day,
        ParamField::PanelPower,
        ParamField::PanelSlope,
        ParamField::PanelEastAzm,
        ParamField::PanelTempRed,
        ParamField::Tau,
        ParamField::TauDown,
        ParamField::KGain,
        ParamField::IamFactor,
        ParamField::StartAzm,
        ParamField::StartElv,
        ParamField::StopAzm,
        ParamField::StopElv,
    ];

    /// Wire and element name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamField::Year => "year",
            ParamField::Month => "month",
            ParamField::Day => "day",
            ParamField::PanelPower => "panel_power",
            ParamField::PanelSlope => "panel_slope",
            ParamField::PanelEastAzm => "panel_east_azm",
            ParamField::PanelTempRed => "panel_temp_red",
            ParamField::Tau => "tau",
            ParamField::TauDown => "tau_down",
            ParamField::KGain => "k_gain",
            ParamField::IamFactor => "iam_factor",
            ParamField::StartAzm => "start_azm",
            ParamField::StartElv => "start_elv",
            ParamField::StopAzm => "stop_azm",
            ParamField::StopElv => "stop_elv",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    /// Sun-path analysis window; only part of the extended contract.
    pub fn is_sun_path(&self) -> bool {
        matches!(
            self,
            ParamField::StartAzm | ParamField::StartElv | ParamField::StopAzm | ParamField::StopElv
        )
    }

    pub fn in_contract(&self, contract: ContractVersion) -> bool {
        match contract {
            ContractVersion::Extended => true,
            ContractVersion::Legacy => !self.is_sun_path(),
        }
    }
}

/// Every field always has a value; unset fields hold empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<ParamField, String>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self {
            values: ParamField::ALL.iter().map(|f| (*f, String::new())).collect(),
        }
    }

    pub fn get(&self, field: ParamField) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: ParamField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn with(mut self, field: ParamField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamField, &str)> {
        self.values.iter().map(|(f, v)| (*f, v.as_str()))
    }

    /// Build from the `params` object of a `/get_start` response.
    ///
    /// Under the extended contract every field must be present; the legacy
    /// contract never carries the sun-path window, which is left empty.
    pub fn from_json(params: &Value, contract: ContractVersion) -> Result<Self> {
        let map = params
            .as_object()
            .ok_or_else(|| anyhow!("params is not an object"))?;
        let mut set = Self::new();
        for field in ParamField::ALL {
            if !field.in_contract(contract) {
                continue;
            }
            match map.get(field.as_str()) {
                Some(value) => set.set(field, display_text(value)),
                None => bail!("params missing field {}", field.as_str()),
            }
        }
        Ok(set)
    }

    /// Query arguments for `/get_data`, in panel order.
    pub fn query_pairs(&self, contract: ContractVersion) -> Vec<(&'static str, String)> {
        self.values
            .iter()
            .filter(|(f, _)| f.in_contract(contract))
            .map(|(f, v)| (f.as_str(), v.clone()))
            .collect()
    }

    /// Stable digest used to correlate a request with its response in logs.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (field, value) in self.iter() {
            hasher.update(field.as_str().as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"&");
        }
        hex::encode(&hasher.finalize()[..8])
    }

    /// Apply a `field=value` assignment as typed by a user.
    pub fn parse_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected field=value, got {:?}", assignment))?;
        let field = ParamField::from_name(name.trim())
            .ok_or_else(|| anyhow!("unknown parameter {:?}", name))?;
        self.set(field, value);
        Ok(())
    }
}

/// How a JSON scalar reads once placed in a text element.
fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
        other => other.to_string(),
    }
}

/// The UI boundary for parameters.
pub trait ParameterPanel: Send {
    /// Current displayed value of every field.
    fn read_all(&self) -> ParameterSet;
    /// Overwrite every field's displayed value.
    fn write_all(&mut self, params: &ParameterSet);
}

/// In-process panel; edits land through [`MemoryPanel::edit`].
#[derive(Debug, Default)]
pub struct MemoryPanel {
    shown: ParameterSet,
    writes: usize,
}

impl MemoryPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edit(&mut self, field: ParamField, value: impl Into<String>) {
        let value = value.into();
        log(
            Level::Debug,
            Domain::Panel,
            "edit",
            obj(&[("field", v_str(field.as_str())), ("value", v_str(&value))]),
        );
        self.shown.set(field, value);
    }

    /// Number of times `write_all` has run.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl ParameterPanel for MemoryPanel {
    fn read_all(&self) -> ParameterSet {
        self.shown.clone()
    }

    fn write_all(&mut self, params: &ParameterSet) {
        self.shown = params.clone();
        self.writes += 1;
        log(
            Level::Debug,
            Domain::Panel,
            "write_all",
            obj(&[("params_digest", v_str(&params.digest()))]),
        );
    }
}

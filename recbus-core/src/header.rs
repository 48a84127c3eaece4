//! Event and run header records.

use crate::product::Product;
use crate::schema::ColumnSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-event header, always present on the bus under [`EventHeader::KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    event_number: i32,
    run: i32,
    timestamp_s: i64,
    timestamp_ns: u32,
    weight: f64,
    tries: i32,
    is_real_data: bool,
    int_parameters: BTreeMap<String, i32>,
    float_parameters: BTreeMap<String, f32>,
    string_parameters: BTreeMap<String, String>,
}

impl EventHeader {
    /// Fixed key of the header product; it carries no pass suffix.
    pub const KEY: &'static str = "EventHeader";

    #[must_use]
    pub fn event_number(&self) -> i32 {
        self.event_number
    }

    pub fn set_event_number(&mut self, event_number: i32) {
        self.event_number = event_number;
    }

    #[must_use]
    pub fn run(&self) -> i32 {
        self.run
    }

    pub fn set_run(&mut self, run: i32) {
        self.run = run;
    }

    /// Timestamp as (seconds, nanoseconds) since the epoch.
    #[must_use]
    pub fn timestamp(&self) -> (i64, u32) {
        (self.timestamp_s, self.timestamp_ns)
    }

    pub fn set_timestamp(&mut self, seconds: i64, nanoseconds: u32) {
        self.timestamp_s = seconds;
        self.timestamp_ns = nanoseconds;
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    #[must_use]
    pub fn tries(&self) -> i32 {
        self.tries
    }

    pub fn increment_tries(&mut self) {
        self.tries += 1;
    }

    #[must_use]
    pub fn is_real_data(&self) -> bool {
        self.is_real_data
    }

    pub fn set_real_data(&mut self, yes: bool) {
        self.is_real_data = yes;
    }

    #[must_use]
    pub fn int_parameter(&self, name: &str) -> Option<i32> {
        self.int_parameters.get(name).copied()
    }

    pub fn set_int_parameter(&mut self, name: &str, value: i32) {
        self.int_parameters.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn float_parameter(&self, name: &str) -> Option<f32> {
        self.float_parameters.get(name).copied()
    }

    pub fn set_float_parameter(&mut self, name: &str, value: f32) {
        self.float_parameters.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn string_parameter(&self, name: &str) -> Option<&str> {
        self.string_parameters.get(name).map(String::as_str)
    }

    pub fn set_string_parameter(&mut self, name: &str, value: impl Into<String>) {
        self.string_parameters.insert(name.to_string(), value.into());
    }
}

impl Default for EventHeader {
    fn default() -> Self {
        Self {
            event_number: -1,
            run: -1,
            timestamp_s: 0,
            timestamp_ns: 0,
            weight: 1.0,
            tries: 0,
            is_real_data: false,
            int_parameters: BTreeMap::new(),
            float_parameters: BTreeMap::new(),
            string_parameters: BTreeMap::new(),
        }
    }
}

impl Product for EventHeader {
    fn schema() -> ColumnSchema {
        ColumnSchema::object("recbus::EventHeader")
    }
}

impl fmt::Display for EventHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventHeader {{ run: {}, event: {}, timestamp: {}.{:09}, weight: {}{} }}",
            self.run,
            self.event_number,
            self.timestamp_s,
            self.timestamp_ns,
            self.weight,
            if self.is_real_data { ", real data" } else { "" }
        )
    }
}

/// Per-run summary record stored in the run stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    run_number: i32,
    detector_name: String,
    description: String,
    software_tag: String,
    run_start: i64,
    run_end: i64,
    int_parameters: BTreeMap<String, i32>,
    float_parameters: BTreeMap<String, f32>,
    string_parameters: BTreeMap<String, String>,
}

impl RunHeader {
    /// Column name of run headers in the run stream.
    pub const KEY: &'static str = "RunHeader";

    /// Creates a header for `run_number`, tagged with this crate's version.
    #[must_use]
    pub fn new(run_number: i32) -> Self {
        Self {
            run_number,
            software_tag: env!("CARGO_PKG_VERSION").to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn run_number(&self) -> i32 {
        self.run_number
    }

    #[must_use]
    pub fn detector_name(&self) -> &str {
        &self.detector_name
    }

    pub fn set_detector_name(&mut self, name: impl Into<String>) {
        self.detector_name = name.into();
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    #[must_use]
    pub fn software_tag(&self) -> &str {
        &self.software_tag
    }

    /// Run start in seconds since the epoch.
    #[must_use]
    pub fn run_start(&self) -> i64 {
        self.run_start
    }

    pub fn set_run_start(&mut self, seconds: i64) {
        self.run_start = seconds;
    }

    /// Run end in seconds since the epoch.
    #[must_use]
    pub fn run_end(&self) -> i64 {
        self.run_end
    }

    pub fn set_run_end(&mut self, seconds: i64) {
        self.run_end = seconds;
    }

    #[must_use]
    pub fn int_parameters(&self) -> &BTreeMap<String, i32> {
        &self.int_parameters
    }

    pub fn set_int_parameter(&mut self, name: &str, value: i32) {
        self.int_parameters.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn float_parameters(&self) -> &BTreeMap<String, f32> {
        &self.float_parameters
    }

    pub fn set_float_parameter(&mut self, name: &str, value: f32) {
        self.float_parameters.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn string_parameters(&self) -> &BTreeMap<String, String> {
        &self.string_parameters
    }

    pub fn set_string_parameter(&mut self, name: &str, value: impl Into<String>) {
        self.string_parameters.insert(name.to_string(), value.into());
    }
}

impl Product for RunHeader {
    fn schema() -> ColumnSchema {
        ColumnSchema::object("recbus::RunHeader")
    }
}

impl fmt::Display for RunHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run #{}", self.run_number)?;
        writeln!(f, "  Detector: {}", self.detector_name)?;
        writeln!(f, "  Description: {}", self.description)?;
        writeln!(f, "  Software tag: {}", self.software_tag)?;
        for (name, value) in &self.int_parameters {
            writeln!(f, "  {name} = {value}")?;
        }
        for (name, value) in &self.float_parameters {
            writeln!(f, "  {name} = {value}")?;
        }
        for (name, value) in &self.string_parameters {
            writeln!(f, "  {name} = {value}")?;
        }
        Ok(())
    }
}

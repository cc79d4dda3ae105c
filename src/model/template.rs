//! Weighted-template engine for log-style models.
//!
//! A template model owns a list of [`LogTemplate`]s with relative ratios.
//! Each `next()` call seeds the common log fields (timestamp, endpoint
//! addresses and ports), picks a template according to the ratios, and
//! renders its fields in declared order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::time::{SystemTime, UNIX_EPOCH};

use super::Model;
use crate::error::Result;
use crate::record::{Record, Value};

/// Common per-record seed values available to template fields.
#[derive(Debug, Clone)]
pub struct Seed {
    /// Current time as fractional seconds since the epoch.
    pub ctime: f64,
    /// Analyzer id (the generating process).
    pub aid: u32,
    /// Random source address.
    pub srcip: String,
    /// Random destination address.
    pub dstip: String,
    /// Random source port.
    pub srcport: u16,
    /// Random destination port.
    pub dstport: u16,
}

/// How one template field is rendered.
pub enum FieldSpec {
    /// A fixed value, used as-is.
    Value(Value),
    /// A text template; `{ctime}`, `{aid}`, `{srcip}`, `{srcport}`,
    /// `{dstip}` and `{dstport}` are substituted from the seed.
    Text(&'static str),
    /// A function of the seed and the model's RNG.
    Seeded(fn(&mut StdRng, &Seed) -> Value),
}

/// One weighted template: a ratio and an ordered field list.
pub struct LogTemplate {
    /// Relative selection ratio among the model's templates.
    pub ratio: u32,
    /// Fields in output order.
    pub fields: Vec<(&'static str, FieldSpec)>,
}

impl LogTemplate {
    /// Create a template with the given ratio.
    pub fn new(ratio: u32, fields: Vec<(&'static str, FieldSpec)>) -> Self {
        Self { ratio, fields }
    }
}

/// A model that renders weighted templates.
pub struct TemplateModel {
    name: String,
    templates: Vec<LogTemplate>,
    total_ratio: u32,
    rng: StdRng,
}

impl TemplateModel {
    /// Create a template model. Ratios of zero are treated as one.
    pub fn new(name: impl Into<String>, mut templates: Vec<LogTemplate>) -> Self {
        for template in &mut templates {
            if template.ratio == 0 {
                template.ratio = 1;
            }
        }
        let total_ratio = templates.iter().map(|t| t.ratio).sum();
        Self {
            name: name.into(),
            templates,
            total_ratio,
            rng: StdRng::from_os_rng(),
        }
    }

    fn pick_template(&mut self) -> usize {
        let mut ticket = self.rng.random_range(0..self.total_ratio);
        for (index, template) in self.templates.iter().enumerate() {
            if ticket < template.ratio {
                return index;
            }
            ticket -= template.ratio;
        }
        self.templates.len() - 1
    }
}

impl Model for TemplateModel {
    fn next(&mut self) -> Result<Record> {
        let seed = make_seed(&mut self.rng);
        let index = self.pick_template();

        let mut record = Record::new();
        // Detach the field list so seeded fields can borrow the RNG.
        let fields = std::mem::take(&mut self.templates[index].fields);
        for (name, spec) in &fields {
            let value = match spec {
                FieldSpec::Value(v) => v.clone(),
                FieldSpec::Text(text) => Value::String(render(text, &seed)),
                FieldSpec::Seeded(f) => f(&mut self.rng, &seed),
            };
            record.insert(*name, value);
        }
        self.templates[index].fields = fields;

        Ok(record)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build the default log seed: timestamp, analyzer id, random endpoints.
pub fn make_seed(rng: &mut StdRng) -> Seed {
    Seed {
        ctime: epoch_now(),
        aid: std::process::id(),
        srcip: random_ip(rng),
        dstip: random_ip(rng),
        srcport: random_port(rng),
        dstport: random_port(rng),
    }
}

/// Fractional seconds since the Unix epoch.
pub fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Draw from a normal distribution centered on the range midpoint and
/// clamped into `[low, high]`. `spread` divides the range width to get
/// the standard deviation, so larger values cluster tighter.
pub fn clustered_in_range(rng: &mut StdRng, low: i64, high: i64, spread: f64) -> i64 {
    let mean = (low as f64 + high as f64) / 2.0;
    let sigma = (high as f64 - low as f64) / spread;
    let normal = Normal::new(mean, sigma).expect("range is non-empty and spread positive");
    normal
        .sample(rng)
        .round()
        .clamp(low as f64, high as f64) as i64
}

/// A random dotted-quad IPv4 address, clustered over the signed 32-bit
/// address space.
pub fn random_ip(rng: &mut StdRng) -> String {
    let ip = clustered_in_range(rng, i64::from(i32::MIN), i64::from(i32::MAX), 100.0) as i32;
    let octets = (ip as u32).to_be_bytes();
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

const WELL_KNOWN_PORTS: [(u16, u32); 8] = [
    (21, 10),
    (22, 5),
    (23, 5),
    (25, 5),
    (80, 100),
    (110, 5),
    (220, 5),
    (443, 20),
];

/// A random port: 40% a weighted well-known port, otherwise a clustered
/// draw over the non-ephemeral range.
pub fn random_port(rng: &mut StdRng) -> u16 {
    if rng.random_range(0..10) < 4 {
        let total: u32 = WELL_KNOWN_PORTS.iter().map(|(_, w)| w).sum();
        let mut ticket = rng.random_range(0..total);
        for (port, weight) in WELL_KNOWN_PORTS {
            if ticket < weight {
                return port;
            }
            ticket -= weight;
        }
    }
    clustered_in_range(rng, 1, 32767, 2.0) as u16
}

fn render(template: &str, seed: &Seed) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open..];
        match rest.find('}') {
            Some(close) => {
                let key = &rest[1..close];
                match lookup(key, seed) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[..=close]),
                }
                rest = &rest[close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

fn lookup(key: &str, seed: &Seed) -> Option<String> {
    match key {
        "ctime" => Some(format!("{:.3}", seed.ctime)),
        "aid" => Some(seed.aid.to_string()),
        "srcip" => Some(seed.srcip.clone()),
        "dstip" => Some(seed.dstip.clone()),
        "srcport" => Some(seed.srcport.to_string()),
        "dstport" => Some(seed.dstport.to_string()),
        _ => None,
    }
}
